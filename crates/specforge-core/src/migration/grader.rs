//! Safety grading for migration operations.

use super::diff::AttributeChange;
use super::error::SafetyGrade;
use super::plan::MigrationOperation;
use crate::catalog::AttributeSpec;

/// Grading summary for a whole plan.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationGrade {
    /// The worst grade among all operations. `A` for an empty plan.
    pub overall_grade: SafetyGrade,
    /// Tokens of operations that need existing rows backfilled (grade B).
    pub backfill: Vec<String>,
    /// Tokens of operations graded C or D.
    pub blocking: Vec<String>,
}

impl MigrationGrade {
    /// Check if any backfill is required.
    pub fn requires_backfill(&self) -> bool {
        !self.backfill.is_empty()
    }

    /// Check if the plan can be applied without blocking writers.
    pub fn can_run_online(&self) -> bool {
        self.overall_grade <= SafetyGrade::B
    }
}

/// Grades migration operations for safety.
pub struct SafetyGrader;

impl SafetyGrader {
    /// Creating a table never touches existing rows.
    pub fn grade_create() -> SafetyGrade {
        SafetyGrade::A
    }

    /// Adding a column is B when existing rows cannot be given a value.
    pub fn grade_added(attr: &AttributeSpec) -> SafetyGrade {
        if attr.is_required_without_default() {
            SafetyGrade::B
        } else {
            SafetyGrade::A
        }
    }

    /// Changing a column is A when it only relaxes constraints, C otherwise.
    pub fn grade_changed(change: &AttributeChange) -> SafetyGrade {
        if change.is_relaxing() {
            SafetyGrade::A
        } else {
            SafetyGrade::C
        }
    }

    /// Dropping a column loses data.
    pub fn grade_removed() -> SafetyGrade {
        SafetyGrade::D
    }

    /// Summarize the grades of a list of operations.
    pub fn grade_plan(operations: &[MigrationOperation]) -> MigrationGrade {
        let mut overall_grade = SafetyGrade::A;
        let mut backfill = Vec::new();
        let mut blocking = Vec::new();

        for op in operations {
            overall_grade = overall_grade.max(op.grade);
            match op.grade {
                SafetyGrade::A => {}
                SafetyGrade::B => backfill.push(op.token.clone()),
                SafetyGrade::C | SafetyGrade::D => blocking.push(op.token.clone()),
            }
        }

        MigrationGrade {
            overall_grade,
            backfill,
            blocking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AttributeType;
    use serde_json::json;

    #[test]
    fn test_grade_added() {
        let optional = AttributeSpec::new("subtitle", AttributeType::String);
        assert_eq!(SafetyGrader::grade_added(&optional), SafetyGrade::A);

        let required = AttributeSpec::new("title", AttributeType::String).required();
        assert_eq!(SafetyGrader::grade_added(&required), SafetyGrade::B);

        let defaulted = required.with_default(json!("untitled"));
        assert_eq!(SafetyGrader::grade_added(&defaulted), SafetyGrade::A);
    }

    #[test]
    fn test_grade_changed() {
        let relaxed = AttributeChange {
            old: AttributeSpec::new("title", AttributeType::String).required(),
            new: AttributeSpec::new("title", AttributeType::String),
        };
        assert_eq!(SafetyGrader::grade_changed(&relaxed), SafetyGrade::A);

        let retyped = AttributeChange {
            old: AttributeSpec::new("views", AttributeType::String),
            new: AttributeSpec::new("views", AttributeType::Integer),
        };
        assert_eq!(SafetyGrader::grade_changed(&retyped), SafetyGrade::C);
    }

    #[test]
    fn test_empty_plan_grade() {
        let grade = SafetyGrader::grade_plan(&[]);
        assert_eq!(grade.overall_grade, SafetyGrade::A);
        assert!(grade.can_run_online());
        assert!(!grade.requires_backfill());
    }
}
