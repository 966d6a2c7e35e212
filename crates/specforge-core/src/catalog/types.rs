//! Attribute type definitions for the catalog.

use serde::{Deserialize, Serialize};

/// Attribute types an entity schema may declare.
///
/// RAML spellings (`date-only`, `time-only`, `datetime-only`) and the short
/// forms `int`/`bool` decode to the same variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    #[serde(alias = "int")]
    Integer,
    /// Floating point number.
    Number,
    /// Boolean value.
    #[serde(alias = "bool")]
    Boolean,
    /// Calendar date.
    #[serde(alias = "date-only")]
    Date,
    /// Date and time.
    #[serde(alias = "datetime-only", alias = "date-time")]
    Datetime,
    /// Time of day.
    #[serde(alias = "time-only")]
    Time,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl AttributeType {
    /// Column type used for this attribute in migration artifacts.
    pub fn column_type(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Integer => "integer",
            AttributeType::Number => "double",
            AttributeType::Boolean => "boolean",
            AttributeType::Date => "date",
            AttributeType::Datetime => "datetime",
            AttributeType::Time => "time",
            AttributeType::Array | AttributeType::Object => "json",
        }
    }

    /// Check if values of this type are text that policies may inspect.
    pub fn is_textual(&self) -> bool {
        matches!(self, AttributeType::String)
    }

    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeType::Integer | AttributeType::Number)
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttributeType::String => "string",
            AttributeType::Integer => "integer",
            AttributeType::Number => "number",
            AttributeType::Boolean => "boolean",
            AttributeType::Date => "date",
            AttributeType::Datetime => "datetime",
            AttributeType::Time => "time",
            AttributeType::Array => "array",
            AttributeType::Object => "object",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_aliases() {
        let decoded: Vec<AttributeType> =
            serde_json::from_str(r#"["int", "integer", "bool", "date-only", "time-only", "datetime-only"]"#)
                .unwrap();
        assert_eq!(
            decoded,
            vec![
                AttributeType::Integer,
                AttributeType::Integer,
                AttributeType::Boolean,
                AttributeType::Date,
                AttributeType::Time,
                AttributeType::Datetime,
            ]
        );
    }

    #[test]
    fn test_column_types() {
        assert_eq!(AttributeType::Number.column_type(), "double");
        assert_eq!(AttributeType::Object.column_type(), "json");
        assert_eq!(AttributeType::Integer.to_string(), "integer");
        assert!(AttributeType::Number.is_numeric());
        assert!(AttributeType::String.is_textual());
    }
}
