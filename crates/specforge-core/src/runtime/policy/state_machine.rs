//! State machine validation.

use std::collections::{BTreeMap, BTreeSet};

use specforge_proto::{MutationKind, Value};
use tracing::debug;

use super::{PolicyStep, StepScope};
use crate::runtime::config::StateMachineConfig;
use crate::runtime::error::ProcessError;
use crate::runtime::model::Model;

/// A table-driven finite state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    initial: BTreeSet<String>,
    transitions: BTreeMap<String, BTreeSet<String>>,
}

impl StateMachine {
    /// Build from configuration.
    pub fn from_config(config: &StateMachineConfig) -> Self {
        Self {
            initial: config.initial.iter().cloned().collect(),
            transitions: config
                .transitions
                .iter()
                .map(|(from, to)| (from.clone(), to.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Check if a new row may start in `state`.
    pub fn is_initial(&self, state: &str) -> bool {
        self.initial.contains(state)
    }

    /// Check if `from -> to` is an allowed edge.
    pub fn can_transition(&self, from: &str, to: &str) -> bool {
        self.transitions
            .get(from)
            .is_some_and(|targets| targets.contains(to))
    }
}

/// Rejects items whose requested state is illegal.
///
/// On create the item must carry a start state. On update an absent or
/// unchanged state passes; any other value must be an allowed edge from the
/// persisted state.
pub struct StateMachinePolicy {
    field: String,
    machine: StateMachine,
}

impl StateMachinePolicy {
    /// Build from configuration.
    pub fn new(config: &StateMachineConfig) -> Self {
        Self {
            field: config.field.clone(),
            machine: StateMachine::from_config(config),
        }
    }

    fn requested_state<'m>(
        &self,
        scope: &StepScope<'m, '_>,
    ) -> Result<Option<&'m str>, ProcessError> {
        match scope.mutation.attribute(&self.field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(state)) => Ok(Some(state.as_str())),
            Some(other) => Err(scope.invalid(format!(
                "state field '{}' must be a string, got {:?}",
                self.field, other
            ))),
        }
    }

    fn violation(
        scope: &StepScope<'_, '_>,
        model: &Model,
        from: Option<&str>,
        to: Option<&str>,
    ) -> ProcessError {
        ProcessError::StateViolation {
            entity: scope.entity.to_string(),
            index: scope.index,
            identity: model
                .identity()
                .or_else(|| scope.mutation.identity.clone()),
            from_state: from.map(str::to_string),
            to_state: to.map(str::to_string),
        }
    }
}

impl PolicyStep for StateMachinePolicy {
    fn name(&self) -> &'static str {
        "state_machine"
    }

    fn admit(&self, scope: &mut StepScope<'_, '_>, model: Model) -> Result<Model, ProcessError> {
        let requested = self.requested_state(scope)?;

        match scope.kind {
            MutationKind::Create => match requested {
                Some(state) if self.machine.is_initial(state) => {}
                to => return Err(Self::violation(scope, &model, None, to)),
            },
            MutationKind::Update => {
                let Some(to) = requested else {
                    return Ok(model);
                };
                let allowed = match model.get_str(&self.field) {
                    Some(from) => from == to || self.machine.can_transition(from, to),
                    None => self.machine.is_initial(to),
                };
                if !allowed {
                    let from = model.get_str(&self.field);
                    return Err(Self::violation(scope, &model, from, Some(to)));
                }
            }
            MutationKind::Delete => {}
        }

        debug!(
            entity = scope.entity,
            index = scope.index,
            state = ?requested,
            "state accepted"
        );
        Ok(model)
    }
}
