use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Why a build ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Conflict,
    MissingRequirement,
    Cycle,
    ActionIncompatibility,
    Mutation,
    Interrupted,
}

impl FailureKind {
    /// Failure kinds raised by validation, before any mutation.
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            FailureKind::Conflict
                | FailureKind::MissingRequirement
                | FailureKind::Cycle
                | FailureKind::ActionIncompatibility
        )
    }

    /// Classify an error; `None` for errors outside the build taxonomy.
    pub fn of(err: &CoreError) -> Option<FailureKind> {
        match err {
            CoreError::Conflict { .. } => Some(FailureKind::Conflict),
            CoreError::MissingRequirement { .. } => Some(FailureKind::MissingRequirement),
            CoreError::Cycle { .. } => Some(FailureKind::Cycle),
            CoreError::ActionIncompatibility(_) => Some(FailureKind::ActionIncompatibility),
            CoreError::Mutation { .. } => Some(FailureKind::Mutation),
            CoreError::Interrupted(_) => Some(FailureKind::Interrupted),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Conflict => "conflict",
            FailureKind::MissingRequirement => "missing_requirement",
            FailureKind::Cycle => "cycle",
            FailureKind::ActionIncompatibility => "action_incompatibility",
            FailureKind::Mutation => "mutation",
            FailureKind::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Planned,
    Validated,
    Executing,
    Done,
    Failed(FailureKind),
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildState::Planned => f.write_str("planned"),
            BuildState::Validated => f.write_str("validated"),
            BuildState::Executing => f.write_str("executing"),
            BuildState::Done => f.write_str("done"),
            BuildState::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

pub fn validate_transition(from: BuildState, to: BuildState) -> Result<(), CoreError> {
    let valid = match (from, to) {
        (BuildState::Planned, BuildState::Validated)
        | (BuildState::Validated, BuildState::Executing)
        | (BuildState::Executing, BuildState::Done) => true,
        (BuildState::Planned | BuildState::Validated, BuildState::Failed(kind)) => {
            kind.is_validation()
        }
        (BuildState::Executing, BuildState::Failed(kind)) => matches!(
            kind,
            FailureKind::Mutation | FailureKind::Interrupted
        ),
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
