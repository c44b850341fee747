//! The execution state machine.

use serde::Serialize;
use strum::Display;

use crate::error::ErrorKind;

/// A non-terminal pipeline stage, or `Done`.
///
/// Stages are visited strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Created, nothing has run.
    Pending,
    /// Running the pre-request script.
    PreScript,
    /// Resolving URL, query, headers and body.
    Resolving,
    /// Waiting on the HTTP exchange.
    InFlight,
    /// Running the post-request script.
    PostScript,
    /// Finished successfully.
    Done,
}

impl Stage {
    /// The stage that follows this one.
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Pending => Some(Self::PreScript),
            Self::PreScript => Some(Self::Resolving),
            Self::Resolving => Some(Self::InFlight),
            Self::InFlight => Some(Self::PostScript),
            Self::PostScript => Some(Self::Done),
            Self::Done => None,
        }
    }
}

/// Where an execution is, or how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionState {
    /// See [`Stage::Pending`].
    Pending,
    /// See [`Stage::PreScript`].
    PreScript,
    /// See [`Stage::Resolving`].
    Resolving,
    /// See [`Stage::InFlight`].
    InFlight,
    /// See [`Stage::PostScript`].
    PostScript,
    /// Terminal success.
    Done,
    /// Terminal failure, remembering where and why.
    Failed {
        /// The stage that failed.
        stage: Stage,
        /// The class of error.
        kind: ErrorKind,
    },
}

impl ExecutionState {
    /// The stage this state is in; for `Failed`, the stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Pending => Stage::Pending,
            Self::PreScript => Stage::PreScript,
            Self::Resolving => Stage::Resolving,
            Self::InFlight => Stage::InFlight,
            Self::PostScript => Stage::PostScript,
            Self::Done => Stage::Done,
            Self::Failed { stage, .. } => *stage,
        }
    }

    /// Returns `true` for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }

    /// Whether `next` is a legal transition from this state.
    ///
    /// Non-terminal states move to their direct successor or to `Failed`;
    /// terminal states go nowhere.
    pub fn can_advance_to(&self, next: &ExecutionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed { stage, .. } => *stage == self.stage(),
            other => self.stage().next() == Some(other.stage()),
        }
    }
}

impl From<Stage> for ExecutionState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Pending => Self::Pending,
            Stage::PreScript => Self::PreScript,
            Stage::Resolving => Self::Resolving,
            Stage::InFlight => Self::InFlight,
            Stage::PostScript => Self::PostScript,
            Stage::Done => Self::Done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: [Stage; 6] = [
        Stage::Pending,
        Stage::PreScript,
        Stage::Resolving,
        Stage::InFlight,
        Stage::PostScript,
        Stage::Done,
    ];

    #[test]
    fn stages_advance_one_at_a_time() {
        for pair in ORDER.windows(2) {
            let from = ExecutionState::from(pair[0]);
            assert!(from.can_advance_to(&pair[1].into()), "{:?}", pair);
            assert!(!ExecutionState::from(pair[1]).can_advance_to(&from));
        }
        assert!(!ExecutionState::Pending.can_advance_to(&ExecutionState::InFlight));
        assert!(!ExecutionState::Resolving.can_advance_to(&ExecutionState::Resolving));
    }

    #[test]
    fn failure_is_reachable_from_every_non_terminal_state() {
        for stage in &ORDER[..5] {
            let failed = ExecutionState::Failed {
                stage: *stage,
                kind: ErrorKind::Cancelled,
            };
            assert!(ExecutionState::from(*stage).can_advance_to(&failed));
            assert!(!failed.can_advance_to(&ExecutionState::Done));
        }
    }

    #[test]
    fn terminal_states_are_final() {
        assert!(ExecutionState::Done.is_terminal());
        assert!(!ExecutionState::Done.can_advance_to(&ExecutionState::Failed {
            stage: Stage::Done,
            kind: ErrorKind::NetworkError,
        }));
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(Stage::PostScript.to_string(), "post_script");
        let json = serde_json::to_value(ExecutionState::Failed {
            stage: Stage::InFlight,
            kind: ErrorKind::NetworkError,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "failed", "stage": "in_flight", "kind": "network_error"})
        );
        assert_eq!(
            serde_json::to_value(ExecutionState::PreScript).unwrap(),
            serde_json::json!({"state": "pre_script"})
        );
    }
}
