//! The result of one execution.

use serde::{Serialize, Serializer};
use tracing::debug;
use uuid::Uuid;

use super::prepared::PreparedRequest;
use super::state::{ExecutionState, Stage};
use crate::error::{ErrorReport, ExecutionError};
use crate::model::VariableChange;
use crate::response::ApiResponse;

/// Everything an execution produced.
///
/// Serializes as a tagged result: `{"status": "done", ..}` or
/// `{"status": "failed", "stage": .., "error": {"kind": .., "message": ..}}`.
#[derive(Debug)]
pub struct ExecutionReport {
    /// Unique id of this execution.
    pub id: Uuid,
    /// Name of the API definition that ran.
    pub api: String,
    /// Every state visited, starting with `Pending`.
    pub history: Vec<ExecutionState>,
    /// The request as sent, once resolved.
    pub request: Option<PreparedRequest>,
    /// The response, once received.
    pub response: Option<ApiResponse>,
    /// `console.log` output of both scripts.
    pub logs: Vec<String>,
    /// Environment changes committed by the scripts.
    pub changes: Vec<VariableChange>,
    /// Why the execution failed.
    pub error: Option<ExecutionError>,
}

impl ExecutionReport {
    /// Creates a pending report with a fresh id.
    pub fn new(api: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            api: api.into(),
            history: vec![ExecutionState::Pending],
            request: None,
            response: None,
            logs: Vec::new(),
            changes: Vec::new(),
            error: None,
        }
    }

    /// The current state.
    pub fn state(&self) -> ExecutionState {
        self.history
            .last()
            .copied()
            .unwrap_or(ExecutionState::Pending)
    }

    /// Returns `true` once the execution reached `Done`.
    pub fn is_success(&self) -> bool {
        self.state() == ExecutionState::Done
    }

    /// The response on success, the error otherwise.
    ///
    /// A report that never reached a terminal state counts as cancelled at
    /// its current stage.
    pub fn into_result(self) -> Result<ApiResponse, ExecutionError> {
        let stage = self.state().stage();
        match (self.error, self.response) {
            (Some(error), _) => Err(error),
            (None, Some(response)) if stage == Stage::Done => Ok(response),
            _ => Err(ExecutionError::Cancelled { stage }),
        }
    }

    pub(crate) fn advance(&mut self, stage: Stage) {
        let from = self.state();
        let to = ExecutionState::from(stage);
        debug_assert!(from.can_advance_to(&to), "{from:?} -> {to:?}");
        debug!(from = %from.stage(), to = %stage, "state transition");
        self.history.push(to);
    }

    pub(crate) fn fail(&mut self, error: ExecutionError) {
        let failed = ExecutionState::Failed {
            stage: self.state().stage(),
            kind: error.kind(),
        };
        debug!(stage = %failed.stage(), kind = %error.kind(), "state transition");
        self.history.push(failed);
        self.error = Some(error);
    }

    pub(crate) fn record_script(&mut self, logs: Vec<String>, changes: Vec<VariableChange>) {
        self.logs.extend(logs);
        self.changes.extend(changes);
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Outcome {
    Running { stage: Stage },
    Done,
    Failed { stage: Stage, error: ErrorReport },
}

#[derive(Serialize)]
struct ReportView<'a> {
    id: &'a Uuid,
    api: &'a str,
    #[serde(flatten)]
    outcome: Outcome,
    history: &'a [ExecutionState],
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<&'a PreparedRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a ApiResponse>,
    logs: &'a [String],
    changes: &'a [VariableChange],
}

impl Serialize for ExecutionReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let state = self.state();
        let outcome = match (&self.error, state) {
            (Some(error), _) => Outcome::Failed {
                stage: state.stage(),
                error: error.to_report(),
            },
            (None, ExecutionState::Done) => Outcome::Done,
            (None, _) => Outcome::Running {
                stage: state.stage(),
            },
        };

        ReportView {
            id: &self.id,
            api: &self.api,
            outcome,
            history: &self.history,
            request: self.request.as_ref(),
            response: self.response.as_ref(),
            logs: &self.logs,
            changes: &self.changes,
        }
        .serialize(serializer)
    }
}
