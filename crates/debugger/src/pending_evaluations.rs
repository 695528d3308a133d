//! Tracking evaluations sent to the agent and matching their responses
//!
//! When an evaluation is sent, a result sender is stored under a fresh id.
//! When the agent answers, the sender is looked up by that id and the result
//! is delivered to whoever is waiting on the receiver.

use std::collections::HashMap;

use tokio::sync::oneshot;
use wire::EvalId;

use crate::error::SessionError;
use crate::inspector::EvaluatedValue;

pub type EvaluationResult = Result<EvaluatedValue, EvaluationError>;

/// Why an evaluation produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// The agent could not evaluate the expression.
    Failed(String),
    /// The target resumed or the session ended first.
    Cancelled,
}

impl From<EvaluationError> for String {
    fn from(error: EvaluationError) -> Self {
        match error {
            EvaluationError::Failed(message) => message,
            EvaluationError::Cancelled => SessionError::EvaluationCancelled.to_string(),
        }
    }
}

/// Tracker for evaluations awaiting an agent response
#[derive(Debug, Default)]
pub(crate) struct PendingEvaluations {
    last_id: EvalId,
    pending: HashMap<EvalId, oneshot::Sender<EvaluationResult>>,
}

impl PendingEvaluations {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a new evaluation, returning its id and the receiving end
    pub(crate) fn register(&mut self) -> (EvalId, oneshot::Receiver<EvaluationResult>) {
        self.last_id = self.last_id.wrapping_add(1);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(self.last_id, tx);
        (self.last_id, rx)
    }

    /// Deliver a result to the evaluation with `id`.
    ///
    /// Returns false if nothing was waiting for it.
    pub(crate) fn complete(&mut self, id: EvalId, result: EvaluationResult) -> bool {
        match self.pending.remove(&id) {
            Some(tx) => {
                // the waiter may have timed out already
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_pending(&self, id: EvalId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Drop an evaluation whose waiter gave up.
    pub(crate) fn forget(&mut self, id: EvalId) {
        self.pending.remove(&id);
    }

    /// Resolve every pending evaluation as cancelled.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(EvaluationError::Cancelled));
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
