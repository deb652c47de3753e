use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::EvaluationReason;

/// Record of a single flag evaluation, handed to the [`EvaluationLogger`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    /// Evaluated flag.
    pub feature_key: String,
    /// Variant that was served.
    pub variant: String,
    /// Key of the evaluated context, if one was supplied.
    pub context_key: Option<String>,
    /// Why the variant was served.
    pub reason: EvaluationReason,
    /// When the evaluation happened.
    pub timestamp: DateTime<Utc>,
}

/// A trait for recording evaluation events, e.g. to send them to an analytics pipeline.
pub trait EvaluationLogger {
    /// Records the evaluation event.
    ///
    /// # Errors
    ///
    /// This method should not return errors and should not panic.
    /// Errors that occur during logging should be handled internally within the implementation.
    ///
    /// # Notes
    ///
    /// This method is called before the evaluation is returned to the caller, so it must not block
    /// the calling thread.
    fn log_evaluation(&self, event: EvaluationEvent);
}

pub(crate) struct NoopEvaluationLogger;
impl EvaluationLogger for NoopEvaluationLogger {
    fn log_evaluation(&self, _event: EvaluationEvent) {}
}

impl<T: Fn(EvaluationEvent)> EvaluationLogger for T {
    fn log_evaluation(&self, event: EvaluationEvent) {
        self(event);
    }
}
