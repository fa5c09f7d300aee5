use crate::wait::WaitError;

/// Failures that end a workflow in the `Error` state. Everything else the
/// pipeline tolerates (missing fields, failed enrichment, failed chunks or
/// webhooks) degrades the data instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    PreconditionMissing(String),
    #[error("report table never appeared: {0}")]
    ReportUnavailable(#[from] WaitError),
}

impl PipelineError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionMissing(message.into())
    }
}
