// Error taxonomy for alert dispatch and removal.

use std::io;

use thiserror::Error;

use super::model::StyleId;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("unknown status: {0}")]
    UnknownStatus(String),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A predicate (condition or option) failed while rule `rule` was being evaluated.
    /// `rule` is `None` when the failing predicate came from the request itself.
    #[error("predicate failed while evaluating rule {rule:?}: {source}")]
    ConditionEvaluation {
        rule: Option<usize>,
        #[source]
        source: anyhow::Error,
    },

    #[error("notifier for style '{style}' failed: {source}")]
    Notify {
        style: StyleId,
        #[source]
        source: anyhow::Error,
    },

    #[error("remover for style '{style}' failed: {source}")]
    RemoverInvocation {
        style: StyleId,
        #[source]
        source: anyhow::Error,
    },

    #[error("alert service is no longer running")]
    ServiceClosed,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
