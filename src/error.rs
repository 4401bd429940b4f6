//! Error types for NSDb

/// Result type alias for NSDb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for NSDb
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// SQL parse failure, carrying the unconsumed input tail
    #[error("parse error: {message} (remaining input: {remaining:?})")]
    Parse { message: String, remaining: String },
    /// Schema type conflict on the named fields
    #[error("schema conflict on fields: {}", fields.join(", "))]
    SchemaConflict { fields: Vec<String> },
    /// No schema exists for the metric
    #[error("No schema found for metric {metric}")]
    MissingSchema { metric: String },
    /// No write location could be resolved for the timestamp
    #[error("no location for metric {metric} at timestamp {timestamp}")]
    MissingLocation { metric: String, timestamp: i64 },
    /// A metric info is already registered for the metric
    #[error("metric info already present for metric {metric}")]
    DuplicateMetricInfo { metric: String },
    /// Write rejected, with one reason per failed precondition or node
    #[error("record rejected: {}", reasons.join("; "))]
    RecordRejected { reasons: Vec<String> },
    /// Select statement failed during execution
    #[error("select statement failed: {0}")]
    SelectFailed(String),
    /// Operation timed out
    #[error("operation timed out")]
    Timeout,
    /// IO errors from shard storage
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Flatten this error into the reason list carried by a write rejection.
    pub(crate) fn into_rejection(self) -> Self {
        match self {
            Error::RecordRejected { .. } => self,
            Error::SchemaConflict { fields } => Error::RecordRejected {
                reasons: fields
                    .into_iter()
                    .map(|f| format!("type conflict on field {f}"))
                    .collect(),
            },
            other => Error::RecordRejected {
                reasons: vec![other.to_string()],
            },
        }
    }
}
