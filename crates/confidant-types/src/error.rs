use thiserror::Error;

/// Rejected request input. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("userId must be at least {min} characters")]
    UserIdTooShort { min: usize },

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or failed the operation.
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    /// A compare-and-swap write lost against a concurrent writer.
    #[error("concurrent update conflict on '{key}'")]
    Conflict { key: String },

    /// A stored record could not be decoded or encoded.
    #[error("corrupt record '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Errors surfaced by the dialogue engine to its caller.
///
/// Provider failures never appear here: they are absorbed into fallback replies.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
