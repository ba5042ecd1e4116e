use thiserror::Error;

/// Errors surfaced by discovery, bootstrap and authenticated calls.
///
/// The type is `Clone` because a single bootstrap outcome is handed to every
/// caller that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Connection refused, timed out, TLS failure, or any other I/O problem
    /// before a response body was read.
    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// A body arrived but was not the JSON shape we expected.
    #[error("invalid JSON from {url}: {reason}")]
    Json { url: String, reason: String },

    #[error("response from {url} is missing field `{field}`")]
    MissingField { url: String, field: &'static str },

    /// The local service answered with its own error object.
    #[error("service error {kind}: {message}")]
    Service { kind: String, message: String },

    #[error("web helper is not running and could not be started")]
    ServiceNotRunning,

    #[error("process check failed: {0}")]
    Process(String),

    #[error("port probe failed: {0}")]
    Probe(String),

    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),

    #[error("session port cannot change once bootstrap has started")]
    SessionLocked,

    #[error("concurrent task failed: {0}")]
    Task(String),
}

impl Error {
    /// True for failures where nothing answered at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    pub(crate) fn transport(url: &str, reason: impl ToString) -> Self {
        Error::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn json(url: &str, reason: impl ToString) -> Self {
        Error::Json {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Task(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
