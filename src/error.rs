//! Error types

use thiserror::Error;

/// Failure talking to a remote generation service
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("generation rejected: {0}")]
    Rejected(String),
    #[error("task failed: {0}")]
    TaskFailed(String),
    #[error("task still pending after {attempts} polls")]
    Timeout { attempts: u32 },
}

impl AdapterError {
    /// Worth retrying the same poll request
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Rejected(_) | Self::TaskFailed(_) | Self::Timeout { .. } => {
                false
            }
        }
    }
}

/// Failure of a single node run; surfaced as the node's error message
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("could not parse script analysis: {0}")]
    MalformedAnalysis(#[from] serde_json::Error),
    #[error("{0}")]
    EmptyResult(&'static str),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("workflow file: {0}")]
    Io(#[from] std::io::Error),
    #[error("workflow json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported workflow version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("unexpected store name {0:?}")]
    WrongStore(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        let status = |status| AdapterError::Status {
            status,
            body: String::new(),
        };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(400).is_transient());
        assert!(!AdapterError::TaskFailed("nsfw".into()).is_transient());
    }

    #[test]
    fn node_error_message_is_the_adapter_message() {
        let err = NodeError::from(AdapterError::Rejected("no task id".into()));
        assert_eq!(err.to_string(), "generation rejected: no task id");
    }
}
