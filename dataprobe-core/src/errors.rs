//! Error types for DataProbe

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataProbeError>;

#[derive(Error, Debug)]
pub enum DataProbeError {
    #[error("Dataset registration failed: {0}")]
    Registration(String),

    #[error("Job status poll failed: {0}")]
    PollTransport(String),

    #[error("Analysis job failed at step {step} ({kind}): {reason}")]
    JobFailed {
        step: usize,
        kind: String,
        reason: String,
    },

    #[error("Analysis job did not finish within {attempts} polls")]
    PollLimitExceeded { attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Malformed preview: {0}")]
    MalformedPreview(String),

    #[error("Profile shape error: {0}")]
    ProfileShape(String),

    #[error("Analysis service returned code {code}: {message}")]
    Api { code: i64, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No analysis job is being tracked")]
    NoActiveJob,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DataProbeError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Connection failures, timeouts, `429` and `5xx` responses are transient;
    /// everything else (client errors, undecodable bodies, API error codes)
    /// will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            DataProbeError::Http(err) => {
                if err.is_connect() || err.is_timeout() {
                    return true;
                }
                match err.status() {
                    Some(status) => {
                        status.is_server_error()
                            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    }
                    None => false,
                }
            }
            DataProbeError::PollTransport(_) => true,
            _ => false,
        }
    }
}

impl From<config::ConfigError> for DataProbeError {
    fn from(err: config::ConfigError) -> Self {
        DataProbeError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_failed_message_names_the_step() {
        let err = DataProbeError::JobFailed {
            step: 1,
            kind: "load".to_string(),
            reason: "file not readable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Analysis job failed at step 1 (load): file not readable"
        );
    }

    #[test]
    fn only_transport_errors_are_transient() {
        assert!(DataProbeError::PollTransport("reset".into()).is_transient());
        assert!(!DataProbeError::Registration("bad".into()).is_transient());
        assert!(!DataProbeError::Api {
            code: -1,
            message: "nope".into()
        }
        .is_transient());
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!DataProbeError::from(parse).is_transient());
    }
}
