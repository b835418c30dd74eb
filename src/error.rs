//! Failure classes for the notification pipeline.
//!
//! | Class                | Effect on the run                                  |
//! |----------------------|----------------------------------------------------|
//! | `CollectorError`     | stream skipped, retried next run, run fails        |
//! | `SummarizationError` | fallback summary, never fatal                      |
//! | `DeliveryError`      | event left uncommitted, retried next run           |
//! | `StateWriteError`    | announced but not recorded, run fails loudly       |
//! | `StateLoadError`     | run aborted before any fetch                       |

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("summarizer not configured: {0}")]
    NotConfigured(String),
    #[error("summarizer request failed: {0}")]
    Transport(String),
    #[error("summarizer returned status {0}")]
    Status(u16),
    #[error("malformed summarizer response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("message content must not be empty")]
    EmptyMessage,
    #[error("notifier not configured: {0}")]
    NotConfigured(String),
    #[error("webhook request failed: {0}")]
    Transport(String),
    #[error("webhook rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<f64> },
    #[error("webhook returned status {0}")]
    Status(u16),
}

impl DeliveryError {
    /// True when waiting and retrying later is expected to help.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited { .. } => true,
            Self::Status(code) => *code >= 500,
            Self::EmptyMessage | Self::NotConfigured(_) => false,
        }
    }
}

#[derive(Debug, Error)]
#[error("write state file {}: {source}", path.display())]
pub struct StateWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum StateLoadError {
    #[error("read state file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse state file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert!(DeliveryError::RateLimited {
            retry_after_secs: Some(1.5)
        }
        .is_transient());
        assert!(DeliveryError::Status(502).is_transient());
        assert!(!DeliveryError::Status(400).is_transient());
        assert!(!DeliveryError::EmptyMessage.is_transient());
    }

    #[test]
    fn state_write_error_names_the_path() {
        let err = StateWriteError {
            path: PathBuf::from("/tmp/state.json"),
            source: std::io::Error::other("disk full"),
        };
        let text = err.to_string();
        assert!(text.contains("/tmp/state.json"));
        assert!(text.contains("disk full"));
    }
}
