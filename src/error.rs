//! Error types for the prober.
//!
//! `ProbeError` is fatal and propagates to `main`. `AttemptFailure` describes why a
//! single probe attempt did not produce text; it is recorded and never aborts a run.

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProbeError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Remote error: {message}")]
    Remote { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(".env error: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

impl ProbeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote {
            message: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Why one attempt was unsuccessful.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("status {status}: {preview}")]
    Status { status: u16, preview: String },

    #[error("response is not JSON: {0}")]
    Parse(String),

    #[error("unable to extract text: {0}")]
    Extraction(String),
}

impl AttemptFailure {
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Short machine-friendly name, used in the journal.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Parse(_) => "parse",
            Self::Extraction(_) => "extraction",
        }
    }
}

/// Cut `s` to at most `max` characters without splitting a UTF-8 sequence.
#[must_use]
pub fn preview(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("hello", 10), "hello");
        assert_eq!(preview("hello", 2), "he");
        assert_eq!(preview("国际新闻", 2), "国际");
    }

    #[test]
    fn test_failure_kind() {
        let f = AttemptFailure::Status {
            status: 500,
            preview: "boom".to_string(),
        };
        assert_eq!(f.kind(), "status");
        assert_eq!(f.to_string(), "status 500: boom");
    }
}
