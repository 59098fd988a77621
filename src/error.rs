//! Engine error type shared by every stage.

use thiserror::Error;

/// Errors produced by the scene engine and its collaborators
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("quota exhausted for {provider}: {used}/{limit} used this period, {requested} more requested")]
    QuotaExhausted {
        provider: String,
        used: u64,
        limit: u64,
        requested: u64,
    },

    /// The provider itself refused further billable work
    #[error("quota exhausted for {provider} (provider side): {message}")]
    ProviderQuota { provider: String, message: String },

    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    #[error("{what} timed out after {secs:.0}s")]
    Timeout { what: String, secs: f64 },

    #[error("FFmpeg error: {0}")]
    Toolchain(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Invalid scene plan: {0}")]
    InvalidPlan(String),

    #[error("Missing asset: {0}")]
    MissingAsset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EngineError {
    /// Shorthand for a provider-side failure.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True for budget rejections. These are never retried.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. } | Self::ProviderQuota { .. })
    }

    /// True when a retry of the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider { .. } | Self::Timeout { .. } | Self::Io(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error()),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_message_mentions_quota() {
        let err = EngineError::QuotaExhausted {
            provider: "tts".into(),
            used: 10_000,
            limit: 10_000,
            requested: 42,
        };
        assert!(err.is_quota());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("quota"));
        assert!(err.to_string().contains("10000/10000"));
    }

    #[test]
    fn provider_side_quota_is_quota() {
        let err = EngineError::ProviderQuota {
            provider: "premium-video".into(),
            message: "HTTP 402: insufficient balance".into(),
        };
        assert!(err.is_quota());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("insufficient balance"));
    }

    #[test]
    fn provider_and_timeout_are_transient() {
        assert!(EngineError::provider("veo", "503").is_transient());
        assert!(EngineError::Timeout {
            what: "clip job".into(),
            secs: 600.0
        }
        .is_transient());
        assert!(!EngineError::InvalidPlan("empty".into()).is_transient());
        assert!(!EngineError::Toolchain("bad filter".into()).is_transient());
    }
}
