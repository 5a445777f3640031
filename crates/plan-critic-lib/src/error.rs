//! Error taxonomy for the critic core.
//!
//! Extraction never fails (malformed fields degrade to empty strings). Data
//! and fitting problems surface as `Data` / `Training`, and anything that
//! prevents the gate from using a model is `ModelUnavailable`.

use std::path::Path;

use thiserror::Error;

/// Main error type for training and gating.
#[derive(Error, Debug)]
pub enum CriticError {
    /// The record pool cannot be split or stratified.
    #[error("data error: {0}")]
    Data(String),

    /// Fitting failed; no partial artifact is ever produced.
    #[error("training error: {0}")]
    Training(String),

    /// The gate could not obtain a usable artifact or score.
    #[error("model unavailable ({location}): {reason}")]
    ModelUnavailable { location: String, reason: String },

    /// Invalid configuration values or an unreadable config file.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure outside of model loading (dataset reads, artifact writes).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CriticError {
    pub(crate) fn unavailable(path: Option<&Path>, reason: impl Into<String>) -> Self {
        CriticError::ModelUnavailable {
            location: path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory".to_string()),
            reason: reason.into(),
        }
    }

    /// True for the condition the conversation loop must handle with a fallback policy.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, CriticError::ModelUnavailable { .. })
    }
}

// linfa reports fitting problems through its own error type; they are fitting failures here.
impl From<linfa::Error> for CriticError {
    fn from(err: linfa::Error) -> Self {
        CriticError::Training(err.to_string())
    }
}

/// Result type alias for critic operations.
pub type Result<T> = std::result::Result<T, CriticError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_unavailable_message_names_the_path() {
        let err = CriticError::unavailable(Some(Path::new("models/x.json")), "bad version");
        let msg = err.to_string();
        assert!(msg.contains("models/x.json"));
        assert!(msg.contains("bad version"));
        assert!(err.is_model_unavailable());
    }

    #[test]
    fn data_error_is_not_model_unavailable() {
        assert!(!CriticError::Data("empty pool".into()).is_model_unavailable());
    }
}
