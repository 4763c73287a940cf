//! Shape validation errors

use thiserror::Error;

/// Why a generator payload was rejected
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("payload is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotObject,

    #[error("missing required key '{0}'")]
    MissingKey(String),

    #[error("key '{key}' must be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("action '{0}' is outside the planner vocabulary")]
    UnknownAction(String),
}

impl ShapeError {
    pub fn wrong_type(key: impl Into<String>, expected: &'static str) -> Self {
        ShapeError::WrongType {
            key: key.into(),
            expected,
        }
    }
}
