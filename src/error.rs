use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Field-level messages returned by the backend on a rejected write,
/// keyed by field name (`non_field_errors` for object-level problems).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors(pub BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Parse a DRF style error body. Anything that is not an object of
    /// strings / string lists is kept verbatim under `detail`.
    pub fn from_body(body: &str) -> Self {
        let mut fields = BTreeMap::new();
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => {
                for (field, value) in map {
                    fields.insert(field, messages_of(&value));
                }
            }
            Ok(serde_json::Value::Array(items)) => {
                let messages = items.iter().flat_map(messages_of).collect();
                fields.insert("non_field_errors".to_string(), messages);
            }
            _ => {
                fields.insert("detail".to_string(), vec![body.trim().to_string()]);
            }
        }
        Self(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn messages_of(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items.iter().flat_map(messages_of).collect(),
        other => vec![other.to_string()],
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(" "))?;
        }
        Ok(())
    }
}

/// Everything that can go wrong talking to the event backend.
///
/// Cloneable so a single refresh outcome can be handed to every request
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("login rejected: {0}")]
    CredentialsRejected(String),

    #[error("not authorized")]
    Unauthorized,

    #[error("session refresh failed: {0}")]
    RefreshFailed(String),

    #[error("session refresh was abandoned before it completed")]
    RefreshAbandoned,

    #[error("rejected by backend: {0}")]
    Validation(FieldErrors),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("token storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// True for the failures that end the stored session.
    pub fn is_auth_loss(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized | ApiError::RefreshFailed(_) | ApiError::RefreshAbandoned
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Storage(e.to_string())
    }
}
