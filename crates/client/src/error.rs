use adacta_core::api::ErrorBody;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;
use crate::transport::TransportFailure;

/// Status the server uses to reject a missing or expired credential.
pub const AUTH_REJECTED_STATUS: u16 = 401;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No response was received.
    #[error("transport error: {0}")]
    Transport(String),
    /// The server rejected the credential; the session has been cleared.
    #[error("authentication rejected: {message}")]
    AuthRejected { message: String },
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// A successful response could not be decoded or transformed.
    #[error("processing error: {0}")]
    Processing(String),
    #[error("session storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// Classifies a raw transport failure without touching session state.
    pub fn from_failure(failure: TransportFailure) -> Self {
        match failure {
            TransportFailure::Connection(reason) => Self::Transport(reason),
            TransportFailure::Status {
                status,
                status_text,
                body,
                ..
            } => {
                let message = normalize_message(status, &status_text, &body);
                if status == AUTH_REJECTED_STATUS {
                    Self::AuthRejected { message }
                } else {
                    Self::Server { status, message }
                }
            }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthRejected { .. } => Some(AUTH_REJECTED_STATUS),
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable message suitable for display next to a view.
    pub fn message(&self) -> String {
        match self {
            Self::AuthRejected { message } | Self::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}

impl From<StoreError> for ClientError {
    fn from(value: StoreError) -> Self {
        Self::Storage(value.to_string())
    }
}

/// Prefers `body.message`, then the status text, then a bare status line.
pub fn normalize_message(status: u16, status_text: &str, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .or_else(|| {
            let text = status_text.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}

/// Failure description published on a loading cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub status: Option<u16>,
    pub message: String,
}

impl From<&ClientError> for ErrorInfo {
    fn from(value: &ClientError) -> Self {
        Self {
            status: value.status(),
            message: value.message(),
        }
    }
}
