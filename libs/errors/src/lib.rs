//! Unified error type for the gateway and field-agent binaries.
//!
//! Mirrors the taxonomy in spec.md §7: validation failures, transport
//! timeouts, field-side failures, header/decode mismatches, and the
//! ambient (config/transport) errors every service needs regardless of
//! domain scope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request validation failure, carrying enough detail to build the
/// `{ok:false, format, msg, allowedValues?}` record from spec.md §4.3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            allowed_values: None,
        }
    }

    pub fn with_allowed(mut self, allowed: Vec<String>) -> Self {
        self.allowed_values = Some(allowed);
        self
    }
}

/// Main error type shared by `gatewaysrv` and `fieldagent`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("validation failed: {0:?}")]
    Validation(ValidationFailure),

    #[error("Timed Out")]
    Timeout,

    #[error("Error Retrieving Data")]
    FieldFailure,

    #[error("header mismatch in response for unit {unit_id}")]
    HeaderMismatch { unit_id: u8 },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("queue full for device {0}")]
    QueueFull(u8),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("MQTT transport error: {0}")]
    Mqtt(String),

    #[error("serial transport error: {0}")]
    Serial(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// The caller-facing `message` string for the response envelope,
    /// independent of Rust's `Display` wording where spec.md pins an
    /// exact literal (e.g. "Timed Out", "Error Retrieving Data").
    pub fn response_message(&self) -> String {
        match self {
            GatewayError::Validation(f) => f.message.clone(),
            GatewayError::Timeout => "Timed Out".to_string(),
            GatewayError::FieldFailure | GatewayError::HeaderMismatch { .. } => {
                "Error Retrieving Data".to_string()
            }
            GatewayError::QueueFull(_) => "Queue Full".to_string(),
            other => other.to_string(),
        }
    }

    pub fn allowed_values(&self) -> Option<Vec<String>> {
        match self {
            GatewayError::Validation(f) => f.allowed_values.clone(),
            _ => None,
        }
    }
}
