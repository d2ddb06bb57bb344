//! Panel error types.

use std::fmt;
use thiserror::Error;

/// Format a panel error body for display, extracting the message from JSON if present.
///
/// Handles the envelopes the supported panels return:
/// - `"HTTP 409: {"detail": "User already exists"}"` → Marzban
/// - `"{"success": false, "msg": "..."}"` → 3x-ui
/// - `"{"error": {"message": "..."}}"` → reverse proxies in front of either
/// - Plain text errors → returned as-is
#[must_use]
pub fn format_api_error(error: &str) -> String {
    if let Some(json_start) = error.find('{') {
        let json_str = &error[json_start..];

        if let Ok(json) = serde_json::from_str::<serde_json::Value>(json_str)
            && let Some(msg) = extract_error_message(&json)
        {
            let prefix = &error[..json_start].trim();
            if prefix.is_empty() {
                return msg;
            }
            return format!("{prefix} {msg}");
        }
    }

    error.to_string()
}

fn extract_error_message(json: &serde_json::Value) -> Option<String> {
    // Marzban validation errors carry a list of {loc, msg} objects under detail
    if let Some(detail) = json.get("detail") {
        if let Some(msg) = detail.as_str() {
            return Some(msg.to_string());
        }
        if let Some(items) = detail.as_array() {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            if !msgs.is_empty() {
                return Some(msgs.join("; "));
            }
        }
    }

    if let Some(msg) = json.get("msg").and_then(|v| v.as_str())
        && !msg.is_empty()
    {
        return Some(msg.to_string());
    }

    if let Some(error_obj) = json.get("error") {
        if let Some(msg) = error_obj.get("message").and_then(|v| v.as_str()) {
            return Some(msg.to_string());
        }
        if let Some(msg) = error_obj.as_str() {
            return Some(msg.to_string());
        }
    }

    json.get("message")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}

/// Coarse classification of a provisioning failure, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Panel rejected the configured credentials.
    Authentication,
    /// Session was rejected again after one renewal and retry.
    SessionExpired,
    /// Request was rejected locally before any network call.
    Validation,
    /// Timeout or connection failure.
    Network,
    /// Panel answered, but with a rejection or an unreadable body.
    Backend,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::SessionExpired => "session expired",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Backend => "backend",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication failed for {panel}: {reason}")]
    Authentication { panel: &'static str, reason: String },

    #[error("Session for {panel} was rejected again after re-login")]
    SessionExpired { panel: &'static str },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Panel error: {0}")]
    Api(String),

    #[error("Failed to decode panel response: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify this error for callers that only render success/failure.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Authentication { .. } => FailureKind::Authentication,
            Self::SessionExpired { .. } => FailureKind::SessionExpired,
            Self::Validation(_) => FailureKind::Validation,
            Self::Http(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                FailureKind::Network
            }
            Self::Http(_) | Self::Api(_) | Self::Decode(_) | Self::Json(_) => {
                FailureKind::Backend
            }
        }
    }

    /// Message suitable for showing to an operator. Panel messages are passed through as-is.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Api(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
