// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Delivery and task errors, and their classification.

use fedigate_common::ErrorKind;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// Bluesky's refusals when the recipient restricts who may message them.
const RECIPIENT_REFUSALS: [&str; 2] = [
    "recipient has disabled incoming messages",
    "recipient requires incoming messages to come from someone they follow",
];

#[derive(Debug, Error)]
pub enum DmError {
    #[error("Missing configuration: {0}")]
    MissingCredentials(&'static str),

    #[error("Recipient not found: {0}")]
    NotResolvable(String),

    /// The platform's own refusal message, unmodified.
    #[error("{0}")]
    Unreachable(String),

    #[error("Rate limited by {endpoint}: {body}")]
    RateLimited { endpoint: String, body: String },

    #[error("{endpoint} returned {status}: {body}")]
    Platform {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {endpoint}: {reason}")]
    Protocol { endpoint: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl DmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotResolvable(_) => ErrorKind::RecipientNotResolvable,
            Self::Unreachable(_) => ErrorKind::RecipientUnreachable,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            // A body we cannot decode is the platform's fault, not the network's.
            Self::Http(err) if err.is_decode() => ErrorKind::UnexpectedPlatformError,
            Self::Http(_) => ErrorKind::UpstreamError,
            Self::MissingCredentials(_) | Self::Platform { .. } | Self::Protocol { .. } => {
                ErrorKind::UnexpectedPlatformError
            }
        }
    }

    pub(crate) fn protocol(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures of a worker task outside the delivery itself.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User has no Bluesky username: {0}")]
    NoBlueskyHandle(String),

    #[error(transparent)]
    Store(#[from] DmError),
}

impl TaskError {
    /// Payload and configuration problems are the caller's, not a platform's.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::InvalidPayload(_) | Self::MissingConfig(_) => None,
            Self::UserNotFound(_) | Self::NoBlueskyHandle(_) => {
                Some(ErrorKind::RecipientNotResolvable)
            }
            Self::Store(err) => Some(err.kind()),
        }
    }
}

impl From<reqwest::Error> for TaskError {
    fn from(err: reqwest::Error) -> Self {
        Self::Store(DmError::Http(err))
    }
}

/// XRPC error body: `{"error": "InvalidRequest", "message": "..."}`.
#[derive(Debug, Deserialize)]
struct XrpcError {
    #[serde(default)]
    message: Option<String>,
}

/// Pass successful responses through; turn everything else into a [`DmError`].
///
/// 429 is always `RateLimited`. A body carrying one of the recipient
/// refusals becomes `Unreachable` with the platform's message verbatim.
pub(crate) async fn check_response(response: Response, endpoint: &str) -> Result<Response, DmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(DmError::RateLimited {
            endpoint: endpoint.to_string(),
            body,
        });
    }

    if let Some(message) = recipient_refusal(&body) {
        return Err(DmError::Unreachable(message));
    }

    Err(DmError::Platform {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn recipient_refusal(body: &str) -> Option<String> {
    if !RECIPIENT_REFUSALS.iter().any(|r| body.contains(r)) {
        return None;
    }
    let message = serde_json::from_str::<XrpcError>(body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            DmError::NotResolvable("x".into()).kind(),
            ErrorKind::RecipientNotResolvable
        );
        assert_eq!(
            DmError::Unreachable("x".into()).kind(),
            ErrorKind::RecipientUnreachable
        );
        assert_eq!(
            DmError::MissingCredentials("MASTODON_BOT_ACCESSTOKEN").kind(),
            ErrorKind::UnexpectedPlatformError
        );
    }

    #[test]
    fn refusal_message_is_taken_from_xrpc_body() {
        let body = r#"{"error":"InvalidRequest","message":"recipient has disabled incoming messages"}"#;
        assert_eq!(
            recipient_refusal(body).as_deref(),
            Some("recipient has disabled incoming messages")
        );
    }

    #[test]
    fn unrelated_errors_are_not_refusals() {
        assert!(recipient_refusal(r#"{"error":"InternalServerError"}"#).is_none());
    }

    #[test]
    fn unreachable_displays_verbatim() {
        let err = DmError::Unreachable(
            "recipient requires incoming messages to come from someone they follow".into(),
        );
        assert_eq!(
            err.to_string(),
            "recipient requires incoming messages to come from someone they follow"
        );
    }
}
