// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Recipients, messages and delivery outcomes.

use crate::error::DmError;
use fedigate_common::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sent when the caller does not supply a message.
pub const DEFAULT_TEST_MESSAGE: &str = "👋 This is a test message. \
If you are reading this, we can reach you by direct message. \
Thank you for being part of our community!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Bluesky,
    Mastodon,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bluesky => "bluesky",
            Self::Mastodon => "mastodon",
        }
    }

    /// `user@instance` is a Mastodon account; anything else a Bluesky handle.
    pub fn infer(handle: &str) -> Self {
        let handle = strip_scheme(handle.trim()).trim_start_matches('@');
        if handle.contains('@') {
            Self::Mastodon
        } else {
            Self::Bluesky
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop a leading `https://` or `http://`.
pub(crate) fn strip_scheme(handle: &str) -> &str {
    handle
        .strip_prefix("https://")
        .or_else(|| handle.strip_prefix("http://"))
        .unwrap_or(handle)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmRecipient {
    pub handle: String,
    pub platform: Platform,
}

impl DmRecipient {
    pub fn new(handle: impl Into<String>, platform: Platform) -> Self {
        Self {
            handle: handle.into(),
            platform,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmMessage {
    pub text: String,
}

impl DmMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Uniform outcome of one delivery, whatever the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Original error text, for diagnostics only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(recipient: &DmRecipient) -> Self {
        Self {
            success: true,
            recipient: recipient.handle.clone(),
            error_kind: None,
            error: None,
        }
    }

    pub fn failed(recipient: &DmRecipient, err: &DmError) -> Self {
        Self {
            success: false,
            recipient: recipient.handle.clone(),
            error_kind: Some(err.kind()),
            error: Some(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_platform_from_handle() {
        assert_eq!(Platform::infer("alice@mastodon.social"), Platform::Mastodon);
        assert_eq!(Platform::infer("@alice@piaille.fr"), Platform::Mastodon);
        assert_eq!(Platform::infer("alice.bsky.social"), Platform::Bluesky);
        assert_eq!(Platform::infer("@alice.bsky.social"), Platform::Bluesky);
    }

    #[test]
    fn strips_scheme() {
        assert_eq!(strip_scheme("https://alice@mastodon.social"), "alice@mastodon.social");
        assert_eq!(strip_scheme("http://alice@mastodon.social"), "alice@mastodon.social");
        assert_eq!(strip_scheme("alice.bsky.social"), "alice.bsky.social");
    }

    #[test]
    fn failed_result_serializes_kind_and_message() {
        let recipient = DmRecipient::new("alice.bsky.social", Platform::Bluesky);
        let err = DmError::Unreachable("recipient has disabled incoming messages".into());
        let json = serde_json::to_value(DeliveryResult::failed(&recipient, &err)).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["recipient"], "alice.bsky.social");
        assert_eq!(json["error_kind"], "recipient_unreachable");
        assert_eq!(json["error"], "recipient has disabled incoming messages");
    }

    #[test]
    fn delivered_result_omits_error_fields() {
        let recipient = DmRecipient::new("alice@mastodon.social", Platform::Mastodon);
        let json = serde_json::to_value(DeliveryResult::delivered(&recipient)).unwrap();
        assert!(json.get("error_kind").is_none());
        assert!(json.get("error").is_none());
    }
}
