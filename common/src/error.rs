// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Error kinds callers branch on.
//!
//! Component errors (registry, mediator, DM engine) keep their own message
//! text for diagnostics, but each one classifies itself into exactly one of
//! these kinds. The kind is what crosses process and HTTP boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of every failure the gateway reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or non-whitelisted instance domain (client input error)
    InvalidInstance,
    /// Forwarded call failed at the transport level
    UpstreamError,
    /// Registry backend unreachable; the whitelist degrades to empty
    RegistryUnavailable,
    /// Handle does not map to any platform identity
    RecipientNotResolvable,
    /// Platform refuses delivery because of the recipient's privacy settings
    RecipientUnreachable,
    /// Platform throttling; retry after backoff
    RateLimited,
    /// Anything the platform returned that fits no other kind
    UnexpectedPlatformError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInstance => "invalid_instance",
            Self::UpstreamError => "upstream_error",
            Self::RegistryUnavailable => "registry_unavailable",
            Self::RecipientNotResolvable => "recipient_not_resolvable",
            Self::RecipientUnreachable => "recipient_unreachable",
            Self::RateLimited => "rate_limited",
            Self::UnexpectedPlatformError => "unexpected_platform_error",
        }
    }

    /// Whether a caller may retry the same operation after backing off.
    ///
    /// `RecipientUnreachable` is permanent until the recipient changes their
    /// settings, so it is never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamError | Self::RegistryUnavailable | Self::RateLimited
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
