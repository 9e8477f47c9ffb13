// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the DM worker.
//!
//! Bot credentials are optional at load time: a missing credential only
//! fails deliveries on the platform that needs it.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Configuration for the DM worker.
#[derive(Debug, Clone, Deserialize)]
pub struct DmConfig {
    #[serde(default)]
    pub bluesky: BlueskyConfig,

    #[serde(default)]
    pub mastodon: MastodonConfig,

    /// Recommendation store used by the newsletter task
    #[serde(default)]
    pub store: Option<StoreConfig>,

    /// Per-call timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Bluesky bot account and services.
#[derive(Clone, Deserialize)]
pub struct BlueskyConfig {
    /// PDS / entryway the bot logs into (default: https://bsky.social)
    #[serde(default = "default_bluesky_service")]
    pub service_url: String,

    /// Value of the `atproto-proxy` header for chat calls
    #[serde(default = "default_chat_proxy")]
    pub chat_proxy: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// Mastodon bot account.
#[derive(Clone, Deserialize)]
pub struct MastodonConfig {
    /// Base URL of the bot's home instance
    #[serde(default)]
    pub instance_url: Option<String>,

    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub bot_username: Option<String>,

    /// Look the sent message up in the bot's conversations (default: true)
    #[serde(default = "default_true")]
    pub verify_delivery: bool,
}

/// REST store holding users and recommendations.
#[derive(Clone, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_bluesky_service() -> String {
    "https://bsky.social".to_string()
}

fn default_chat_proxy() -> String {
    "did:web:api.bsky.chat#bsky_chat".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DmConfig {
    fn default() -> Self {
        Self {
            bluesky: BlueskyConfig::default(),
            mastodon: MastodonConfig::default(),
            store: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service_url: default_bluesky_service(),
            chat_proxy: default_chat_proxy(),
            username: None,
            password: None,
        }
    }
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            instance_url: None,
            access_token: None,
            bot_username: None,
            verify_delivery: default_true(),
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for BlueskyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlueskyConfig")
            .field("service_url", &self.service_url)
            .field("chat_proxy", &self.chat_proxy)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for MastodonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MastodonConfig")
            .field("instance_url", &self.instance_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("bot_username", &self.bot_username)
            .field("verify_delivery", &self.verify_delivery)
            .finish()
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

impl DmConfig {
    /// Load configuration from process environment variables.
    ///
    /// - `BLUESKY_BOT_USERNAME`, `BLUESKY_BOT_PASSWORD`
    /// - `BLUESKY_SERVICE_URL`, `BLUESKY_CHAT_PROXY`
    /// - `MASTODON_INSTANCE_URL`, `MASTODON_BOT_ACCESSTOKEN`, `MASTODON_BOT_USERNAME`
    /// - `MASTODON_VERIFY_DELIVERY`
    /// - `SUPABASE_URL` (or `NEXT_PUBLIC_SUPABASE_URL`) + `SUPABASE_SERVICE_ROLE_KEY`
    /// - `REQUEST_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let store_url = var("SUPABASE_URL").or_else(|| var("NEXT_PUBLIC_SUPABASE_URL"));
        let store = match (store_url, var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_key)) => Some(StoreConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            }),
            _ => None,
        };

        Self {
            bluesky: BlueskyConfig {
                service_url: var("BLUESKY_SERVICE_URL")
                    .and_then(|v| normalize_base_url(&v))
                    .unwrap_or(defaults.bluesky.service_url),
                chat_proxy: var("BLUESKY_CHAT_PROXY").unwrap_or(defaults.bluesky.chat_proxy),
                username: var("BLUESKY_BOT_USERNAME"),
                password: var("BLUESKY_BOT_PASSWORD"),
            },
            mastodon: MastodonConfig {
                instance_url: var("MASTODON_INSTANCE_URL").and_then(|v| normalize_base_url(&v)),
                access_token: var("MASTODON_BOT_ACCESSTOKEN"),
                bot_username: var("MASTODON_BOT_USERNAME"),
                verify_delivery: var("MASTODON_VERIFY_DELIVERY")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(defaults.mastodon.verify_delivery),
            },
            store,
            timeout_secs: var("REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    /// Get the per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `mastodon.social` or `https://mastodon.social/` become `https://mastodon.social`.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    Some(url.as_str().trim_end_matches('/').to_string())
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
