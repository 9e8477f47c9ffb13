// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Weekly recommendation digest.
//!
//! Users and recommendations live in a PostgREST-style store: the user row
//! in the `next-auth` schema, recommendations behind the
//! `get_user_recommendations` function.

use crate::config::StoreConfig;
use crate::error::{check_response, TaskError};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

const USERS: &str = "/rest/v1/users";
const RECOMMENDATIONS_RPC: &str = "/rest/v1/rpc/get_user_recommendations";
const AUTH_SCHEMA: &str = "next-auth";

/// Recommendations per digest.
pub const DIGEST_SIZE: usize = 5;

const DEFAULT_REASON: &str = "recommended for you";

#[derive(Debug, Deserialize)]
struct UserRow {
    #[serde(default)]
    bluesky_username: Option<String>,
}

/// One suggested account, as returned by the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub struct RecommendationStore {
    http: Client,
    base_url: String,
    service_key: String,
}

impl RecommendationStore {
    pub fn new(http: Client, config: &StoreConfig) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// The user's Bluesky handle.
    pub async fn bluesky_handle(&self, user_id: &str) -> Result<String, TaskError> {
        let filter = format!("eq.{user_id}");
        let request = self
            .http
            .get(format!("{}{}", self.base_url, USERS))
            .header("Accept-Profile", AUTH_SCHEMA)
            .query(&[
                ("select", "id,bluesky_username"),
                ("id", filter.as_str()),
                ("limit", "1"),
            ]);
        let response = self.authorized(request).send().await?;
        let rows: Vec<UserRow> = check_response(response, USERS)
            .await?
            .json()
            .await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| TaskError::UserNotFound(user_id.to_string()))?;
        row.bluesky_username
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TaskError::NoBlueskyHandle(user_id.to_string()))
    }

    /// Up to [`DIGEST_SIZE`] recommendations for the user.
    pub async fn recommendations(&self, user_id: &str) -> Result<Vec<Recommendation>, TaskError> {
        let request = self
            .http
            .post(format!("{}{}", self.base_url, RECOMMENDATIONS_RPC))
            .header("Content-Profile", "public")
            .json(&json!({ "user_id": user_id, "limit": DIGEST_SIZE }));
        let response = self.authorized(request).send().await?;
        let mut recommendations: Vec<Recommendation> = check_response(response, RECOMMENDATIONS_RPC)
            .await?
            .json()
            .await?;

        recommendations.truncate(DIGEST_SIZE);
        info!(count = recommendations.len(), "Fetched recommendations");
        Ok(recommendations)
    }
}

/// Digest text for `handle`, or `None` when no recommendation names an account.
pub fn format_digest(handle: &str, recommendations: &[Recommendation]) -> Option<String> {
    let mut lines = String::new();
    for reco in recommendations {
        let Some(reco_handle) = reco.handle.as_deref().filter(|h| !h.is_empty()) else {
            debug!("Skipping recommendation without a handle");
            continue;
        };
        let name = reco
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(|n| format!(" ({n})"))
            .unwrap_or_default();
        let reason = reco.reason.as_deref().unwrap_or(DEFAULT_REASON);
        lines.push_str(&format!(
            "• @{}{name} - {reason}\n",
            reco_handle.trim_start_matches('@')
        ));
    }

    if lines.is_empty() {
        return None;
    }

    Some(format!(
        "Hello @{handle}!\n\n\
         Here is this week's selection of accounts to follow:\n\
         {lines}\n\
         Thank you for taking part in our research on social network portability."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reco(handle: Option<&str>, name: Option<&str>, reason: Option<&str>) -> Recommendation {
        Recommendation {
            handle: handle.map(String::from),
            name: name.map(String::from),
            reason: reason.map(String::from),
        }
    }

    #[test]
    fn digest_lists_each_account() {
        let digest = format_digest(
            "alice.bsky.social",
            &[
                reco(Some("bob.bsky.social"), Some("Bob"), Some("followed on X")),
                reco(Some("carol.bsky.social"), None, None),
            ],
        )
        .unwrap();

        assert!(digest.starts_with("Hello @alice.bsky.social!"));
        assert!(digest.contains("• @bob.bsky.social (Bob) - followed on X\n"));
        assert!(digest.contains("• @carol.bsky.social - recommended for you\n"));
    }

    #[test]
    fn digest_strips_leading_at_and_ignores_empty_name() {
        let digest =
            format_digest("alice.bsky.social", &[reco(Some("@dave.bsky.social"), Some(""), None)])
                .unwrap();
        assert!(digest.contains("• @dave.bsky.social - recommended for you\n"));
    }

    #[test]
    fn entries_without_handle_are_skipped() {
        assert!(format_digest("alice.bsky.social", &[reco(None, Some("Nobody"), None)]).is_none());
        assert!(format_digest("alice.bsky.social", &[]).is_none());
    }
}
