// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mastodon direct messages.
//!
//! Mastodon has no conversation primitive, so a throwaway direct status is
//! posted as a thread root, the real message is posted as a direct reply
//! mentioning the recipient, and the placeholder is deleted again.
//!
//! Only the search, placeholder and reply steps can fail a delivery.
//! Deleting the placeholder and verifying the conversation are best effort
//! and only ever log warnings.

use crate::config::MastodonConfig;
use crate::error::{check_response, DmError};
use crate::types::strip_scheme;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

const ACCOUNT_SEARCH: &str = "/api/v1/accounts/search";
const STATUSES: &str = "/api/v1/statuses";
const CONVERSATIONS: &str = "/api/v1/conversations";

/// Body of the thread-root status.
pub const PLACEHOLDER_TEXT: &str = "Starting conversation...";

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    pub acct: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    #[serde(default)]
    accounts: Vec<Account>,
    #[serde(default)]
    last_status: Option<Status>,
}

pub struct MastodonClient {
    http: Client,
    config: MastodonConfig,
}

impl MastodonClient {
    pub fn new(http: Client, config: MastodonConfig) -> Self {
        Self { http, config }
    }

    /// Deliver `text` to `handle` (`user@instance`), returning the sent status.
    pub async fn send_direct_message(&self, handle: &str, text: &str) -> Result<Status, DmError> {
        let query = normalize_handle(handle);

        let recipient = self.search_account(query).await?;
        debug!(account_id = %recipient.id, acct = %recipient.acct, "Resolved recipient");

        let placeholder = self.post_status(PLACEHOLDER_TEXT, None).await?;
        debug!(status_id = %placeholder.id, "Placeholder posted");

        let reply = format!("@{} {}", recipient.acct, text);
        let sent = match self.post_status(&reply, Some(&placeholder.id)).await {
            Ok(status) => status,
            Err(err) => {
                self.delete_status(&placeholder.id).await;
                return Err(err);
            }
        };
        info!(
            bot = self.config.bot_username.as_deref().unwrap_or("-"),
            status_id = %sent.id,
            "Mastodon message sent"
        );

        self.delete_status(&placeholder.id).await;

        if self.config.verify_delivery {
            self.verify_delivery(&recipient, &sent).await;
        }

        Ok(sent)
    }

    fn base_url(&self) -> Result<&str, DmError> {
        self.config
            .instance_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .ok_or(DmError::MissingCredentials("MASTODON_INSTANCE_URL"))
    }

    fn token(&self) -> Result<&str, DmError> {
        self.config
            .access_token
            .as_deref()
            .ok_or(DmError::MissingCredentials("MASTODON_BOT_ACCESSTOKEN"))
    }

    async fn search_account(&self, query: &str) -> Result<Account, DmError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url()?, ACCOUNT_SEARCH))
            .bearer_auth(self.token()?)
            .query(&[("q", query), ("resolve", "true"), ("limit", "1")])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(DmError::NotResolvable(query.to_string()));
        }

        let accounts: Vec<Account> = check_response(response, ACCOUNT_SEARCH).await?.json().await?;
        accounts
            .into_iter()
            .next()
            .ok_or_else(|| DmError::NotResolvable(query.to_string()))
    }

    async fn post_status(&self, text: &str, in_reply_to: Option<&str>) -> Result<Status, DmError> {
        let mut body = json!({ "status": text, "visibility": "direct" });
        if let Some(parent) = in_reply_to {
            body["in_reply_to_id"] = json!(parent);
        }

        let response = self
            .http
            .post(format!("{}{}", self.base_url()?, STATUSES))
            .bearer_auth(self.token()?)
            .json(&body)
            .send()
            .await?;
        Ok(check_response(response, STATUSES).await?.json().await?)
    }

    /// Best effort; a failure is logged and swallowed.
    async fn delete_status(&self, id: &str) {
        if let Err(err) = self.try_delete_status(id).await {
            warn!(status_id = %id, error = %err, "Failed to delete placeholder status");
        }
    }

    async fn try_delete_status(&self, id: &str) -> Result<(), DmError> {
        let response = self
            .http
            .delete(format!(
                "{}{}/{}",
                self.base_url()?,
                STATUSES,
                urlencoding::encode(id)
            ))
            .bearer_auth(self.token()?)
            .send()
            .await?;
        check_response(response, STATUSES).await?;
        Ok(())
    }

    /// Look for a conversation with the recipient whose last status is `sent`.
    async fn verify_delivery(&self, recipient: &Account, sent: &Status) {
        match self.conversations().await {
            Ok(conversations) => {
                let found = conversations.iter().any(|c| {
                    c.accounts.iter().any(|a| a.id == recipient.id)
                        && c.last_status.as_ref().is_some_and(|s| s.id == sent.id)
                });
                if found {
                    debug!(status_id = %sent.id, "Delivery verified");
                } else {
                    warn!(
                        status_id = %sent.id,
                        "Message sent but not found in conversations"
                    );
                }
            }
            Err(err) => {
                warn!(error = %err, "Could not list conversations to verify delivery");
            }
        }
    }

    async fn conversations(&self) -> Result<Vec<Conversation>, DmError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url()?, CONVERSATIONS))
            .bearer_auth(self.token()?)
            .send()
            .await?;
        Ok(check_response(response, CONVERSATIONS).await?.json().await?)
    }
}

/// `https://@alice@piaille.fr` becomes `alice@piaille.fr`.
fn normalize_handle(handle: &str) -> &str {
    strip_scheme(handle.trim()).trim_start_matches('@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_handles() {
        assert_eq!(normalize_handle("https://alice@piaille.fr"), "alice@piaille.fr");
        assert_eq!(normalize_handle("@alice@piaille.fr"), "alice@piaille.fr");
        assert_eq!(normalize_handle(" alice@piaille.fr "), "alice@piaille.fr");
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_call() {
        let client = MastodonClient::new(
            Client::new(),
            MastodonConfig {
                instance_url: Some("http://127.0.0.1:1".to_string()),
                ..MastodonConfig::default()
            },
        );
        let err = client
            .send_direct_message("alice@piaille.fr", "hi")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DmError::MissingCredentials("MASTODON_BOT_ACCESSTOKEN")
        ));
    }
}
