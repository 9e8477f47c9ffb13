// SPDX-License-Identifier: PMPL-1.0-or-later
// Remote REST store for trusted Mastodon instances
//
// Talks to a PostgREST-style endpoint (`/rest/v1/<table>`) authenticated with
// an API key sent both as `apikey` and as a bearer token.

use crate::registry::{InstanceStore, RegistryError};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TABLE_PATH: &str = "/rest/v1/mastodon_instances";

#[derive(Debug, Serialize, Deserialize)]
struct InstanceRow {
    instance: String,
}

/// REST store client
pub struct RestStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestStore {
    /// Create new REST store client
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
    }
}

#[async_trait]
impl InstanceStore for RestStore {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn list(&self) -> Result<Vec<String>, RegistryError> {
        let url = format!("{}{}", self.base_url, TABLE_PATH);

        let response = self
            .authorized(self.client.get(&url))
            .query(&[("select", "instance"), ("order", "instance.asc")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let rows: Vec<InstanceRow> = response.json().await?;
        Ok(rows.into_iter().map(|row| row.instance).collect())
    }

    async fn add(&self, domain: &str) -> Result<(), RegistryError> {
        let url = format!("{}{}", self.base_url, TABLE_PATH);

        let response = self
            .authorized(self.client.post(&url))
            .query(&[("on_conflict", "instance")])
            .header("Prefer", "return=minimal,resolution=ignore-duplicates")
            .json(&InstanceRow {
                instance: domain.to_string(),
            })
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 201 | 204 => Ok(()),
            status => Err(RegistryError::Rejected {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InstanceRegistry;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn store_for(server: &MockServer) -> RestStore {
        RestStore::new(server.base_url(), "service-key".to_string(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(TABLE_PATH)
                    .query_param("select", "instance")
                    .header("apikey", "service-key")
                    .header("authorization", "Bearer service-key");
                then.status(200)
                    .json_body(json!([{ "instance": "mastodon.social" }, { "instance": "piaille.fr" }]));
            })
            .await;

        let instances = store_for(&server).list().await.unwrap();
        assert_eq!(instances, vec!["mastodon.social", "piaille.fr"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_error_status_fails_closed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(TABLE_PATH);
                then.status(503).body("maintenance");
            })
            .await;

        let store = store_for(&server);
        assert!(matches!(
            store.list().await,
            Err(RegistryError::Rejected { status: 503, .. })
        ));

        let registry = InstanceRegistry::new(Arc::new(store));
        assert!(!registry.is_trusted("mastodon.social").await);
    }

    #[tokio::test]
    async fn test_add_posts_row() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(TABLE_PATH)
                    .query_param("on_conflict", "instance")
                    .header("authorization", "Bearer service-key")
                    .json_body(json!({ "instance": "example.social" }));
                then.status(201);
            })
            .await;

        let registry = InstanceRegistry::new(Arc::new(store_for(&server)));
        assert!(registry.add_instance("Example.Social").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_write_returns_false() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TABLE_PATH);
                then.status(401).json_body(json!({ "message": "Invalid API key" }));
            })
            .await;

        let registry = InstanceRegistry::new(Arc::new(store_for(&server)));
        assert!(!registry.add_instance("example.social").await);
    }
}
