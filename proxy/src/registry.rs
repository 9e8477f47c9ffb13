// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Trusted instance registry.
//!
//! One read/write interface over three interchangeable stores:
//! 1. PostgreSQL, connected directly ([`crate::db::PostgresStore`])
//! 2. A remote REST store with bearer-token auth ([`crate::rest_store::RestStore`])
//! 3. A static list from configuration ([`StaticStore`])
//!
//! The registry is fail-closed: when the store cannot be read, no instance is
//! trusted. Store errors are logged here and never reach callers of
//! [`InstanceRegistry::is_trusted`].

use crate::config::RegistryBackend;
use crate::db::PostgresStore;
use crate::metrics::ProxyMetrics;
use crate::rest_store::RestStore;
use async_trait::async_trait;
use fedigate_common::ErrorKind;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Registry store error types.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry store answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Registry configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::RegistryUnavailable
    }
}

/// Backing store for the trusted instance list.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// All stored domains, ordered.
    async fn list(&self) -> Result<Vec<String>, RegistryError>;

    /// Insert a normalized domain. Inserting an existing domain succeeds
    /// without creating a duplicate.
    async fn add(&self, domain: &str) -> Result<(), RegistryError>;

    /// One-time startup work such as creating tables.
    async fn prepare(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// Case-normalize a domain for storage and comparison.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_ascii_lowercase()
}

/// Registry facade used by the mediator and the HTTP handlers.
#[derive(Clone)]
pub struct InstanceRegistry {
    store: Arc<dyn InstanceStore>,
    metrics: Option<Arc<ProxyMetrics>>,
}

impl InstanceRegistry {
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    /// Build the store selected by configuration.
    ///
    /// No network traffic happens here; see [`InstanceRegistry::prepare`].
    pub fn from_backend(backend: &RegistryBackend, timeout: Duration) -> Result<Self, RegistryError> {
        let store: Arc<dyn InstanceStore> = match backend {
            RegistryBackend::Postgres { database_url } => {
                Arc::new(PostgresStore::new(database_url, timeout)?)
            }
            RegistryBackend::Rest { url, api_key } => {
                Arc::new(RestStore::new(url.clone(), api_key.clone(), timeout)?)
            }
            RegistryBackend::Static { instances } => Arc::new(StaticStore::new(instances)),
        };
        info!(backend = store.backend(), "Instance registry configured");
        Ok(Self::new(store))
    }

    /// Count store failures in the given metrics.
    pub fn with_metrics(mut self, metrics: Arc<ProxyMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Run the store's startup work. Failures are logged; the registry stays
    /// usable and keeps failing closed until the store recovers.
    pub async fn prepare(&self) {
        if let Err(err) = self.store.prepare().await {
            warn!(
                backend = self.store.backend(),
                error = %err,
                "Instance store preparation failed"
            );
        }
    }

    /// Trusted domains, or an empty list when the store cannot be read.
    pub async fn list_instances(&self) -> Vec<String> {
        match self.store.list().await {
            Ok(instances) => {
                debug!(count = instances.len(), "Listed trusted instances");
                instances
            }
            Err(err) => {
                error!(
                    backend = self.store.backend(),
                    kind = %err.kind(),
                    error = %err,
                    "Failed to list trusted instances, no instance is trusted"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.registry_failure();
                }
                Vec::new()
            }
        }
    }

    /// Add a domain to the whitelist. Returns `false` when the store is
    /// unreachable or rejects the write.
    pub async fn add_instance(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return false;
        }

        match self.store.add(&domain).await {
            Ok(()) => {
                info!(backend = self.store.backend(), domain = %domain, "Trusted instance added");
                true
            }
            Err(err) => {
                error!(
                    backend = self.store.backend(),
                    domain = %domain,
                    error = %err,
                    "Failed to add trusted instance"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.registry_failure();
                }
                false
            }
        }
    }

    /// Whether `domain` is in the current listing. Checked against the store
    /// on every call.
    pub async fn is_trusted(&self, domain: &str) -> bool {
        let candidate = normalize_domain(domain);
        if candidate.is_empty() {
            return false;
        }
        self.list_instances()
            .await
            .iter()
            .any(|known| normalize_domain(known) == candidate)
    }
}

/// In-memory whitelist seeded from configuration.
///
/// Writes are accepted but only live as long as the process.
#[derive(Debug, Default)]
pub struct StaticStore {
    instances: RwLock<BTreeSet<String>>,
}

impl StaticStore {
    pub fn new<I, S>(instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let instances = instances
            .into_iter()
            .map(|d| normalize_domain(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            instances: RwLock::new(instances),
        }
    }
}

#[async_trait]
impl InstanceStore for StaticStore {
    fn backend(&self) -> &'static str {
        "static"
    }

    async fn list(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.instances.read().await.iter().cloned().collect())
    }

    async fn add(&self, domain: &str) -> Result<(), RegistryError> {
        self.instances.write().await.insert(domain.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that is always down.
    struct UnreachableStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InstanceStore for UnreachableStore {
        fn backend(&self) -> &'static str {
            "unreachable"
        }

        async fn list(&self) -> Result<Vec<String>, RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RegistryError::Config("connection refused".to_string()))
        }

        async fn add(&self, _domain: &str) -> Result<(), RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RegistryError::Rejected {
                status: 503,
                body: "down".to_string(),
            })
        }
    }

    fn static_registry(instances: &[&str]) -> InstanceRegistry {
        InstanceRegistry::new(Arc::new(StaticStore::new(instances)))
    }

    #[tokio::test]
    async fn test_static_listing_is_ordered_and_normalized() {
        let registry = static_registry(&["piaille.fr", " Mastodon.Social ", "piaille.fr"]);
        assert_eq!(
            registry.list_instances().await,
            vec!["mastodon.social".to_string(), "piaille.fr".to_string()]
        );
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let registry = static_registry(&[]);
        assert!(registry.add_instance("example.social").await);
        assert!(registry.add_instance("EXAMPLE.social").await);

        let listed = registry.list_instances().await;
        assert_eq!(listed, vec!["example.social".to_string()]);
    }

    #[tokio::test]
    async fn test_is_trusted_tracks_current_listing() {
        let registry = static_registry(&["mastodon.social"]);
        assert!(registry.is_trusted("mastodon.social").await);
        assert!(registry.is_trusted("MASTODON.SOCIAL").await);
        assert!(!registry.is_trusted("piaille.fr").await);

        registry.add_instance("piaille.fr").await;
        assert!(registry.is_trusted("piaille.fr").await);
    }

    #[tokio::test]
    async fn test_empty_domain_never_trusted_or_added() {
        let registry = static_registry(&["mastodon.social"]);
        assert!(!registry.is_trusted("").await);
        assert!(!registry.add_instance("   ").await);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_closed() {
        let store = Arc::new(UnreachableStore {
            calls: AtomicUsize::new(0),
        });
        let registry = InstanceRegistry::new(store.clone());

        assert!(registry.list_instances().await.is_empty());
        assert!(!registry.is_trusted("mastodon.social").await);
        assert!(!registry.add_instance("mastodon.social").await);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_from_backend_static() {
        let backend = RegistryBackend::Static {
            instances: vec!["mastodon.social".to_string()],
        };
        let registry = InstanceRegistry::from_backend(&backend, Duration::from_secs(1)).unwrap();
        assert_eq!(registry.backend(), "static");
        assert!(registry.is_trusted("mastodon.social").await);
    }

    #[test]
    fn test_registry_errors_classify_as_unavailable() {
        let err = RegistryError::Rejected {
            status: 500,
            body: String::new(),
        };
        assert_eq!(err.kind(), ErrorKind::RegistryUnavailable);
    }
}
