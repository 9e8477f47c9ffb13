// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Whitelist-gated forwarding of Mastodon API calls.
//!
//! A request is checked in two stages before any network traffic:
//! 1. hostname syntax ([`crate::validator`]), local and cheap
//! 2. registry membership ([`crate::registry`]), possibly a remote call
//!
//! Accepted requests are forwarded exactly once. Retries are the caller's
//! business.

use crate::config::UpstreamConfig;
use crate::metrics::{Outcome, ProxyMetrics};
use crate::registry::InstanceRegistry;
use crate::validator::{validate_domain, ValidationError, ValidationResult};
use fedigate_common::ErrorKind;
use reqwest::header::{
    HeaderMap, HeaderName, ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST,
    PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use reqwest::redirect::Policy;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use url::Url;

/// Generic call to forward to a Mastodon instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRequest {
    /// Full target URL, e.g. `https://mastodon.social/api/v1/accounts/1`
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    /// JSON body, only sent for POST, PUT and PATCH
    #[serde(default)]
    pub data: Option<Value>,
    /// Query parameters, only sent for GET
    #[serde(default)]
    pub params: Option<BTreeMap<String, String>>,
}

/// Upstream body, parsed as JSON when the upstream says it is JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

/// Normalized upstream response.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
    pub request_id: String,
}

/// Why a target instance was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceRejection {
    Malformed(ValidationError),
    UnparsableUrl,
    UnsupportedScheme(String),
    NotWhitelisted,
}

impl fmt::Display for InstanceRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "{err}"),
            Self::UnparsableUrl => f.write_str("URL cannot be parsed"),
            Self::UnsupportedScheme(scheme) => write!(f, "scheme {scheme:?} is not http(s)"),
            Self::NotWhitelisted => f.write_str("instance is not whitelisted"),
        }
    }
}

/// Mediation error types.
#[derive(Debug, Error)]
pub enum MediationError {
    #[error("Invalid Mastodon instance: {domain} ({reason})")]
    InvalidInstance {
        domain: String,
        reason: InstanceRejection,
    },

    #[error("Invalid HTTP method: {0:?}")]
    InvalidMethod(String),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl MediationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // A bad method is client input too; the taxonomy has one kind for it.
            Self::InvalidInstance { .. } | Self::InvalidMethod(_) => ErrorKind::InvalidInstance,
            Self::Upstream(_) => ErrorKind::UpstreamError,
        }
    }

    fn outcome(&self) -> Outcome {
        match self {
            Self::InvalidInstance { .. } => Outcome::InvalidInstance,
            Self::InvalidMethod(_) => Outcome::InvalidMethod,
            Self::Upstream(_) => Outcome::UpstreamError,
        }
    }

    fn invalid(domain: impl Into<String>, reason: InstanceRejection) -> Self {
        Self::InvalidInstance {
            domain: domain.into(),
            reason,
        }
    }
}

/// Fresh correlation id for one inbound request.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validates, forwards and normalizes proxy requests.
pub struct ProxyMediator {
    client: reqwest::Client,
    registry: InstanceRegistry,
    allow_insecure: bool,
    metrics: Option<Arc<ProxyMetrics>>,
}

impl ProxyMediator {
    pub fn new(registry: InstanceRegistry, upstream: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(upstream.timeout())
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            registry,
            allow_insecure: upstream.allow_insecure,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<ProxyMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the upstream HTTP client (custom resolvers, proxies).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Mediate one request under a freshly generated correlation id.
    pub async fn mediate(&self, request: ProxyRequest) -> Result<ProxyResponse, MediationError> {
        self.mediate_with_id(request, new_request_id()).await
    }

    /// Mediate one request; every log line it produces carries `request_id`.
    pub async fn mediate_with_id(
        &self,
        request: ProxyRequest,
        request_id: String,
    ) -> Result<ProxyResponse, MediationError> {
        let span = info_span!("mediate", request_id = %request_id);
        let result = self.forward(request, request_id).instrument(span).await;

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(_) => metrics.record(Outcome::Forwarded),
                Err(err) => metrics.record(err.outcome()),
            }
        }
        result
    }

    async fn forward(
        &self,
        request: ProxyRequest,
        request_id: String,
    ) -> Result<ProxyResponse, MediationError> {
        info!(method = %request.method, url = %request.url, "Mastodon proxy request");

        let mut url = match self.admit(&request.url).await {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "Rejected proxy target");
                return Err(err);
            }
        };

        let method = parse_method(&request.method)?;

        if !self.allow_insecure && url.scheme() == "http" && url.set_scheme("https").is_err() {
            return Err(MediationError::invalid(
                url.host_str().unwrap_or_default(),
                InstanceRejection::UnsupportedScheme(url.scheme().to_string()),
            ));
        }

        let mut builder = self.client.request(method.clone(), url.clone());
        for (name, value) in request.headers.iter().flatten() {
            if is_transport_header(name) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if sends_body(&method) {
            if let Some(data) = &request.data {
                builder = builder.json(data);
            }
        }
        if method == Method::GET {
            if let Some(params) = &request.params {
                builder = builder.query(params);
            }
        }

        let started = Instant::now();
        let response = builder.send().await;
        if let Some(metrics) = &self.metrics {
            metrics.observe_upstream(started.elapsed());
        }
        let response = response.map_err(|err| {
            error!(error = %err, timeout = err.is_timeout(), "Upstream request failed");
            MediationError::Upstream(err)
        })?;

        let status_code = response.status().as_u16();
        let headers = flatten_headers(response.headers());
        let content_type = headers.get(CONTENT_TYPE.as_str()).cloned();
        let text = response.text().await.map_err(|err| {
            error!(error = %err, "Failed to read upstream body");
            MediationError::Upstream(err)
        })?;

        info!(status = status_code, "Mastodon proxy response");

        Ok(ProxyResponse {
            status_code,
            headers,
            body: classify_body(content_type.as_deref(), text),
            request_id,
        })
    }

    /// Syntax check, then whitelist check. Returns the parsed target URL.
    async fn admit(&self, raw_url: &str) -> Result<Url, MediationError> {
        let url = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(_) => {
                let authority = authority_of(raw_url);
                let reason = match validate_domain(&authority) {
                    ValidationResult::Invalid(err) => InstanceRejection::Malformed(err),
                    ValidationResult::Valid => InstanceRejection::UnparsableUrl,
                };
                return Err(MediationError::invalid(authority, reason));
            }
        };

        if !matches!(url.scheme(), "http" | "https") {
            return Err(MediationError::invalid(
                url.host_str().unwrap_or_default(),
                InstanceRejection::UnsupportedScheme(url.scheme().to_string()),
            ));
        }

        let host = url.host_str().unwrap_or_default().to_string();
        if let ValidationResult::Invalid(err) = validate_domain(&host) {
            return Err(MediationError::invalid(host, InstanceRejection::Malformed(err)));
        }

        if !self.registry.is_trusted(&host).await {
            return Err(MediationError::invalid(host, InstanceRejection::NotWhitelisted));
        }

        Ok(url)
    }
}

fn parse_method(raw: &str) -> Result<Method, MediationError> {
    let normalized = raw.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        return Err(MediationError::InvalidMethod(raw.to_string()));
    }
    Method::from_bytes(normalized.as_bytes()).map_err(|_| MediationError::InvalidMethod(raw.to_string()))
}

fn sends_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Headers the HTTP client computes itself for the forwarded call, plus
/// hop-by-hop headers. `accept-encoding` is dropped because the client does
/// not decompress, and the body must come back as the upstream wrote it.
const TRANSPORT_HEADERS: &[HeaderName] = &[
    HOST,
    CONTENT_LENGTH,
    ACCEPT_ENCODING,
    CONNECTION,
    TRANSFER_ENCODING,
    TE,
    TRAILER,
    UPGRADE,
    PROXY_AUTHORIZATION,
];

fn is_transport_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("keep-alive")
        || name.eq_ignore_ascii_case("proxy-connection")
        || TRANSPORT_HEADERS
            .iter()
            .any(|header| name.eq_ignore_ascii_case(header.as_str()))
}

/// Authority part of a URL that failed to parse, e.g. `not a domain!`.
fn authority_of(raw: &str) -> String {
    raw.split('/').nth(2).unwrap_or(raw).to_string()
}

/// Collapse repeated headers into one comma separated value.
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    flat
}

fn is_json_media_type(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_lowercase();
    media == "application/json" || media.ends_with("+json")
}

/// JSON when declared and well formed, raw text otherwise.
fn classify_body(content_type: Option<&str>, text: String) -> ResponseBody {
    if content_type.is_some_and(is_json_media_type) {
        if let Ok(value) = serde_json::from_str(&text) {
            return ResponseBody::Json(value);
        }
    }
    ResponseBody::Text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InstanceStore, RegistryError, StaticStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        inner: StaticStore,
        lists: AtomicUsize,
    }

    #[async_trait]
    impl InstanceStore for CountingStore {
        fn backend(&self) -> &'static str {
            "counting"
        }

        async fn list(&self) -> Result<Vec<String>, RegistryError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list().await
        }

        async fn add(&self, domain: &str) -> Result<(), RegistryError> {
            self.inner.add(domain).await
        }
    }

    fn request(url: &str, method: &str) -> ProxyRequest {
        ProxyRequest {
            url: url.to_string(),
            method: method.to_string(),
            headers: None,
            data: None,
            params: None,
        }
    }

    fn counting_mediator() -> (ProxyMediator, Arc<CountingStore>) {
        let store = Arc::new(CountingStore {
            inner: StaticStore::new(["mastodon.social"]),
            lists: AtomicUsize::new(0),
        });
        let mediator = ProxyMediator::new(
            InstanceRegistry::new(store.clone()),
            &UpstreamConfig::default(),
        )
        .unwrap();
        (mediator, store)
    }

    #[tokio::test]
    async fn test_malformed_host_skips_registry() {
        let (mediator, store) = counting_mediator();

        let err = mediator
            .mediate(request("https://not a domain!/api/v1/instance", "GET"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInstance);
        assert!(matches!(
            err,
            MediationError::InvalidInstance {
                ref domain,
                reason: InstanceRejection::Malformed(ValidationError::InvalidCharacter { .. }),
            } if domain == "not a domain!"
        ));
        assert_eq!(store.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_whitelisted_host_rejected() {
        let (mediator, store) = counting_mediator();

        let err = mediator
            .mediate(request("https://evil.example/api/v1/instance", "GET"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MediationError::InvalidInstance {
                reason: InstanceRejection::NotWhitelisted,
                ..
            }
        ));
        assert_eq!(store.lists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_http_scheme_rejected() {
        let (mediator, _) = counting_mediator();
        let err = mediator
            .mediate(request("ftp://mastodon.social/file", "GET"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediationError::InvalidInstance {
                reason: InstanceRejection::UnsupportedScheme(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bad_method_rejected_after_admission() {
        let (mediator, _) = counting_mediator();
        let err = mediator
            .mediate(request("https://mastodon.social/api/v1/instance", "GE T"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediationError::InvalidMethod(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidInstance);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method(" patch ").unwrap(), Method::PATCH);
        assert!(parse_method("").is_err());
    }

    #[test]
    fn test_body_classification() {
        assert_eq!(
            classify_body(Some("application/json; charset=utf-8"), r#"{"id":"1"}"#.to_string()),
            ResponseBody::Json(json!({ "id": "1" }))
        );
        assert_eq!(
            classify_body(Some("application/activity+json"), "[]".to_string()),
            ResponseBody::Json(json!([]))
        );
        assert_eq!(
            classify_body(Some("text/html"), "<p>hi</p>".to_string()),
            ResponseBody::Text("<p>hi</p>".to_string())
        );
        assert_eq!(
            classify_body(Some("application/json"), "not json".to_string()),
            ResponseBody::Text("not json".to_string())
        );
        assert_eq!(
            classify_body(None, "{}".to_string()),
            ResponseBody::Text("{}".to_string())
        );
    }

    #[test]
    fn test_transport_headers_are_not_forwarded() {
        for name in ["Host", "content-length", "Accept-Encoding", "Connection", "TE", "Keep-Alive"] {
            assert!(is_transport_header(name), "{name}");
        }
        for name in ["Authorization", "Accept", "Idempotency-Key"] {
            assert!(!is_transport_header(name), "{name}");
        }
    }

    #[tokio::test]
    async fn test_plain_http_target_is_upgraded_to_https() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(200).body("plain http");
            })
            .await;

        let registry = InstanceRegistry::new(Arc::new(StaticStore::new(["mastodon.social"])));
        let client = reqwest::Client::builder()
            .resolve("mastodon.social", *server.address())
            .build()
            .unwrap();
        let mediator = ProxyMediator::new(registry, &UpstreamConfig::default())
            .unwrap()
            .with_http_client(client);

        let url = format!("http://mastodon.social:{}/api/v1/instance", server.port());
        let err = mediator.mediate(request(&url, "GET")).await.unwrap_err();

        assert!(matches!(err, MediationError::Upstream(_)));
        assert_eq!(err.kind(), ErrorKind::UpstreamError);
        mock.assert_hits_async(0).await;
    }

    #[test]
    fn test_authority_extraction() {
        assert_eq!(authority_of("https://not a domain!/x"), "not a domain!");
        assert_eq!(authority_of("garbage"), "garbage");
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}
