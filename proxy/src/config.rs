// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the Mastodon proxy.
//!
//! Values come from the environment (optionally seeded from a `.env` file by
//! the binary). Every field has a default so an empty environment yields a
//! runnable proxy with an empty static whitelist.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the proxy service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8000)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// CORS configuration
    #[serde(default)]
    pub cors: CorsConfig,

    /// Upstream forwarding configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Instance registry backend, chosen once at startup
    #[serde(default)]
    pub registry: RegistryBackend,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Origins allowed to call the proxy from a browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins (default: http://localhost:3000)
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Forwarding behaviour towards Mastodon instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Per-call timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Keep plain `http://` targets instead of upgrading them to HTTPS
    /// (default: false; only meant for local testing)
    #[serde(default)]
    pub allow_insecure: bool,
}

/// Where the trusted instance list lives.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum RegistryBackend {
    /// Directly connected PostgreSQL database
    Postgres { database_url: String },
    /// Remote REST store reached with a bearer token
    Rest { url: String, api_key: String },
    /// Fixed list from configuration
    Static {
        #[serde(default)]
        instances: Vec<String>,
    },
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors: CorsConfig::default(),
            upstream: UpstreamConfig::default(),
            registry: RegistryBackend::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            allow_insecure: false,
        }
    }
}

impl Default for RegistryBackend {
    fn default() -> Self {
        Self::Static {
            instances: Vec::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for RegistryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres { .. } => f.write_str("Postgres { database_url: <redacted> }"),
            Self::Rest { url, .. } => f
                .debug_struct("Rest")
                .field("url", url)
                .field("api_key", &"<redacted>")
                .finish(),
            Self::Static { instances } => f
                .debug_struct("Static")
                .field("instances", instances)
                .finish(),
        }
    }
}

impl RegistryBackend {
    /// Short backend name for logs and health output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres { .. } => "postgres",
            Self::Rest { .. } => "rest",
            Self::Static { .. } => "static",
        }
    }
}

impl UpstreamConfig {
    /// Get the upstream timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from process environment variables.
    ///
    /// - `BIND_ADDR`
    /// - `ALLOWED_ORIGINS` (comma separated)
    /// - `REQUEST_TIMEOUT_SECS`
    /// - `PROXY_ALLOW_INSECURE_UPSTREAM`
    /// - `METRICS_ENABLED`, `METRICS_PATH`
    /// - registry: `DATABASE_URL`, else `SUPABASE_URL` + `SUPABASE_KEY`,
    ///   else `MASTODON_INSTANCES_WHITELIST` (comma separated)
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

        let registry = if let Some(database_url) = var("DATABASE_URL") {
            RegistryBackend::Postgres { database_url }
        } else if let (Some(url), Some(api_key)) = (var("SUPABASE_URL"), var("SUPABASE_KEY")) {
            RegistryBackend::Rest {
                url: url.trim_end_matches('/').to_string(),
                api_key,
            }
        } else {
            RegistryBackend::Static {
                instances: var("MASTODON_INSTANCES_WHITELIST")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
            }
        };

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            cors: CorsConfig {
                allowed_origins: var("ALLOWED_ORIGINS")
                    .map(|v| split_list(&v))
                    .unwrap_or(defaults.cors.allowed_origins),
            },
            upstream: UpstreamConfig {
                timeout_secs: var("REQUEST_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.upstream.timeout_secs),
                allow_insecure: var("PROXY_ALLOW_INSECURE_UPSTREAM")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(defaults.upstream.allow_insecure),
            },
            registry,
            metrics: MetricsConfig {
                enabled: var("METRICS_ENABLED")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(defaults.metrics.enabled),
                path: var("METRICS_PATH").unwrap_or(defaults.metrics.path),
            },
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
