// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for the proxy.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Final outcome of one mediation, used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forwarded,
    InvalidInstance,
    InvalidMethod,
    UpstreamError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forwarded => "forwarded",
            Self::InvalidInstance => "invalid_instance",
            Self::InvalidMethod => "invalid_method",
            Self::UpstreamError => "upstream_error",
        }
    }
}

/// Metric handles plus the registry they are exported from.
pub struct ProxyMetrics {
    registry: Registry,
    requests: IntCounterVec,
    upstream_seconds: Histogram,
    registry_failures: IntCounter,
}

impl ProxyMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "fedigate_proxy_requests_total",
                "Proxy requests by outcome",
            ),
            &["outcome"],
        )?;
        let upstream_seconds = Histogram::with_opts(HistogramOpts::new(
            "fedigate_proxy_upstream_seconds",
            "Latency of forwarded upstream calls",
        ))?;
        let registry_failures = IntCounter::new(
            "fedigate_registry_failures_total",
            "Instance store reads or writes that failed",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(upstream_seconds.clone()))?;
        registry.register(Box::new(registry_failures.clone()))?;

        Ok(Self {
            registry,
            requests,
            upstream_seconds,
            registry_failures,
        })
    }

    pub fn record(&self, outcome: Outcome) {
        self.requests.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn observe_upstream(&self, elapsed: Duration) {
        self.upstream_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn registry_failure(&self) {
        self.registry_failures.inc();
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn count(&self, outcome: Outcome) -> u64 {
        self.requests.with_label_values(&[outcome.as_str()]).get()
    }
}
