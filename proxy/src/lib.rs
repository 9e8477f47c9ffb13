// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mastodon API proxy
//!
//! This crate mediates client calls to Mastodon instances:
//!
//! - Hostname syntax validation before anything touches the network
//! - Whitelist of trusted instances behind a pluggable store
//!   (PostgreSQL, REST store, or static configuration)
//! - Single-attempt forwarding with a bounded timeout
//! - Response normalization with a per-request correlation id

pub mod config;
pub mod db;
pub mod handlers;
pub mod mediator;
pub mod metrics;
pub mod registry;
pub mod rest_store;
pub mod validator;

pub use config::Config;
pub use mediator::{MediationError, ProxyMediator, ProxyRequest, ProxyResponse, ResponseBody};
pub use registry::{InstanceRegistry, InstanceStore, StaticStore};
pub use validator::{is_valid_instance_domain, ValidationResult};
