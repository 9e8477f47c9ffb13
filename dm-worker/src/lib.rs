// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Direct-message delivery to Bluesky and Mastodon.
//!
//! Both platforms are driven through [`DmEngine::deliver`], which always
//! returns a [`DeliveryResult`]. Failures are classified into
//! [`fedigate_common::ErrorKind`] so callers can tell a recipient who refuses
//! messages apart from a transient platform problem.

pub mod bluesky;
pub mod config;
pub mod engine;
pub mod error;
pub mod mastodon;
pub mod newsletter;
pub mod task;
pub mod types;

pub use config::DmConfig;
pub use engine::DmEngine;
pub use error::{DmError, TaskError};
pub use task::{Worker, WorkerOutcome, WorkerTask};
pub use types::{DeliveryResult, DmMessage, DmRecipient, Platform};
