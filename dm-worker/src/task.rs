// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Worker tasks: the JSON payload the process is invoked with, and the one
//! JSON line it answers with.

use crate::config::DmConfig;
use crate::engine::DmEngine;
use crate::error::TaskError;
use crate::newsletter::{format_digest, RecommendationStore};
use crate::types::{DeliveryResult, DmMessage, DmRecipient, Platform, DEFAULT_TEST_MESSAGE};
use fedigate_common::ErrorKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, Instrument};

/// `{recipient_handle, custom_message?, platform?}` or `{user_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WorkerTask {
    DirectMessage {
        recipient_handle: String,
        #[serde(default)]
        custom_message: Option<String>,
        #[serde(default)]
        platform: Option<Platform>,
    },
    Newsletter {
        user_id: String,
    },
}

impl WorkerTask {
    pub fn parse(payload: &str) -> Result<Self, TaskError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// The single line printed on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerOutcome {
    pub fn failed(err: &TaskError) -> Self {
        Self {
            success: false,
            recipient: None,
            message: None,
            error_kind: err.kind(),
            error: Some(err.to_string()),
        }
    }

    /// Failure before any task could be parsed.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            recipient: None,
            message: None,
            error_kind: None,
            error: Some(error.into()),
        }
    }

    fn skipped(message: &str) -> Self {
        Self {
            success: true,
            recipient: None,
            message: Some(message.to_string()),
            error_kind: None,
            error: None,
        }
    }
}

impl From<DeliveryResult> for WorkerOutcome {
    fn from(result: DeliveryResult) -> Self {
        Self {
            success: result.success,
            recipient: Some(result.recipient),
            message: None,
            error_kind: result.error_kind,
            error: result.error,
        }
    }
}

pub struct Worker {
    engine: DmEngine,
    store: Option<RecommendationStore>,
}

impl Worker {
    pub fn new(config: &DmConfig) -> Result<Self, reqwest::Error> {
        let store = match &config.store {
            Some(store) => Some(RecommendationStore::new(
                Client::builder().timeout(config.timeout()).build()?,
                store,
            )),
            None => None,
        };

        Ok(Self {
            engine: DmEngine::new(config)?,
            store,
        })
    }

    pub async fn run(&self, task: WorkerTask) -> WorkerOutcome {
        match task {
            WorkerTask::DirectMessage {
                recipient_handle,
                custom_message,
                platform,
            } => {
                let platform = platform.unwrap_or_else(|| Platform::infer(&recipient_handle));
                let recipient = DmRecipient::new(recipient_handle, platform);
                let message = DmMessage::new(
                    custom_message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_TEST_MESSAGE.to_string()),
                );
                self.engine.deliver(&recipient, &message).await.into()
            }
            WorkerTask::Newsletter { user_id } => {
                let span = info_span!("newsletter", user_id = %user_id);
                match self.newsletter(&user_id).instrument(span).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(user_id = %user_id, error = %err, "Newsletter task failed");
                        WorkerOutcome::failed(&err)
                    }
                }
            }
        }
    }

    async fn newsletter(&self, user_id: &str) -> Result<WorkerOutcome, TaskError> {
        let store = self
            .store
            .as_ref()
            .ok_or(TaskError::MissingConfig("SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY"))?;

        let handle = store.bluesky_handle(user_id).await?;
        let recommendations = store.recommendations(user_id).await?;

        let Some(digest) = format_digest(&handle, &recommendations) else {
            info!("No recommendations to send");
            return Ok(WorkerOutcome::skipped("No recommendations to send"));
        };

        let recipient = DmRecipient::new(handle, Platform::Bluesky);
        Ok(self.engine.deliver(&recipient, &DmMessage::new(digest)).await.into())
    }
}
