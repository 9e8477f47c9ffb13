// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Single delivery entry point over both platforms.

use crate::bluesky::BlueskyClient;
use crate::config::DmConfig;
use crate::error::DmError;
use crate::mastodon::MastodonClient;
use crate::types::{DeliveryResult, DmMessage, DmRecipient, Platform};
use reqwest::Client;
use tracing::{error, info, info_span, Instrument};

pub struct DmEngine {
    bluesky: BlueskyClient,
    mastodon: MastodonClient,
}

impl DmEngine {
    pub fn new(config: &DmConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("fedigate-dm/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            bluesky: BlueskyClient::new(http.clone(), config.bluesky.clone()),
            mastodon: MastodonClient::new(http, config.mastodon.clone()),
        })
    }

    /// Deliver one message. Never fails: errors come back inside the result.
    pub async fn deliver(&self, recipient: &DmRecipient, message: &DmMessage) -> DeliveryResult {
        let span = info_span!(
            "deliver",
            recipient = %recipient.handle,
            platform = %recipient.platform
        );

        async {
            info!("Delivering direct message");
            match self.dispatch(recipient, message).await {
                Ok(()) => {
                    info!("Direct message delivered");
                    DeliveryResult::delivered(recipient)
                }
                Err(err) => {
                    error!(kind = %err.kind(), error = %err, "Direct message delivery failed");
                    DeliveryResult::failed(recipient, &err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, recipient: &DmRecipient, message: &DmMessage) -> Result<(), DmError> {
        match recipient.platform {
            Platform::Bluesky => {
                self.bluesky
                    .send_direct_message(&recipient.handle, &message.text)
                    .await?;
            }
            Platform::Mastodon => {
                self.mastodon
                    .send_direct_message(&recipient.handle, &message.text)
                    .await?;
            }
        }
        Ok(())
    }
}
