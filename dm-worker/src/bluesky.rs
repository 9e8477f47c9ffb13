// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bluesky direct messages over XRPC.
//!
//! Sequence: log the bot in, resolve the recipient's handle to a DID, get
//! (or create) the one-to-one conversation through the chat service, send.
//! The conversation is kept platform-side; nothing is cleaned up.

use crate::config::BlueskyConfig;
use crate::error::{check_response, DmError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const RESOLVE_HANDLE: &str = "com.atproto.identity.resolveHandle";
const GET_CONVO_FOR_MEMBERS: &str = "chat.bsky.convo.getConvoForMembers";
const SEND_MESSAGE: &str = "chat.bsky.convo.sendMessage";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    handle: String,
}

#[derive(Debug, Deserialize)]
struct ResolvedHandle {
    #[serde(default)]
    did: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConvoEnvelope {
    convo: Convo,
}

#[derive(Debug, Deserialize)]
struct Convo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

pub struct BlueskyClient {
    http: Client,
    config: BlueskyConfig,
}

impl BlueskyClient {
    pub fn new(http: Client, config: BlueskyConfig) -> Self {
        Self { http, config }
    }

    /// Deliver `text` to `handle`, returning the id of the sent message.
    pub async fn send_direct_message(&self, handle: &str, text: &str) -> Result<String, DmError> {
        let handle = handle.trim().trim_start_matches('@');

        let session = self.login().await?;
        info!(bot = %session.handle, "Logged in to Bluesky");

        let did = self.resolve_handle(&session, handle).await?;
        debug!(handle = %handle, did = %did, "Resolved recipient");

        let convo_id = self.conversation_for(&session, &did).await?;
        debug!(convo_id = %convo_id, "Conversation ready");

        let message_id = self.send(&session, &convo_id, text).await?;
        info!(convo_id = %convo_id, message_id = %message_id, "Bluesky message sent");
        Ok(message_id)
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.config.service_url.trim_end_matches('/'), method)
    }

    async fn login(&self) -> Result<Session, DmError> {
        let identifier = self
            .config
            .username
            .as_deref()
            .ok_or(DmError::MissingCredentials("BLUESKY_BOT_USERNAME"))?;
        let password = self
            .config
            .password
            .as_deref()
            .ok_or(DmError::MissingCredentials("BLUESKY_BOT_PASSWORD"))?;

        let response = self
            .http
            .post(self.xrpc(CREATE_SESSION))
            .json(&json!({ "identifier": identifier, "password": password }))
            .send()
            .await?;
        let response = check_response(response, CREATE_SESSION).await?;
        Ok(response.json().await?)
    }

    async fn resolve_handle(&self, session: &Session, handle: &str) -> Result<String, DmError> {
        let response = self
            .http
            .get(self.xrpc(RESOLVE_HANDLE))
            .bearer_auth(&session.access_jwt)
            .query(&[("handle", handle)])
            .send()
            .await?;

        // Unknown handles come back as 400 InvalidRequest.
        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 404 {
            return Err(DmError::NotResolvable(handle.to_string()));
        }

        let resolved: ResolvedHandle = check_response(response, RESOLVE_HANDLE).await?.json().await?;
        resolved
            .did
            .filter(|did| !did.is_empty())
            .ok_or_else(|| DmError::NotResolvable(handle.to_string()))
    }

    async fn conversation_for(&self, session: &Session, did: &str) -> Result<String, DmError> {
        let response = self
            .http
            .get(self.xrpc(GET_CONVO_FOR_MEMBERS))
            .bearer_auth(&session.access_jwt)
            .header("atproto-proxy", &self.config.chat_proxy)
            .query(&[("members", did)])
            .send()
            .await?;
        let envelope: ConvoEnvelope = check_response(response, GET_CONVO_FOR_MEMBERS)
            .await?
            .json()
            .await?;
        Ok(envelope.convo.id)
    }

    async fn send(&self, session: &Session, convo_id: &str, text: &str) -> Result<String, DmError> {
        let response = self
            .http
            .post(self.xrpc(SEND_MESSAGE))
            .bearer_auth(&session.access_jwt)
            .header("atproto-proxy", &self.config.chat_proxy)
            .json(&json!({ "convoId": convo_id, "message": { "text": text } }))
            .send()
            .await?;
        let sent: SentMessage = check_response(response, SEND_MESSAGE).await?.json().await?;
        if sent.id.is_empty() {
            return Err(DmError::protocol(SEND_MESSAGE, "message id missing"));
        }
        Ok(sent.id)
    }
}
