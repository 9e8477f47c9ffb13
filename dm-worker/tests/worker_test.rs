// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Worker tasks end to end: payload in, outcome out.

use fedigate_common::ErrorKind;
use fedigate_dm::{
    config::{BlueskyConfig, StoreConfig},
    DmConfig, Worker, WorkerTask,
};
use httpmock::prelude::*;
use serde_json::json;

fn worker(server: &MockServer) -> Worker {
    let config = DmConfig {
        bluesky: BlueskyConfig {
            service_url: server.base_url(),
            username: Some("bot.bsky.social".to_string()),
            password: Some("app-password".to_string()),
            ..BlueskyConfig::default()
        },
        store: Some(StoreConfig {
            url: server.base_url(),
            service_key: "service-key".to_string(),
        }),
        timeout_secs: 5,
        ..DmConfig::default()
    };
    Worker::new(&config).unwrap()
}

async fn mock_user(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/users")
                .header("accept-profile", "next-auth")
                .header("apikey", "service-key")
                .query_param("id", "eq.user-1");
            then.status(200).json_body(json!([
                { "id": "user-1", "bluesky_username": "alice.bsky.social" }
            ]));
        })
        .await
}

async fn mock_bluesky(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/xrpc/com.atproto.server.createSession");
            then.status(200).json_body(json!({
                "accessJwt": "access-jwt",
                "handle": "bot.bsky.social",
                "did": "did:plc:bot"
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/xrpc/com.atproto.identity.resolveHandle");
            then.status(200).json_body(json!({ "did": "did:plc:alice" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/xrpc/chat.bsky.convo.getConvoForMembers");
            then.status(200).json_body(json!({ "convo": { "id": "convo-1" } }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/xrpc/chat.bsky.convo.sendMessage")
                .body_contains("@bob.bsky.social (Bob) - followed on X");
            then.status(200).json_body(json!({ "id": "msg-1" }));
        })
        .await
}

#[tokio::test]
async fn test_newsletter_sends_digest() {
    let server = MockServer::start_async().await;
    let user = mock_user(&server).await;
    let recommendations = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/v1/rpc/get_user_recommendations")
                .json_body(json!({ "user_id": "user-1", "limit": 5 }));
            then.status(200).json_body(json!([
                { "handle": "bob.bsky.social", "name": "Bob", "reason": "followed on X" }
            ]));
        })
        .await;
    let send = mock_bluesky(&server).await;

    let task = WorkerTask::parse(r#"{"user_id":"user-1"}"#).unwrap();
    let outcome = worker(&server).run(task).await;

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.recipient.as_deref(), Some("alice.bsky.social"));
    user.assert_hits_async(1).await;
    recommendations.assert_hits_async(1).await;
    send.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_newsletter_without_recommendations_sends_nothing() {
    let server = MockServer::start_async().await;
    mock_user(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rest/v1/rpc/get_user_recommendations");
            then.status(200).json_body(json!([]));
        })
        .await;
    let send = mock_bluesky(&server).await;

    let outcome = worker(&server)
        .run(WorkerTask::Newsletter {
            user_id: "user-1".to_string(),
        })
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.message.as_deref(), Some("No recommendations to send"));
    send.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_newsletter_unknown_user() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/users");
            then.status(200).json_body(json!([]));
        })
        .await;

    let outcome = worker(&server)
        .run(WorkerTask::Newsletter {
            user_id: "missing".to_string(),
        })
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::RecipientNotResolvable));
    assert_eq!(outcome.error.as_deref(), Some("User not found: missing"));
}

#[tokio::test]
async fn test_direct_message_uses_default_text_and_infers_platform() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/xrpc/com.atproto.server.createSession");
            then.status(200).json_body(json!({ "accessJwt": "access-jwt", "handle": "bot.bsky.social" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/xrpc/com.atproto.identity.resolveHandle");
            then.status(200).json_body(json!({ "did": "did:plc:alice" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/xrpc/chat.bsky.convo.getConvoForMembers");
            then.status(200).json_body(json!({ "convo": { "id": "convo-1" } }));
        })
        .await;
    let send = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/xrpc/chat.bsky.convo.sendMessage")
                .body_contains("This is a test message");
            then.status(200).json_body(json!({ "id": "msg-1" }));
        })
        .await;

    let task = WorkerTask::parse(r#"{"recipient_handle":"alice.bsky.social"}"#).unwrap();
    let outcome = worker(&server).run(task).await;

    assert!(outcome.success, "{outcome:?}");
    send.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_mastodon_handle_without_bot_account_fails_cleanly() {
    let server = MockServer::start_async().await;

    let task = WorkerTask::parse(r#"{"recipient_handle":"alice@piaille.fr","custom_message":"hi"}"#)
        .unwrap();
    let outcome = worker(&server).run(task).await;

    assert!(!outcome.success);
    assert_eq!(outcome.recipient.as_deref(), Some("alice@piaille.fr"));
    assert_eq!(outcome.error_kind, Some(ErrorKind::UnexpectedPlatformError));
    assert_eq!(
        outcome.error.as_deref(),
        Some("Missing configuration: MASTODON_INSTANCE_URL")
    );
}
