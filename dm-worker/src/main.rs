// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! DM worker
//!
//! Runs one task and exits: 0 on success, 1 on failure. Exactly one JSON
//! line is printed on stdout; logs go to stderr.
//!
//! ```text
//! fedigate-dm '{"recipient_handle": "alice@piaille.fr", "custom_message": "Hello"}'
//! fedigate-dm '{"user_id": "6f1c..."}'
//! ```

use clap::Parser;
use fedigate_common::LogOutput;
use fedigate_dm::{DmConfig, Worker, WorkerOutcome, WorkerTask};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fedigate-dm", about = "Deliver a direct message on Bluesky or Mastodon")]
struct Args {
    /// Task payload: {"recipient_handle", "custom_message"?, "platform"?} or {"user_id"}
    payload: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    fedigate_common::logging::init(LogOutput::Stderr);

    let args = Args::parse();
    let outcome = run(args.payload).await;

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run(payload: Option<String>) -> WorkerOutcome {
    let Some(payload) = payload else {
        error!("No payload provided");
        return WorkerOutcome::rejected("No payload provided");
    };

    let task = match WorkerTask::parse(&payload) {
        Ok(task) => task,
        Err(err) => {
            error!(error = %err, "Rejected payload");
            return WorkerOutcome::failed(&err);
        }
    };

    let config = DmConfig::from_env();
    let worker = match Worker::new(&config) {
        Ok(worker) => worker,
        Err(err) => {
            error!(error = %err, "Failed to build HTTP client");
            return WorkerOutcome::rejected(format!("Failed to build HTTP client: {err}"));
        }
    };

    let outcome = worker.run(task).await;
    info!(success = outcome.success, "Task finished");
    outcome
}
