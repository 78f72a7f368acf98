//! Echo Server Example
//!
//! A WebSocket server whose controller echoes text back to the sender.
//!
//! # Protocol
//!
//! Clients send JSON text frames carrying a route path and a body:
//!
//! ```text
//! {"reqPath": "/echo",  "requestBody": "hello"}
//! {"reqPath": "/shout", "requestBody": {"text": "hello", "times": 2}}
//! {"reqPath": "/ping"}
//! ```
//!
//! `/shout` is guarded: the session must have connected with an
//! `x-echo-token` header, and the text must not exceed the configured size.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-server -- --config switchboard.toml
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use switchboard::prelude::*;
use switchboard::transport::SessionHub;

// ============================================================================
// Command Line
// ============================================================================

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file; the current directory is searched when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Configuration profile, e.g. `production`.
    #[arg(short, long)]
    profile: Option<String>,

    /// Maximum accepted `/shout` text length.
    #[arg(long, default_value_t = 64)]
    max_text: usize,
}

// ============================================================================
// Filters
// ============================================================================

/// Admits sessions that presented an `x-echo-token` header.
struct TokenFilter;

#[async_trait]
impl SocketFilter for TokenFilter {
    async fn do_filter(&self, session: &Session, _: &str, _: &dyn RequestView) -> bool {
        session.attribute("x-echo-token").is_some()
    }

    fn priority(&self) -> Option<i32> {
        Some(0)
    }
}

/// Rejects `/shout` texts longer than the limit.
struct SizeFilter {
    max_text: usize,
}

#[async_trait]
impl SocketFilter for SizeFilter {
    async fn do_filter(&self, _: &Session, _: &str, request: &dyn RequestView) -> bool {
        request
            .body::<Shout>()
            .is_none_or(|shout| shout.text.len() <= self.max_text)
    }

    fn priority(&self) -> Option<i32> {
        Some(10)
    }
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug, Deserialize)]
struct Shout {
    text: String,
    #[serde(default = "one")]
    times: usize,
}

fn one() -> usize {
    1
}

struct EchoController {
    hub: Arc<SessionHub>,
    online: AtomicUsize,
}

impl EchoController {
    async fn reply<T: Serialize + Sync>(&self, session_id: &SessionId, path: &str, body: T) {
        let response = Response::ok(body).with_path(path);
        if let Err(e) = self.hub.send_response(session_id, &response).await {
            error!(session = %session_id, error = %e, "Failed to send reply");
        }
    }
}

#[socket_controller]
impl EchoController {
    #[on_connect]
    async fn joined(&self, session: Session) {
        let online = self.online.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            session = %session.id(),
            remote = session.remote_addr().unwrap_or("unknown"),
            online,
            "Session joined"
        );
    }

    #[on_disconnect]
    async fn left(&self, session: Session, status: CloseStatus) {
        let online = self.online.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        info!(session = %session.id(), code = status.code(), online, "Session left");
    }

    #[socket_mapping(path = "/echo")]
    async fn echo(&self, request: Request<String>) {
        let session_id = request.session_id.clone();
        let text = request.into_body().unwrap_or_default();
        self.reply(&session_id, "/echo", text).await;
    }

    #[socket_mapping(path = "/shout", filters(SizeFilter, TokenFilter))]
    async fn shout(&self, request: Request<Shout>) {
        let Some(shout) = request.request_body.as_ref() else {
            return;
        };
        let loud = vec![shout.text.to_uppercase(); shout.times.clamp(1, 8)].join(" ");
        self.reply(&request.session_id, "/shout", loud).await;
    }

    #[socket_mapping(path = "/ping", optional_body)]
    async fn ping(&self, request: Request<serde_json::Value>) {
        self.reply(&request.session_id, "/ping", "pong").await;
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = SwitchboardRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build()?;

    runtime
        .provide(EchoController {
            hub: runtime.hub().clone(),
            online: AtomicUsize::new(0),
        })
        .provide(TokenFilter)
        .provide(SizeFilter {
            max_text: args.max_text,
        });

    info!(
        addr = %runtime.config().server.addr(),
        path = %runtime.config().server.path,
        "Starting echo server"
    );
    runtime.run().await?;

    Ok(())
}
