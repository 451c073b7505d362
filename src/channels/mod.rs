//! Chat channels: ingestors that feed user messages into the runner.
//!
//! A channel either registers webhook routes on the gateway mux, runs a
//! long-poll worker, or both.

pub mod telegram;

pub use telegram::Telegram;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::Runner;
use crate::config::Config;

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Webhook routes to merge onto the gateway mux, if any.
    fn routes(&self) -> Option<Router> {
        None
    }

    /// Long-running worker (long-poll loops). Returns when cancelled.
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let _ = cancel;
        Ok(())
    }
}

/// Build all enabled channels from configuration. Unknown types warn and
/// are skipped.
pub fn build_channels(config: &Config, runner: Arc<Runner>) -> Vec<Arc<dyn Channel>> {
    let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
    for (name, channel_cfg) in &config.channel {
        if !channel_cfg.enabled {
            continue;
        }
        match channel_cfg.kind.as_str() {
            "telegram" => {
                let bot_token = channel_cfg
                    .settings
                    .get("bot_token")
                    .cloned()
                    .unwrap_or_default();
                let allowed_users = channel_cfg
                    .settings
                    .get("allowed_users")
                    .map(|v| parse_allowed_users(v))
                    .unwrap_or_default();
                channels.push(Arc::new(Telegram::new(&bot_token, allowed_users, runner.clone())));
                info!(name = %name, kind = "telegram", "channel registered");
            }
            other => {
                warn!(name = %name, kind = %other, "unknown channel type");
            }
        }
    }
    channels
}

/// Comma-separated user id list; malformed entries are skipped.
fn parse_allowed_users(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .collect()
}
