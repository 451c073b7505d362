//! Telegram channel: long-polls the Bot API and relays messages through
//! the runner.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::{Emit, Event, RunContext, Runner};
use super::Channel;

const POLL_TIMEOUT_SECS: u64 = 30;
const TYPING_ACTION: &str = "typing";

pub struct Telegram {
    api_url: String,
    allowed_users: Vec<i64>,
    runner: Arc<Runner>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    chat: Chat,
    from: Option<User>,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Deserialize)]
struct User {
    id: i64,
}

impl Telegram {
    pub fn new(bot_token: &str, allowed_users: Vec<i64>, runner: Arc<Runner>) -> Self {
        // Long-poll requests block server-side; pad the client timeout.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 5))
            .build()
            .unwrap_or_default();
        Self {
            api_url: format!("https://api.telegram.org/bot{bot_token}"),
            allowed_users,
            runner,
            client,
        }
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let resp = self
            .client
            .post(format!("{}/getUpdates", self.api_url))
            .json(&json!({ "offset": offset, "timeout": POLL_TIMEOUT_SECS }))
            .send()
            .await
            .with_context(|| "getUpdates request failed")?;

        let parsed: GetUpdatesResponse = resp
            .json()
            .await
            .with_context(|| "getUpdates response parse failed")?;
        if !parsed.ok {
            anyhow::bail!("telegram API returned ok=false");
        }
        Ok(parsed.result)
    }

    async fn send_typing(&self, chat_id: i64) {
        let result = self
            .client
            .post(format!("{}/sendChatAction", self.api_url))
            .json(&json!({ "chat_id": chat_id, "action": TYPING_ACTION }))
            .send()
            .await;
        if let Err(e) = result {
            warn!(chat_id, error = %e, "telegram: failed to send typing action");
        }
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/sendMessage", self.api_url))
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .with_context(|| "sendMessage request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("telegram API returned {}", resp.status());
        }
        Ok(())
    }

    async fn handle_message(&self, chat_id: i64, from: Option<i64>, text: &str, cancel: &CancellationToken) {
        if !self.allowed_users.is_empty()
            && !from.is_some_and(|id| self.allowed_users.contains(&id))
        {
            warn!(chat_id, "telegram: message from unauthorized user ignored");
            return;
        }

        info!(chat_id, "telegram: received message");
        self.send_typing(chat_id).await;

        // Fold the run's token events into one reply.
        let buffer: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
        let sink = buffer.clone();
        let emit: Emit = Arc::new(move |event| {
            if let Event::Token { content } = event {
                let mut buf = sink.lock().unwrap_or_else(|e| e.into_inner());
                buf.push_str(&content);
            }
        });

        let session_id = format!("telegram:{chat_id}");
        let ctx = RunContext::new(session_id.clone(), emit, cancel.clone());
        if let Err(e) = self.runner.run(ctx, text).await {
            error!(session_id = %session_id, error = %e, "telegram: run failed");
            let _ = self
                .send_message(chat_id, "Something went wrong handling that message.")
                .await;
            return;
        }

        let reply = buffer.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if reply.is_empty() {
            return;
        }
        if let Err(e) = self.send_message(chat_id, &reply).await {
            error!(chat_id, error = %e, "telegram: failed to send message");
        }
    }
}

#[async_trait]
impl Channel for Telegram {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        info!("telegram: starting long poll");
        let mut offset = 0i64;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let updates = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = self.get_updates(offset) => match result {
                    Ok(u) => u,
                    Err(e) => {
                        error!(error = %e, "telegram: poll failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                },
            };

            for update in updates {
                offset = update.update_id + 1;
                let Some(message) = update.message else { continue };
                if message.text.is_empty() {
                    continue;
                }
                self.handle_message(
                    message.chat.id,
                    message.from.as_ref().map(|u| u.id),
                    &message.text,
                    &cancel,
                )
                .await;
            }
        }
    }
}
