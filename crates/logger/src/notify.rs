//! Operator notification sinks. The live loop and the daily summary only see
//! `NotificationSink`; which backend is wired in is a configuration choice.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one HTML-formatted message. `Err` means the operator did not get it.
    async fn send(&self, text: &str) -> Result<()>;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ── Telegram ─────────────────────────────────────────────────────────────────

pub struct TelegramSink {
    client:  reqwest::Client,
    token:   String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self { client: http_client(), token: token.into(), chat_id: chat_id.into() }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            warn!("Telegram sendMessage failed: {} — {}", status, snippet);
            bail!("Telegram sendMessage failed: {}", status);
        }
        Ok(())
    }
}

// ── Telegram inbound ─────────────────────────────────────────────────────────

/// One text message received by the bot.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub chat_id: String,
    pub text:    String,
}

/// Operator messages sent to the bot, drained once per cycle.
#[async_trait]
pub trait CommandFeed: Send + Sync {
    /// Messages received since the previous call.
    async fn poll(&self) -> Result<Vec<InboundMessage>>;
}

/// `getUpdates` without long polling; the offset moves past every update seen.
pub struct TelegramUpdates {
    client:         reqwest::Client,
    token:          String,
    last_update_id: Mutex<Option<i64>>,
}

impl TelegramUpdates {
    pub fn new(token: impl Into<String>) -> Self {
        Self { client: http_client(), token: token.into(), last_update_id: Mutex::new(None) }
    }
}

#[async_trait]
impl CommandFeed for TelegramUpdates {
    async fn poll(&self) -> Result<Vec<InboundMessage>> {
        let url = format!("https://api.telegram.org/bot{}/getUpdates", self.token);
        let mut query = vec![("timeout", "0".to_string())];
        if let Some(last) = *self.last_update_id.lock() {
            query.push(("offset", (last + 1).to_string()));
        }
        let resp = self.client.get(&url).query(&query).send().await?;
        if !resp.status().is_success() {
            bail!("Telegram getUpdates failed: {}", resp.status());
        }
        let body: Value = resp.json().await?;
        let (messages, last) = parse_updates(&body);
        if let Some(id) = last {
            *self.last_update_id.lock() = Some(id);
        }
        Ok(messages)
    }
}

/// Text messages and channel posts of a `getUpdates` body, plus the highest
/// update id seen (also for updates that carry no text).
pub fn parse_updates(body: &Value) -> (Vec<InboundMessage>, Option<i64>) {
    let mut last = None;
    let mut out = Vec::new();
    let updates = body.get("result").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
    for upd in updates {
        if let Some(id) = upd.get("update_id").and_then(Value::as_i64) {
            last = Some(last.map_or(id, |l: i64| l.max(id)));
        }
        let Some(msg) = upd.get("message").or_else(|| upd.get("channel_post")) else {
            continue;
        };
        let text = msg.get("text").and_then(Value::as_str).unwrap_or("").trim();
        let chat_id = match msg.pointer("/chat/id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        if text.is_empty() || chat_id.is_empty() {
            continue;
        }
        out.push(InboundMessage { chat_id, text: text.to_string() });
    }
    (out, last)
}

// ── ntfy ─────────────────────────────────────────────────────────────────────

pub struct NtfySink {
    client: reqwest::Client,
    url:    String,
    title:  String,
}

impl NtfySink {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self { client: http_client(), url: url.into(), title: title.into() }
    }
}

#[async_trait]
impl NotificationSink for NtfySink {
    async fn send(&self, text: &str) -> Result<()> {
        let resp = self.client
            .post(&self.url)
            .header("Title", self.title.as_str())
            .header("Priority", "high")
            .header("Tags", "soccer")
            .body(strip_html(text))
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("ntfy publish failed: {}", resp.status());
        }
        info!("NTFY sent: {}", self.title);
        Ok(())
    }
}

/// ntfy renders plain text, so the Telegram markup is dropped.
fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&amp;", "&").replace("&lt;", "<").replace("&gt;", ">")
}

// ── log only ─────────────────────────────────────────────────────────────────

/// Used when no credentials are configured: the message goes to the log only.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, text: &str) -> Result<()> {
        info!(target: "notify", "{}", strip_html(text));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_keeps_text_only() {
        assert_eq!(
            strip_html("<b>OVER</b> 2.5 &amp; more\n<i>x</i>"),
            "OVER 2.5 & more\nx"
        );
    }

    #[test]
    fn updates_keep_text_messages_and_advance_offset() {
        let body = serde_json::json!({
            "ok": true,
            "result": [
                {"update_id": 41, "message": {"chat": {"id": -1001}, "text": " /kvota "}},
                {"update_id": 42, "edited_message": {"chat": {"id": 5}, "text": "/summary"}},
                {"update_id": 43, "channel_post": {"chat": {"id": 7}, "text": "/summary"}},
                {"update_id": 44, "message": {"chat": {"id": 5}, "sticker": {}}}
            ]
        });
        let (messages, last) = parse_updates(&body);
        assert_eq!(last, Some(44));
        assert_eq!(
            messages,
            vec![
                InboundMessage { chat_id: "-1001".into(), text: "/kvota".into() },
                InboundMessage { chat_id: "7".into(), text: "/summary".into() },
            ]
        );
        assert_eq!(parse_updates(&serde_json::json!({"ok": false})), (Vec::new(), None));
    }

    #[tokio::test]
    async fn log_sink_always_delivers() {
        assert!(LogSink.send("<b>hello</b>").await.is_ok());
    }
}
