//! Slack transport: Web API sends + thread polling for replies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SlackConfig;
use crate::error::TransportError;
use crate::transport::{Transport, EVENT_CHANNEL_CAPACITY};
use crate::types::{ChannelId, InboundEvent, ThreadRef, UserId};

const SLACK_API_BASE_URL: &str = "https://slack.com/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_THREAD_TITLE: usize = 100;
const REPLY_FETCH_LIMIT: &str = "200";

// ── Wire types ──

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackMessage {
    ts: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepliesResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    error: Option<String>,
}

// ── Transport ──

#[derive(Debug, Clone)]
struct WatchedThread {
    channel: ChannelId,
    last_seen: String,
    opened_at: Instant,
}

/// Slack chat backend. Sends go through `chat.postMessage`; replies come
/// back by polling `conversations.replies` on every thread this transport
/// opened, until the watch window expires.
pub struct SlackTransport {
    http: reqwest::Client,
    config: SlackConfig,
    watched: Arc<Mutex<HashMap<ThreadRef, WatchedThread>>>,
}

impl SlackTransport {
    pub fn new(config: SlackConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            config,
            watched: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Post one message, returning its `ts`.
    async fn post(
        &self,
        destination: &ChannelId,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, TransportError> {
        let body = post_body(destination, text, thread_ts);
        let response = self
            .http
            .post(format!("{SLACK_API_BASE_URL}/chat.postMessage"))
            .header("Authorization", format!("Bearer {}", self.config.bot_token))
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Api(format!(
                "chat.postMessage returned HTTP {status}"
            )));
        }

        let parsed: PostMessageResponse = response.json().await?;
        if !parsed.ok {
            return Err(TransportError::Api(
                parsed.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        parsed
            .ts
            .ok_or_else(|| TransportError::Api("chat.postMessage response missing ts".into()))
    }

    fn watch(&self, thread: ThreadRef, channel: ChannelId, parent_ts: String) {
        let mut watched = self.watched.lock().expect("watch set lock poisoned");
        watched.insert(
            thread,
            WatchedThread {
                channel,
                last_seen: parent_ts,
                opened_at: Instant::now(),
            },
        );
    }
}

impl Transport for SlackTransport {
    async fn send(
        &self,
        destination: &ChannelId,
        text: &str,
        thread: Option<&ThreadRef>,
    ) -> Result<ThreadRef, TransportError> {
        match thread {
            Some(thread) => {
                self.post(destination, text, Some(thread.as_str())).await?;
                Ok(thread.clone())
            }
            None => {
                // a question opens a thread: short title in the channel,
                // then the question itself as a reply mentioning the human
                let parent_ts = self.post(destination, &thread_opener(text), None).await?;
                let question = mention(&self.config.user_id, text);
                self.post(destination, &question, Some(&parent_ts)).await?;

                let thread = ThreadRef::new(parent_ts.clone());
                self.watch(thread.clone(), destination.clone(), parent_ts);
                info!(thread = %thread, "question posted");
                Ok(thread)
            }
        }
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<InboundEvent>, TransportError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let poller = Poller {
            http: self.http.clone(),
            config: self.config.clone(),
            watched: Arc::clone(&self.watched),
        };
        tokio::spawn(poller.run(tx));
        Ok(rx)
    }
}

// ── Poller ──

/// Background task feeding the subscriber channel from
/// `conversations.replies` on each watched thread.
struct Poller {
    http: reqwest::Client,
    config: SlackConfig,
    watched: Arc<Mutex<HashMap<ThreadRef, WatchedThread>>>,
}

impl Poller {
    async fn run(self, tx: mpsc::Sender<InboundEvent>) {
        info!(interval = ?self.config.poll_interval(), "reply poller started");
        loop {
            tokio::time::sleep(self.config.poll_interval()).await;
            if tx.is_closed() {
                info!("inbound subscriber dropped; reply poller stopping");
                return;
            }
            self.prune_expired();

            for (thread, watch) in self.watch_list() {
                let replies = match self
                    .fetch_replies(&watch.channel, &thread, &watch.last_seen)
                    .await
                {
                    Ok(replies) => replies,
                    Err(e) => {
                        // one bad fetch must not stall the other threads
                        warn!(thread = %thread, error = %e, "fetching thread replies failed");
                        continue;
                    }
                };

                let fresh = fresh_replies(replies, ts_value(&watch.last_seen));
                if fresh.is_empty() {
                    continue;
                }
                self.advance_last_seen(&thread, &fresh);

                for message in &fresh {
                    let Some(event) = inbound_event(&thread, message) else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        info!("inbound subscriber dropped; reply poller stopping");
                        return;
                    }
                }
            }
        }
    }

    fn watch_list(&self) -> Vec<(ThreadRef, WatchedThread)> {
        let watched = self.watched.lock().expect("watch set lock poisoned");
        watched
            .iter()
            .map(|(thread, watch)| (thread.clone(), watch.clone()))
            .collect()
    }

    fn prune_expired(&self) {
        let window = self.config.watch_window();
        let mut watched = self.watched.lock().expect("watch set lock poisoned");
        let before = watched.len();
        watched.retain(|_, watch| watch.opened_at.elapsed() < window);
        if watched.len() < before {
            debug!(dropped = before - watched.len(), "expired threads unwatched");
        }
    }

    fn advance_last_seen(&self, thread: &ThreadRef, fresh: &[SlackMessage]) {
        let mut watched = self.watched.lock().expect("watch set lock poisoned");
        let Some(watch) = watched.get_mut(thread) else {
            return;
        };
        for message in fresh {
            if ts_value(&message.ts) > ts_value(&watch.last_seen) {
                watch.last_seen = message.ts.clone();
            }
        }
    }

    async fn fetch_replies(
        &self,
        channel: &ChannelId,
        thread: &ThreadRef,
        oldest: &str,
    ) -> Result<Vec<SlackMessage>, TransportError> {
        let response = self
            .http
            .get(format!("{SLACK_API_BASE_URL}/conversations.replies"))
            .header("Authorization", format!("Bearer {}", self.config.bot_token))
            .query(&[
                ("channel", channel.as_str()),
                ("ts", thread.as_str()),
                ("oldest", oldest),
                ("limit", REPLY_FETCH_LIMIT),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Api(format!(
                "conversations.replies returned HTTP {status}"
            )));
        }

        let parsed: RepliesResponse = response.json().await?;
        if !parsed.ok {
            return Err(TransportError::Api(
                parsed.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(parsed.messages)
    }
}

// ── Pure helpers ──

fn post_body(destination: &ChannelId, text: &str, thread_ts: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "channel": destination.as_str(),
        "text": text,
    });
    if let Some(ts) = thread_ts {
        body["thread_ts"] = serde_json::Value::String(ts.to_string());
    }
    body
}

/// Channel-visible headline; the full question lives inside the thread.
fn thread_opener(question: &str) -> String {
    format!("🤖 *Question from AI Assistant*\n{}", thread_title(question))
}

fn thread_title(question: &str) -> String {
    let truncated: String = question.chars().take(MAX_THREAD_TITLE).collect();
    let mut title = truncated.trim().to_string();
    if question.chars().count() > MAX_THREAD_TITLE {
        title.push_str("...");
    }
    title
}

fn mention(user: &UserId, question: &str) -> String {
    format!("<@{}> {}", user, question)
}

fn ts_value(ts: &str) -> f64 {
    ts.parse().unwrap_or(0.0)
}

fn fresh_replies(messages: Vec<SlackMessage>, last_seen: f64) -> Vec<SlackMessage> {
    messages
        .into_iter()
        .filter(|message| ts_value(&message.ts) > last_seen)
        .collect()
}

/// Slack `ts` strings look like "1712345678.000100" (seconds.microseconds).
fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, ""));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<6}").get(..6)?.parse().ok()?
    };
    DateTime::from_timestamp(secs, micros * 1_000)
}

/// Messages without a `user` (bot posts, system notices) are not replies.
fn inbound_event(thread: &ThreadRef, message: &SlackMessage) -> Option<InboundEvent> {
    let author = message.user.as_deref()?;
    Some(InboundEvent {
        thread_ref: thread.clone(),
        author_id: UserId::new(author),
        text: message.text.clone().unwrap_or_default(),
        timestamp: parse_slack_ts(&message.ts).unwrap_or_else(Utc::now),
    })
}
