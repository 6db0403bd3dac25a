//! Transport-abstracted HTTP client for the Discord REST API.
//!
//! All outbound Discord calls go through [`DiscordHttpClient`] so that auth
//! headers, rate-limit back-off, and error handling live in one place.
//! Command handlers never see the client directly; they talk to the
//! [`ChatApi`] trait, which keeps them testable without a network.

use async_lock::Mutex;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::*;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = "DiscordBot (https://github.com/tchola-bot/tchola-bot, 0.1)";
const MAX_RETRIES: u32 = 5;

// ---------------------------------------------------------------------------
// The seam handlers talk to
// ---------------------------------------------------------------------------

/// The subset of the Discord REST API the command handlers need.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Send a plain text message to a channel.
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message, HttpError>;

    /// Fetch the `limit` most recent messages of a channel, newest first.
    async fn recent_messages(&self, channel_id: &str, limit: u8)
        -> Result<Vec<Message>, HttpError>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), HttpError>;

    /// List up to `limit` members of a guild.
    async fn guild_members(&self, guild_id: &str, limit: u16)
        -> Result<Vec<GuildMember>, HttpError>;
}

// ---------------------------------------------------------------------------
// Rate-limit tracker (per-bucket)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BucketState {
    remaining: u32,
    resets_at: Instant,
}

#[derive(Debug, Clone, Default)]
struct RateLimiter {
    /// Route-key → bucket id mapping.
    route_buckets: HashMap<String, String>,
    /// Bucket id → state.
    buckets: HashMap<String, BucketState>,
    /// Global rate-limit: if set, no requests may be sent until this instant.
    global_until: Option<Instant>,
}

impl RateLimiter {
    /// Returns how long we should wait before sending a request on `route_key`,
    /// or `None` if we can send immediately.
    fn delay_for(&self, route_key: &str) -> Option<Duration> {
        let now = Instant::now();

        if let Some(until) = self.global_until {
            if until > now {
                return Some(until - now);
            }
        }

        let bucket_id = self.route_buckets.get(route_key)?;
        let state = self.buckets.get(bucket_id)?;

        if state.remaining == 0 && state.resets_at > now {
            return Some(state.resets_at - now);
        }

        None
    }

    /// Update internal state from response headers.
    fn update(&mut self, route_key: &str, info: &RateLimitInfo) {
        let reset_after = info
            .reset_after
            .map(|secs| Duration::from_secs_f64(secs.clamp(0.0, 60.0)));

        if info.is_global {
            if let Some(delay) = reset_after {
                self.global_until = Some(Instant::now() + delay);
            }
        }

        if let Some(ref bucket) = info.bucket {
            self.route_buckets
                .insert(route_key.to_string(), bucket.clone());
            self.buckets.insert(
                bucket.clone(),
                BucketState {
                    remaining: info.remaining.unwrap_or(1),
                    resets_at: Instant::now() + reset_after.unwrap_or(Duration::from_secs(1)),
                },
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Parse rate-limit headers from a response
// ---------------------------------------------------------------------------

/// At most the first 200 characters of a response body, for error messages.
fn body_snippet(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().take(200).collect()
}

fn parse_rate_limit_headers(headers: &HeaderMap) -> RateLimitInfo {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    RateLimitInfo {
        remaining: header("x-ratelimit-remaining").and_then(|s| s.parse().ok()),
        reset_after: header("x-ratelimit-reset-after").and_then(|s| s.parse().ok()),
        bucket: header("x-ratelimit-bucket").map(str::to_string),
        is_global: header("x-ratelimit-global") == Some("true"),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HttpError {
    /// Non-success status from Discord.
    #[error("Discord API error {status} on {route}: {body}")]
    Api {
        status: u16,
        body: String,
        route: String,
    },
    /// Transport / network error.
    #[error("HTTP transport error: {0}")]
    Transport(String),
    /// Serialisation error.
    #[error("Serialisation error: {0}")]
    Serde(String),
}

// ---------------------------------------------------------------------------
// DiscordHttpClient
// ---------------------------------------------------------------------------

/// A thin, rate-limit–aware HTTP client for the Discord REST API.
///
/// Cheap to clone (internals are behind `Arc`).
#[derive(Clone)]
pub struct DiscordHttpClient {
    token: String,
    client: reqwest::Client,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl DiscordHttpClient {
    /// Create a new client with the given bot token. Every request is bounded
    /// by `timeout`.
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        Ok(Self {
            token: token.into(),
            client,
            limiter: Arc::new(Mutex::new(RateLimiter::default())),
        })
    }

    // ------------------------------------------------------------------
    // Low-level: the single request method everything funnels through
    // ------------------------------------------------------------------

    /// Send a request to `{BASE_URL}/{path}`.
    ///
    /// `route_key` is used for per-route rate-limit bucketing. It should be a
    /// template like `POST /channels/{channel_id}/messages`.
    ///
    /// Returns the raw response body as bytes on success.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, HttpError> {
        let url = format!("{}/{}", BASE_URL, path.trim_start_matches('/'));

        for attempt in 0..=MAX_RETRIES {
            // Pre-request: wait if the rate limiter says so.
            let delay = self.limiter.lock().await.delay_for(route_key);
            if let Some(delay) = delay {
                let delay = delay.min(Duration::from_secs(60));
                debug!(
                    route = route_key,
                    delay_ms = delay.as_millis() as u64,
                    "rate-limit pre-emptive backoff"
                );
                tokio::time::sleep(delay).await;
            }

            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("authorization", format!("Bot {}", self.token));
            if let Some(json) = body {
                req = req.json(json);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            let status = resp.status();
            let rl_info = parse_rate_limit_headers(resp.headers());

            // Update the limiter regardless of status.
            self.limiter.lock().await.update(route_key, &rl_info);

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                let retry_after = rl_info.reset_after.unwrap_or(1.0).clamp(0.0, 60.0);
                warn!(
                    route = route_key,
                    attempt,
                    retry_after_s = retry_after,
                    global = rl_info.is_global,
                    "rate-limited by Discord, backing off"
                );
                tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                continue;
            }

            let resp_bytes = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            if status.is_success() {
                return Ok(resp_bytes.to_vec());
            }

            return Err(HttpError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&resp_bytes).to_string(),
                route: route_key.to_string(),
            });
        }

        Err(HttpError::Api {
            status: 429,
            body: "rate-limited after max retries".to_string(),
            route: route_key.to_string(),
        })
    }

    /// Like [`request`](Self::request) but deserialises the response body as JSON.
    pub async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, HttpError> {
        let bytes = self.request(method, path, route_key, body).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| HttpError::Serde(format!("{}: {}", e, body_snippet(&bytes))))
    }

    // ------------------------------------------------------------------
    // Convenience: Users
    // ------------------------------------------------------------------

    /// The bot's own user. Used at startup to validate the token.
    pub async fn current_user(&self) -> Result<User, HttpError> {
        self.request_json(Method::GET, "users/@me", "GET /users/@me", None)
            .await
    }

    // ------------------------------------------------------------------
    // Convenience: Messages
    // ------------------------------------------------------------------

    pub async fn create_message(
        &self,
        channel_id: &str,
        msg: &CreateMessage,
    ) -> Result<Message, HttpError> {
        let path = format!("channels/{}/messages", channel_id);
        let route_key = format!("POST /channels/{}/messages", channel_id);
        let body = serde_json::to_value(msg).map_err(|e| HttpError::Serde(e.to_string()))?;
        self.request_json(Method::POST, &path, &route_key, Some(&body))
            .await
    }

    /// Fetch messages from a channel. `query` is appended as a query string
    /// (e.g. `limit=100&before=1234`).
    pub async fn get_messages(
        &self,
        channel_id: &str,
        query: &str,
    ) -> Result<Vec<Message>, HttpError> {
        let path = format!("channels/{}/messages?{}", channel_id, query);
        let route_key = format!("GET /channels/{}/messages", channel_id);
        self.request_json(Method::GET, &path, &route_key, None)
            .await
    }

    pub async fn delete_channel_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), HttpError> {
        let path = format!("channels/{}/messages/{}", channel_id, message_id);
        let route_key = format!("DELETE /channels/{}/messages", channel_id);
        // Discord returns 204 No Content on success, so there is no JSON to parse.
        self.request(Method::DELETE, &path, &route_key, None)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Convenience: Guilds
    // ------------------------------------------------------------------

    /// List guild members (requires the GUILD_MEMBERS privileged intent).
    pub async fn list_guild_members(
        &self,
        guild_id: &str,
        limit: u16,
    ) -> Result<Vec<GuildMember>, HttpError> {
        let path = format!("guilds/{}/members?limit={}", guild_id, limit);
        let route_key = format!("GET /guilds/{}/members", guild_id);
        self.request_json(Method::GET, &path, &route_key, None)
            .await
    }
}

#[async_trait]
impl ChatApi for DiscordHttpClient {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<Message, HttpError> {
        let msg = CreateMessage::new().content(content);
        self.create_message(channel_id, &msg).await
    }

    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<Message>, HttpError> {
        self.get_messages(channel_id, &format!("limit={}", limit))
            .await
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), HttpError> {
        self.delete_channel_message(channel_id, message_id).await
    }

    async fn guild_members(
        &self,
        guild_id: &str,
        limit: u16,
    ) -> Result<Vec<GuildMember>, HttpError> {
        self.list_guild_members(guild_id, limit).await
    }
}

impl std::fmt::Debug for DiscordHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttpClient")
            .field("token", &"<redacted>")
            .finish()
    }
}
