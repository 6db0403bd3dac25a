//! Gateway (WebSocket) transport for the Discord API.
//!
//! This module owns the WebSocket connection lifecycle:
//!   - connect → receive HELLO → send IDENTIFY
//!   - background heartbeat task
//!   - sequence number + session_id tracking
//!   - automatic reconnect + RESUME on disconnect
//!   - gateway send rate limiting (120 events / 60s)
//!   - clean close when the owner asks for shutdown
//!
//! The rest of the codebase consumes a stream of [`GatewayEvent`] values
//! without ever touching `tokio_tungstenite` directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::events::GatewayEvent;
use crate::types::{GatewayPayload, OpCode};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Discord allows at most 120 gateway sends per 60 seconds.
const SEND_BUDGET_MAX: u32 = 120;
const SEND_BUDGET_WINDOW: Duration = Duration::from_secs(60);

/// Maximum number of reconnect attempts before giving up.
const MAX_RECONNECT_ATTEMPTS: u32 = 8;

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

bitflags! {
    /// Gateway intents bitmask sent with IDENTIFY.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Intents: u32 {
        const GUILDS = 1;
        const GUILD_MEMBERS = 1 << 1;
        const GUILD_PRESENCES = 1 << 8;
        const GUILD_MESSAGES = 1 << 9;
        const MESSAGE_CONTENT = 1 << 15;
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why the gateway driver stopped on its own.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway closed the connection with fatal code {0}")]
    Fatal(u16),
    #[error("gave up after {0} reconnect attempts")]
    ReconnectsExhausted(u32),
}

// ---------------------------------------------------------------------------
// Gateway send rate limiter
// ---------------------------------------------------------------------------

/// Simple sliding-window rate limiter for outbound gateway messages.
struct SendRateLimiter {
    timestamps: Vec<Instant>,
    budget: u32,
    window: Duration,
}

impl SendRateLimiter {
    fn new(budget: u32, window: Duration) -> Self {
        Self {
            timestamps: Vec::with_capacity(budget as usize),
            budget,
            window,
        }
    }

    /// Returns how long the caller should wait before sending, or `None` if
    /// it can send immediately. Does **not** record the send.
    fn delay(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut in_window = self
            .timestamps
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window);

        if (in_window.clone().count() as u32) < self.budget {
            return None;
        }

        let oldest = in_window.next()?;
        let expires_at = *oldest + self.window;
        (expires_at > now).then(|| expires_at - now)
    }

    /// Record a send at the current instant and prune old entries.
    fn record(&mut self) {
        let now = Instant::now();
        self.timestamps
            .retain(|&t| now.duration_since(t) < self.window);
        self.timestamps.push(now);
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Options for connecting to the Discord gateway.
#[derive(Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: Intents,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Internal session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SessionState {
    /// From the READY event.
    session_id: Option<String>,
    /// Resume URL provided by Discord in the READY event.
    resume_gateway_url: Option<String>,
    /// Last sequence number seen on a dispatch.
    sequence: Option<u64>,
}

// ---------------------------------------------------------------------------
// WebSocket type aliases (transport boundary)
// ---------------------------------------------------------------------------

type WsConnection =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsConnection, WsMessage>;
type WsStream = futures_util::stream::SplitStream<WsConnection>;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A running gateway connection.
///
/// Events arrive on [`events`](Self::events). The driver keeps reconnecting in
/// the background until [`close`](Self::close) is called, a fatal close code
/// is received, or reconnects are exhausted.
pub struct GatewayHandle {
    pub events: async_channel::Receiver<GatewayEvent>,
    shutdown: mpsc::Sender<()>,
    driver: tokio::task::JoinHandle<Result<(), GatewayError>>,
}

impl GatewayHandle {
    /// Ask the driver to send a normal close frame, then wait for it to stop.
    pub async fn close(self) -> Result<(), GatewayError> {
        // The driver may already be gone; that's fine.
        let _ = self.shutdown.send(()).await;
        self.join().await
    }

    /// Wait for the driver task to finish on its own.
    pub async fn join(self) -> Result<(), GatewayError> {
        match self.driver.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "gateway driver task failed");
                Ok(())
            }
        }
    }
}

/// Connect to the Discord gateway, returning a [`GatewayHandle`].
///
/// This spawns background tasks for:
///   - reading from the WebSocket and parsing events
///   - heartbeating at the interval Discord tells us
///   - reconnecting + resuming on disconnects
///   - rate-limiting outbound sends
pub fn connect(config: GatewayConfig) -> GatewayHandle {
    let (event_tx, event_rx) = async_channel::bounded::<GatewayEvent>(256);
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    let driver = tokio::spawn(gateway_driver(config, event_tx, shutdown_rx));

    GatewayHandle {
        events: event_rx,
        shutdown: shutdown_tx,
        driver,
    }
}

// ---------------------------------------------------------------------------
// The main driver loop (runs in a spawned task)
// ---------------------------------------------------------------------------

async fn gateway_driver(
    config: GatewayConfig,
    event_tx: async_channel::Sender<GatewayEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<(), GatewayError> {
    let session = Arc::new(Mutex::new(SessionState::default()));
    let mut reconnect_attempts: u32 = 0;

    loop {
        if reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
            error!("exceeded max reconnect attempts, giving up");
            return Err(GatewayError::ReconnectsExhausted(MAX_RECONNECT_ATTEMPTS));
        }

        if reconnect_attempts > 0 {
            let backoff = backoff_delay(reconnect_attempts);
            warn!(
                delay_ms = backoff.as_millis() as u64,
                attempt = reconnect_attempts,
                "backing off before reconnect"
            );
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown_rx.recv() => return Ok(()),
            }
        }

        let url = {
            let s = session.lock().await;
            gateway_url(s.resume_gateway_url.as_deref())
        };

        info!(url = %url, "connecting to Discord gateway");

        let (ws_stream, _) = match tokio_tungstenite::connect_async(&url).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "failed to connect to gateway");
                reconnect_attempts += 1;
                continue;
            }
        };

        info!("WebSocket connected");

        let (ws_write, mut ws_read) = ws_stream.split();
        let ws_write = Arc::new(Mutex::new(ws_write));
        let rate_limiter = Arc::new(Mutex::new(SendRateLimiter::new(
            SEND_BUDGET_MAX,
            SEND_BUDGET_WINDOW,
        )));

        // ------------------------------------------------------------------
        // 1.  Read HELLO and extract heartbeat_interval
        // ------------------------------------------------------------------
        let heartbeat_interval = match read_hello_from_stream(&mut ws_read).await {
            Ok(interval) => interval,
            Err(e) => {
                error!(error = %e, "failed to read HELLO from gateway");
                reconnect_attempts += 1;
                continue;
            }
        };

        info!(interval_ms = heartbeat_interval, "received HELLO");

        // ------------------------------------------------------------------
        // 2.  Send IDENTIFY or RESUME
        // ------------------------------------------------------------------
        let handshake = {
            let s = session.lock().await;
            match (&s.session_id, s.sequence) {
                (Some(session_id), Some(seq)) => resume_payload(&config.token, session_id, seq),
                _ => identify_payload(&config),
            }
        };
        let resuming = handshake["op"] == json!(OpCode::Resume);

        if let Err(e) = rate_limited_send(&ws_write, &rate_limiter, &handshake).await {
            error!(error = %e, resuming, "failed to send handshake");
            reconnect_attempts += 1;
            continue;
        }
        info!(resuming, "sent handshake");
        reconnect_attempts = 0;

        // ------------------------------------------------------------------
        // 3.  Spawn heartbeat task
        // ------------------------------------------------------------------
        let hb_write = Arc::clone(&ws_write);
        let hb_session = Arc::clone(&session);
        let hb_rate_limiter = Arc::clone(&rate_limiter);

        let heartbeat_handle = tokio::spawn(async move {
            // Discord says we should send the first heartbeat after
            // `heartbeat_interval * jitter` where jitter ∈ [0, 1).
            let jitter = rand::random::<f64>();
            tokio::time::sleep(Duration::from_millis(
                (heartbeat_interval as f64 * jitter) as u64,
            ))
            .await;

            let mut interval = tokio::time::interval(Duration::from_millis(heartbeat_interval));
            loop {
                interval.tick().await;
                let seq = hb_session.lock().await.sequence;
                let heartbeat = json!({ "op": OpCode::Heartbeat, "d": seq });

                if let Err(e) = rate_limited_send(&hb_write, &hb_rate_limiter, &heartbeat).await {
                    warn!(error = %e, "heartbeat send failed, stopping heartbeat task");
                    return;
                }
                debug!(seq = ?seq, "sent heartbeat");
            }
        });

        // ------------------------------------------------------------------
        // 4.  Main read loop
        // ------------------------------------------------------------------
        let disconnect_reason = read_loop(
            &mut ws_read,
            &ws_write,
            &rate_limiter,
            &event_tx,
            &session,
            &mut shutdown_rx,
        )
        .await;

        // ------------------------------------------------------------------
        // 5.  Cleanup: stop heartbeat, close socket, pick next step
        // ------------------------------------------------------------------
        heartbeat_handle.abort();

        let close_frame = match disconnect_reason {
            DisconnectReason::Shutdown => Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "shutting down".into(),
            }),
            _ => None,
        };
        {
            let mut w = ws_write.lock().await;
            let _ = w.send(WsMessage::Close(close_frame)).await;
        }

        match disconnect_reason {
            DisconnectReason::ShouldResume => {
                info!("will attempt RESUME");
            }
            DisconnectReason::ShouldReidentify => {
                info!("session invalidated, will re-IDENTIFY");
                let mut s = session.lock().await;
                s.session_id = None;
                s.sequence = None;
            }
            DisconnectReason::Fatal(code) => {
                error!(close_code = code, "fatal gateway error, shutting down");
                return Err(GatewayError::Fatal(code));
            }
            DisconnectReason::EventChannelClosed => {
                info!("event channel closed, shutting down gateway driver");
                return Ok(());
            }
            DisconnectReason::Shutdown => {
                info!("gateway closed on request");
                return Ok(());
            }
        }

        reconnect_attempts += 1;
    }
}

// ---------------------------------------------------------------------------
// Disconnect reason
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum DisconnectReason {
    ShouldResume,
    ShouldReidentify,
    Fatal(u16),
    EventChannelClosed,
    Shutdown,
}

/// Map a server close code to what we should do next.
fn classify_close(code: u16) -> DisconnectReason {
    match code {
        // Authentication failed, invalid shard, sharding required,
        // invalid API version, invalid intents, disallowed intents.
        4004 | 4010 | 4011 | 4012 | 4013 | 4014 => DisconnectReason::Fatal(code),
        // Invalid seq or session timed out, re-identify.
        4007 | 4009 => DisconnectReason::ShouldReidentify,
        _ => DisconnectReason::ShouldResume,
    }
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

async fn read_loop(
    ws_read: &mut WsStream,
    ws_write: &Arc<Mutex<WsSink>>,
    rate_limiter: &Arc<Mutex<SendRateLimiter>>,
    event_tx: &async_channel::Sender<GatewayEvent>,
    session: &Arc<Mutex<SessionState>>,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> DisconnectReason {
    loop {
        let msg = tokio::select! {
            biased;

            _ = shutdown_rx.recv() => return DisconnectReason::Shutdown,

            msg = ws_read.next() => msg,
        };

        let msg = match msg {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket read error");
                return DisconnectReason::ShouldResume;
            }
            None => {
                info!("WebSocket stream ended");
                return DisconnectReason::ShouldResume;
            }
        };

        let text = match msg {
            WsMessage::Text(text) => text,
            WsMessage::Close(frame) => {
                let code = frame.map(|f| u16::from(f.code));
                warn!(close_code = ?code, "WebSocket closed by server");
                return code.map(classify_close).unwrap_or(DisconnectReason::ShouldResume);
            }
            // Ping/Pong/Binary are ignored.
            _ => continue,
        };

        let payload: GatewayPayload = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to parse gateway payload");
                continue;
            }
        };

        if let Some(s) = payload.s {
            session.lock().await.sequence = Some(s);
        }

        let event = GatewayEvent::from_payload(payload);

        // Handle session-relevant events internally.
        match &event {
            GatewayEvent::Ready(ready) => {
                let mut sess = session.lock().await;
                sess.session_id = Some(ready.session_id.clone());
                sess.resume_gateway_url = Some(ready.resume_gateway_url.clone());
                info!(
                    session_id = %ready.session_id,
                    user = %ready.user.username,
                    "gateway READY"
                );
            }

            GatewayEvent::HeartbeatRequest => {
                let seq = session.lock().await.sequence;
                let heartbeat = json!({ "op": OpCode::Heartbeat, "d": seq });
                if let Err(e) = rate_limited_send(ws_write, rate_limiter, &heartbeat).await {
                    warn!(error = %e, "failed to send requested heartbeat");
                }
                debug!("sent requested heartbeat");
                // Internal plumbing, not forwarded.
                continue;
            }

            GatewayEvent::HeartbeatAck => {
                debug!("heartbeat acknowledged");
            }

            GatewayEvent::Reconnect => {
                info!("gateway requested reconnect (op 7)");
                return DisconnectReason::ShouldResume;
            }

            GatewayEvent::InvalidSession(resumable) => {
                warn!(resumable, "session invalidated (op 9)");
                if *resumable {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    return DisconnectReason::ShouldResume;
                }
                tokio::time::sleep(Duration::from_secs(3)).await;
                return DisconnectReason::ShouldReidentify;
            }

            _ => {}
        }

        if let Some(reason) = forward_event(event_tx, event, shutdown_rx).await {
            return reason;
        }
    }
}

/// Hand an event to the consumer. A full channel must not block shutdown, so
/// the send races the shutdown signal.
async fn forward_event(
    event_tx: &async_channel::Sender<GatewayEvent>,
    event: GatewayEvent,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Option<DisconnectReason> {
    tokio::select! {
        biased;

        _ = shutdown_rx.recv() => Some(DisconnectReason::Shutdown),

        sent = event_tx.send(event) => match sent {
            Ok(()) => None,
            Err(_) => {
                info!("event channel closed by consumer");
                Some(DisconnectReason::EventChannelClosed)
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The URL to connect to, with version + encoding query params ensured.
fn gateway_url(resume_url: Option<&str>) -> String {
    let url = resume_url.unwrap_or(DEFAULT_GATEWAY_URL);
    if url.contains("v=10") {
        url.to_string()
    } else if url.contains('?') {
        format!("{}&v=10&encoding=json", url)
    } else {
        format!("{}?v=10&encoding=json", url)
    }
}

fn identify_payload(config: &GatewayConfig) -> serde_json::Value {
    json!({
        "op": OpCode::Identify,
        "d": {
            "token": config.token,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "tchola-bot",
                "device": "tchola-bot"
            },
            "intents": config.intents.bits(),
        }
    })
}

fn resume_payload(token: &str, session_id: &str, seq: u64) -> serde_json::Value {
    json!({
        "op": OpCode::Resume,
        "d": {
            "token": token,
            "session_id": session_id,
            "seq": seq,
        }
    })
}

/// Read the HELLO payload from an already-split stream reference.
async fn read_hello_from_stream(stream: &mut WsStream) -> Result<u64, String> {
    let msg = tokio::time::timeout(Duration::from_secs(30), stream.next())
        .await
        .map_err(|_| "timed out waiting for HELLO".to_string())?
        .ok_or_else(|| "stream ended before HELLO".to_string())?
        .map_err(|e| format!("WS error reading HELLO: {}", e))?;

    let text = match msg {
        WsMessage::Text(t) => t,
        other => return Err(format!("expected text message for HELLO, got {:?}", other)),
    };

    let payload: GatewayPayload =
        serde_json::from_str(&text).map_err(|e| format!("failed to parse HELLO: {}", e))?;

    hello_interval(&payload)
}

fn hello_interval(payload: &GatewayPayload) -> Result<u64, String> {
    if payload.op != OpCode::Hello {
        return Err(format!("expected HELLO, got {:?}", payload.op));
    }

    payload
        .d
        .as_ref()
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| "HELLO missing heartbeat_interval".to_string())
}

/// Send a JSON payload on the WebSocket, respecting the send rate limiter.
async fn rate_limited_send(
    ws_write: &Arc<Mutex<WsSink>>,
    rate_limiter: &Arc<Mutex<SendRateLimiter>>,
    payload: &serde_json::Value,
) -> Result<(), String> {
    loop {
        let delay = rate_limiter.lock().await.delay();
        match delay {
            Some(d) => {
                debug!(
                    delay_ms = d.as_millis() as u64,
                    "gateway send rate-limited, waiting"
                );
                tokio::time::sleep(d).await;
            }
            None => break,
        }
    }

    rate_limiter.lock().await.record();

    let text = serde_json::to_string(payload).map_err(|e| e.to_string())?;

    let mut w = ws_write.lock().await;
    w.send(WsMessage::Text(text))
        .await
        .map_err(|e| format!("WS send error: {}", e))
}

/// Exponential backoff with jitter, capped at 60 s.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1000u64 * 2u64.saturating_pow(attempt.min(6));
    let jitter = (rand::random::<f64>() * 0.5 + 0.75) * base_ms as f64;
    Duration::from_millis(jitter.min(60_000.0) as u64)
}
