//! Typed gateway events.
//!
//! Instead of matching on raw `(op, t, serde_json::Value)` tuples everywhere,
//! the gateway module deserialises dispatch payloads into this enum so the rest
//! of the bot can pattern-match on strongly-typed data.

use tracing::warn;

use crate::types::*;

// ---------------------------------------------------------------------------
// The top-level event enum
// ---------------------------------------------------------------------------

/// A fully-parsed event coming off the Discord gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// We've successfully identified, bot is ready.
    Ready(ReadyEvent),

    /// A message was created in a channel we can see.
    MessageCreate(Message),

    /// Heartbeat ACK from the gateway (op 11).
    HeartbeatAck,

    /// The gateway is asking us to heartbeat immediately (op 1).
    HeartbeatRequest,

    /// Gateway told us to reconnect (op 7).
    Reconnect,

    /// Session has been invalidated (op 9). The inner bool indicates whether
    /// the session is resumable (`true`) or we must re-identify (`false`).
    InvalidSession(bool),

    /// An event we received but don't have a typed variant for.
    Unknown {
        event_name: Option<String>,
        op: OpCode,
    },
}

// ---------------------------------------------------------------------------
// Parsing from a raw GatewayPayload
// ---------------------------------------------------------------------------

impl GatewayEvent {
    /// Convert a raw [`GatewayPayload`] into a typed event.
    ///
    /// This never fails: unrecognised or malformed events become
    /// [`GatewayEvent::Unknown`].
    pub fn from_payload(payload: GatewayPayload) -> Self {
        match payload.op {
            OpCode::Dispatch => Self::parse_dispatch(payload.t, payload.d),
            OpCode::Heartbeat => GatewayEvent::HeartbeatRequest,
            OpCode::Reconnect => GatewayEvent::Reconnect,
            OpCode::InvalidSession => {
                let resumable = payload
                    .d
                    .as_ref()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                GatewayEvent::InvalidSession(resumable)
            }
            OpCode::HeartbeatAck => GatewayEvent::HeartbeatAck,
            op => GatewayEvent::Unknown {
                event_name: payload.t,
                op,
            },
        }
    }

    /// Parse an op-0 DISPATCH event by its `t` name.
    fn parse_dispatch(event_name: Option<String>, data: Option<serde_json::Value>) -> Self {
        let unknown = |name: Option<&str>| GatewayEvent::Unknown {
            event_name: name.map(str::to_string),
            op: OpCode::Dispatch,
        };

        let Some(name) = event_name.as_deref() else {
            return unknown(None);
        };

        let Some(d) = data else {
            return unknown(Some(name));
        };

        match name {
            "READY" => match serde_json::from_value::<ReadyEvent>(d) {
                Ok(ready) => GatewayEvent::Ready(ready),
                Err(e) => {
                    warn!(event = name, error = %e, "failed to parse READY payload");
                    unknown(Some(name))
                }
            },

            "MESSAGE_CREATE" => match serde_json::from_value::<Message>(d) {
                Ok(msg) => GatewayEvent::MessageCreate(msg),
                Err(e) => {
                    warn!(event = name, error = %e, "failed to parse MESSAGE_CREATE payload");
                    unknown(Some(name))
                }
            },

            _ => unknown(Some(name)),
        }
    }
}
