//! JSON envelope codec.
//!
//! An envelope is the unit exchanged between the bot, the broker and the
//! services. Two generations of producers are in the wild, so two fields have
//! a current spelling and a legacy one:
//!
//! | logical field   | current       | legacy          |
//! |-----------------|---------------|-----------------|
//! | `full_message`  | `fullmsg`     | `full_message`  |
//! | `from_channel`  | `fromchannel` | `from_channel`  |
//!
//! Decoding accepts either spelling (the current one wins when both are
//! present). Encoding always writes both so consumers of either generation can
//! read the result.

mod meta;

pub use meta::{BotMeta, Meta, ServiceId, ServiceMeta};

use crate::error::DecodeError;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

/// Outbound text to a channel or nick.
pub const PRIVMSG: &str = "PRIVMSG";
/// Outbound notice to a channel or nick.
pub const NOTICE: &str = "NOTICE";
/// A service announcing itself.
pub const REGISTER: &str = "REGISTER";
/// Heartbeat sent by the bot to services.
pub const PING: &str = "PING";
/// Heartbeat reply from a service.
pub const PONG: &str = "PONG";

/// Commands that are meaningless without a service identity in `meta`.
pub fn requires_service_identity(command: &str) -> bool {
    matches!(command, REGISTER | PONG)
}

/// Commands whose payload is relayed to an IRC connection as a text line.
pub fn is_outbound_text(command: &str) -> bool {
    matches!(command, PRIVMSG | NOTICE)
}

/// One inbound or outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub target: String,
    pub command: String,
    pub mask: String,
    pub direct: bool,
    pub nick: String,
    pub host: String,
    pub full_message: String,
    pub user: String,
    pub from_channel: bool,
    pub connection: String,
    pub payload: String,
    pub meta: Option<Meta>,
}

/// Raw wire shape. Every field is optional and nulls are tolerated.
#[derive(Debug, Deserialize)]
struct WireEnvelope {
    target: Option<String>,
    command: Option<String>,
    mask: Option<String>,
    direct: Option<bool>,
    nick: Option<String>,
    host: Option<String>,
    fullmsg: Option<String>,
    full_message: Option<String>,
    user: Option<String>,
    fromchannel: Option<bool>,
    from_channel: Option<bool>,
    connection: Option<String>,
    payload: Option<String>,
    meta: Option<Value>,
}

impl Envelope {
    /// Create an empty envelope for `command`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Build an outbound PRIVMSG for `target` on `connection`.
    pub fn privmsg(
        connection: impl Into<String>,
        target: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            connection: connection.into(),
            target: target.into(),
            payload: payload.into(),
            ..Self::new(PRIVMSG)
        }
    }

    /// Build a heartbeat PING, identified as coming from the bot.
    pub fn ping() -> Self {
        Self {
            meta: Some(Meta::Bot(BotMeta {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            })),
            ..Self::new(PING)
        }
    }

    /// Decode an envelope from raw transport bytes.
    ///
    /// Unknown fields are ignored. A malformed `meta` block only fails the
    /// whole decode for commands that need a service identity; otherwise the
    /// block is dropped and the rest of the envelope is kept.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireEnvelope = serde_json::from_slice(raw)?;
        let command = wire.command.unwrap_or_default();

        let meta = match wire.meta.as_ref().map(Meta::from_value).transpose() {
            Ok(meta) => meta.flatten(),
            Err(source) if requires_service_identity(&command) => {
                return Err(DecodeError::Meta { command, source });
            }
            Err(error) => {
                debug!(command = %command, error = %error, "Ignoring malformed meta block");
                None
            }
        };

        Ok(Self {
            target: wire.target.unwrap_or_default(),
            command,
            mask: wire.mask.unwrap_or_default(),
            direct: wire.direct.unwrap_or_default(),
            nick: wire.nick.unwrap_or_default(),
            host: wire.host.unwrap_or_default(),
            full_message: wire.fullmsg.or(wire.full_message).unwrap_or_default(),
            user: wire.user.unwrap_or_default(),
            from_channel: wire
                .fromchannel
                .or(wire.from_channel)
                .unwrap_or_default(),
            connection: wire.connection.unwrap_or_default(),
            payload: wire.payload.unwrap_or_default(),
            meta,
        })
    }

    /// Encode for publishing. Both spellings of the synonym fields are written.
    pub fn encode(&self) -> Vec<u8> {
        self.to_value().to_string().into_bytes()
    }

    fn to_value(&self) -> Value {
        json!({
            "target": self.target,
            "command": self.command,
            "mask": self.mask,
            "direct": self.direct,
            "nick": self.nick,
            "host": self.host,
            "fullmsg": self.full_message,
            "full_message": self.full_message,
            "user": self.user,
            "fromchannel": self.from_channel,
            "from_channel": self.from_channel,
            "connection": self.connection,
            "payload": self.payload,
            "meta": self.meta.as_ref().map(Meta::to_value),
        })
    }

    /// The IRC line this envelope asks to be sent, e.g. `PRIVMSG #test :hi`.
    ///
    /// Target and payload are cut at the first line break so one envelope
    /// can never put more than one command on the wire.
    pub fn outbound_line(&self) -> String {
        format!(
            "{} {} :{}",
            self.command,
            first_line(&self.target),
            first_line(&self.payload)
        )
    }
}

fn first_line(s: &str) -> &str {
    s.split(['\r', '\n', '\0']).next().unwrap_or_default()
}
