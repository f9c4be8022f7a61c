//! The `meta` identity block carried by envelopes.
//!
//! Senders disagree on the shape of this block. Services announce themselves
//! with a name, a version and a `UUID` token; the bot and other system
//! producers send only a name and version. The shape is resolved once, at
//! decode time, into [`Meta`].

use crate::error::MetaError;
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity token assigned by a service to itself.
///
/// Informational only: the service registry is keyed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(Uuid);

impl ServiceId {
    /// Generate a fresh random id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for ServiceId {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| MetaError::InvalidServiceId(s.to_string()))
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Identity of a remote service process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMeta {
    pub name: String,
    pub version: String,
    pub id: ServiceId,
    pub description: String,
}

/// Identity of the bot itself or another system producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotMeta {
    pub name: String,
    pub version: String,
}

/// A resolved `meta` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Meta {
    Service(ServiceMeta),
    Bot(BotMeta),
}

impl Meta {
    /// Resolve a raw `meta` value.
    ///
    /// Returns `Ok(None)` for shapes that carry no identity (null, non-object,
    /// or an object without a `name`). A present but unparseable `UUID` token
    /// is an error.
    pub fn from_value(value: &Value) -> Result<Option<Self>, MetaError> {
        let Value::Object(map) = value else {
            return Ok(None);
        };
        let Some(name) = map.get("name").and_then(Value::as_str) else {
            return Ok(None);
        };
        let version = string_field(map, "version");

        match map.get("UUID") {
            None | Some(Value::Null) => Ok(Some(Self::Bot(BotMeta {
                name: name.to_string(),
                version,
            }))),
            Some(Value::String(token)) => Ok(Some(Self::Service(ServiceMeta {
                name: name.to_string(),
                version,
                id: token.parse()?,
                description: string_field(map, "description"),
            }))),
            Some(other) => Err(MetaError::InvalidServiceId(other.to_string())),
        }
    }

    /// Wire representation, in the shape [`Meta::from_value`] accepts.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Service(service) => json!({
                "name": service.name,
                "version": service.version,
                "UUID": service.id.to_string(),
                "description": service.description,
            }),
            Self::Bot(bot) => json!({
                "name": bot.name,
                "version": bot.version,
            }),
        }
    }

    /// The service identity, if this block carries one.
    pub fn service(&self) -> Option<&ServiceMeta> {
        match self {
            Self::Service(service) => Some(service),
            Self::Bot(_) => None,
        }
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
