//! tenyks - service coordination core for a pub/sub driven IRC bot.
//!
//! The bot relays between IRC connections and a set of external services over
//! a broker. This crate is the middle of that relay: it decodes the JSON
//! envelopes services publish, relays outbound text to the right IRC
//! connection, fans commands out to locally registered handlers, and keeps
//! track of which services are alive.

pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod heartbeat;
pub mod registry;
pub mod transport;

pub use dispatch::{Dispatcher, Lifecycle, Routed};
pub use envelope::{Envelope, Meta};
pub use registry::{CommandRegistry, Handler, HandlerContext, Service, ServiceRegistry};
