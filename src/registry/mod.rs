//! Registries shared between the dispatcher and handlers.
//!
//! Both are plain objects owned behind `Arc`s and passed to the dispatcher at
//! construction, so several bot instances (or tests) can run side by side.

pub mod command;
pub mod service;

pub use command::{CommandRegistry, Handler, HandlerContext};
pub use service::{RegisterOutcome, Service, ServiceRegistry};
