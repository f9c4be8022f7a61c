//! Unified error handling for tenyks.
//!
//! Every failure that originates from external input is recoverable: the
//! dispatcher turns these into a log line and an early return, and nothing is
//! ever reported back to the sender of the envelope.

use thiserror::Error;

// ============================================================================
// Envelope decoding
// ============================================================================

/// Errors produced while decoding a `meta` identity block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    #[error("could not parse service id: {0}")]
    InvalidServiceId(String),
}

/// Errors produced while decoding an inbound envelope.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// The identity block is malformed and the command cannot do without it.
    #[error("invalid meta block for {command}: {source}")]
    Meta {
        command: String,
        #[source]
        source: MetaError,
    },
}

// ============================================================================
// Dispatch outcomes
// ============================================================================

/// Reasons a dispatched envelope was dropped.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("no handlers registered for {0}")]
    UnknownCommand(String),

    #[error("no connection named {0}")]
    UnresolvedConnection(String),

    #[error("registration skipped: {0}")]
    Registration(String),

    #[error("outbound queue for {0} is closed")]
    OutboundClosed(String),

    #[error("outbound backlog for {0} is full")]
    OutboundBacklog(String),
}

impl DispatchError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::UnknownCommand(_) => "unknown_command",
            Self::UnresolvedConnection(_) => "unresolved_connection",
            Self::Registration(_) => "registration_error",
            Self::OutboundClosed(_) => "outbound_closed",
            Self::OutboundBacklog(_) => "outbound_backlog",
        }
    }
}

// ============================================================================
// Handler errors
// ============================================================================

/// Errors returned by command handlers.
///
/// These never leave the worker task that ran the handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("service error: {0}")]
    Service(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;

// ============================================================================
// Transport errors
// ============================================================================

/// Errors raised by a transport while publishing.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),
}
