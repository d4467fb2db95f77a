//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON objects tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::game::order::{OrderPayload, SubmitError, Submission};
use crate::game::snapshot::PublicSnapshot;
use crate::game::state::{OrderId, OrderType, ProvinceId, TurnId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identify as a country.
    Auth(AuthRequest),

    /// Submit or replace an order for the open turn.
    SubmitOrder {
        /// The order.
        order: OrderPayload,
    },

    /// Done planning for this turn.
    Ready,

    /// Request the current snapshot (for reconnection).
    SyncRequest,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Authentication request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Declared country. Only trusted when the server allows insecure ids.
    #[serde(default)]
    pub country_id: Option<String>,
    /// JWT whose `sub` claim names the country.
    #[serde(default)]
    pub token: Option<String>,
    /// Client version for logging.
    #[serde(default)]
    pub client_version: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Current public state of the match.
    Snapshot(PublicSnapshot),

    /// Order stored.
    OrderAccepted(OrderReceipt),

    /// Pong response.
    Pong {
        /// Client timestamp from the ping.
        timestamp: u64,
        /// Server time in Unix milliseconds.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Country bound to this connection if successful.
    pub country_id: Option<String>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Acknowledgment of a stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    /// Id of the stored order.
    pub order_id: OrderId,
    /// Turn it belongs to.
    pub turn_id: TurnId,
    /// Its type.
    pub order_type: OrderType,
    /// Its target.
    pub target_id: ProvinceId,
    /// Order it replaced, if any.
    pub replaced: Option<OrderId>,
}

impl From<&Submission> for OrderReceipt {
    fn from(submission: &Submission) -> Self {
        Self {
            order_id: submission.order.id,
            turn_id: submission.order.turn_id,
            order_type: submission.order.order_type,
            target_id: submission.order.target_id.clone(),
            replaced: submission.replaced,
        }
    }
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Message could not be parsed.
    InvalidInput,
    /// Order submitted outside planning.
    PhaseViolation,
    /// Order payload rejected.
    InvalidOrder,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&SubmitError> for ErrorCode {
    fn from(err: &SubmitError) -> Self {
        match err {
            SubmitError::PhaseViolation { .. } => ErrorCode::PhaseViolation,
            SubmitError::InvalidOrder(_) => ErrorCode::InvalidOrder,
            SubmitError::Store(_) => ErrorCode::InternalError,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Shorthand for an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError { code, message: message.into() })
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
