//! Networking Module
//!
//! Match host task and WebSocket server.
//! NOT deterministic - handles real-time I/O.

pub mod auth;
pub mod host;
pub mod protocol;
pub mod server;

pub use auth::{resolve_identity, AuthConfig, AuthError};
pub use host::{spawn_host, EngineHandle, HostError};
pub use protocol::{ClientMessage, ServerMessage, ErrorCode};
pub use server::{GameServer, ServerConfig, GameServerError};
