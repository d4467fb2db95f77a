//! # WeGo Turn Server
//!
//! Authoritative simultaneous-turn engine. Every country plans orders in
//! secret during the same window; the server then resolves all orders at
//! once and publishes the outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WEGO TURN SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── score.rs    - SHA-256 contention scores                 │
//! │  └── seed.rs     - Per-turn seed derivation                  │
//! │                                                              │
//! │  game/           - Turn engine                               │
//! │  ├── state.rs    - Turns, orders, provinces, records         │
//! │  ├── order.rs    - Order ledger                              │
//! │  ├── world.rs    - Ownership and contest flags               │
//! │  ├── resolve.rs  - Conflict resolver                         │
//! │  ├── replay.rs   - Replay verification                       │
//! │  ├── scheduler.rs- Phase state machine and recovery          │
//! │  └── snapshot.rs - Public projection                         │
//! │                                                              │
//! │  store/          - Persistence                               │
//! │  ├── memory.rs   - BTreeMap tables                           │
//! │  └── file.rs     - bincode image on disk                     │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── host.rs     - Engine task, timers, snapshot fan-out     │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - JWT identity                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! A turn's outcome depends only on its seed and its active orders:
//! - Claim scores are SHA-256 of `seed:country:target`
//! - Equal scores fall back to the lexicographically smaller country id
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - The resolver never reads a clock
//!
//! Resolving the same turn twice writes the same records, so a crash in the
//! middle of resolution is recovered by simply resolving again.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use config::EngineConfig;
pub use core::score::{contention_score, score};
pub use core::seed::{FixedSeed, RandomSeeds, SeedSource};
pub use game::scheduler::PhaseScheduler;
pub use game::snapshot::PublicSnapshot;
pub use game::state::{CountryId, OrderType, Phase, ProvinceId};
pub use store::{FileStore, MemoryStore, TurnStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
