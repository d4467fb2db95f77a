//! Turn Engine
//!
//! Everything that decides the outcome of a turn. Apart from the scheduler,
//! which is handed `now` explicitly, nothing here reads a clock.
//!
//! ## Module Structure
//!
//! - `state`: Identifiers, turns, orders, provinces, resolution records
//! - `order`: Order ledger (validation, one active order per key)
//! - `world`: Province ownership and contest flags
//! - `resolve`: Conflict resolver (plan, then apply)
//! - `replay`: Re-derive a resolved turn and compare with the store
//! - `scheduler`: Phase state machine and recovery
//! - `snapshot`: Public projection pushed to clients

pub mod state;
pub mod order;
pub mod world;
pub mod resolve;
pub mod replay;
pub mod scheduler;
pub mod snapshot;

// Re-export key types
pub use state::{
    CountryId, Order, OrderId, OrderStatus, OrderType, Phase, Province, ProvinceId,
    ResolutionRecord, Turn, TurnId,
};
pub use order::{OrderPayload, SubmitError, Submission};
pub use resolve::{plan_resolution, resolve_turn, ResolutionPlan};
pub use replay::{verify_turn, ReplayError, ReplayReport};
pub use scheduler::{
    EngineError, MatchContext, PhaseScheduler, PhaseTimer, Recovery, RecoveryInconsistency,
    TimerKey, Transition,
};
pub use snapshot::{CountryStatus, ProvinceView, PublicSnapshot};
