//! Turn Engine State Definitions
//!
//! Records the engine reads and writes: turns, orders, provinces and
//! resolution records. Identifier types implement Ord so that every
//! collection keyed by them iterates deterministically.

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id! {
    /// Opaque country identifier, trusted as handed over by identity resolution.
    CountryId
}

string_id! {
    /// Province identifier as referenced by orders and the map.
    ProvinceId
}

/// Unique turn identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TurnId(pub uuid::Uuid);

impl TurnId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique order identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub uuid::Uuid);

impl OrderId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// PHASE
// =============================================================================

/// Turn phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Countries submit orders.
    Planning,
    /// Orders are locked; conflicts are adjudicated when the phase ends.
    Resolve,
    /// Outcomes are final; a new turn opens when the phase ends.
    Commit,
}

impl Phase {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Resolve => "resolve",
            Phase::Commit => "commit",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TURN
// =============================================================================

/// One turn of the match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique id.
    pub id: TurnId,
    /// Monotonic turn number, starting at 1.
    pub number: u32,
    /// Current phase.
    pub phase: Phase,
    /// When the current phase ends, if it has a persisted deadline.
    pub phase_deadline: Option<DateTime<Utc>>,
    /// Resolution seed, fixed at creation.
    pub seed: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Set once commit completes; the turn is open until then.
    pub committed_at: Option<DateTime<Utc>>,
}

impl Turn {
    /// Create a turn in planning.
    pub fn open(number: u32, seed: String, now: DateTime<Utc>, deadline: DateTime<Utc>) -> Self {
        Self {
            id: TurnId::generate(),
            number,
            phase: Phase::Planning,
            phase_deadline: Some(deadline),
            seed,
            created_at: now,
            committed_at: None,
        }
    }

    /// Check if the turn has not completed commit.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.committed_at.is_none()
    }
}

// =============================================================================
// ORDERS
// =============================================================================

/// Recognized order types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Claim ownership of a province.
    ClaimTarget,
    /// Build in a province.
    Build,
    /// Move from a province to a secondary target.
    Move,
}

impl OrderType {
    /// Every recognized type.
    pub const ALL: [OrderType; 3] = [OrderType::ClaimTarget, OrderType::Build, OrderType::Move];

    /// Parse a wire name. Unknown names are not recognized.
    pub fn from_name(name: &str) -> Option<OrderType> {
        match name {
            "claim_target" => Some(OrderType::ClaimTarget),
            "build" => Some(OrderType::Build),
            "move" => Some(OrderType::Move),
            _ => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::ClaimTarget => "claim_target",
            OrderType::Build => "build",
            OrderType::Move => "move",
        }
    }

    /// Whether simultaneous orders of this type are adjudicated by the conflict resolver.
    #[inline]
    pub fn requires_resolution(self) -> bool {
        matches!(self, OrderType::ClaimTarget)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted, awaiting resolution.
    Planned,
    /// Took effect.
    Applied,
    /// Lost a contest.
    Rejected,
}

/// Uniqueness key: at most one active order per key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    /// Owning turn.
    pub turn_id: TurnId,
    /// Issuing country.
    pub country_id: CountryId,
    /// Order type.
    pub order_type: OrderType,
    /// Target province.
    pub target_id: ProvinceId,
}

/// A country's order for one turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique id.
    pub id: OrderId,
    /// Owning turn.
    pub turn_id: TurnId,
    /// Issuing country.
    pub country_id: CountryId,
    /// Order type.
    pub order_type: OrderType,
    /// Target province.
    pub target_id: ProvinceId,
    /// Secondary province (e.g. move destination).
    pub secondary_target_id: Option<ProvinceId>,
    /// Lifecycle status.
    pub status: OrderStatus,
}

impl Order {
    /// Uniqueness key of this order.
    pub fn key(&self) -> OrderKey {
        OrderKey {
            turn_id: self.turn_id,
            country_id: self.country_id.clone(),
            order_type: self.order_type,
            target_id: self.target_id.clone(),
        }
    }
}

// =============================================================================
// WORLD
// =============================================================================

/// A province on the map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Province {
    /// Unique id.
    pub id: ProvinceId,
    /// Display name.
    pub name: String,
    /// Owning country, if any.
    pub owner_country_id: Option<CountryId>,
    /// Claimed by more than one country this turn.
    pub is_contested: bool,
    /// Cost attached to resolving a claim on this province.
    pub resolution_cost: u32,
}

impl Province {
    /// Create an unowned, uncontested province named after its id.
    pub fn unowned(id: ProvinceId, resolution_cost: u32) -> Self {
        Self {
            name: id.0.clone(),
            id,
            owner_country_id: None,
            is_contested: false,
            resolution_cost,
        }
    }
}

/// Audit entry for one contested target in one turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    /// Turn the contest happened in.
    pub turn_id: TurnId,
    /// Contested province.
    pub target_id: ProvinceId,
    /// Top-ranked contender.
    pub attacker_id: CountryId,
    /// Second-ranked contender.
    pub defender_id: Option<CountryId>,
    /// Country that took the target.
    pub winner_id: CountryId,
    /// Human-readable outcome.
    pub summary: String,
}
