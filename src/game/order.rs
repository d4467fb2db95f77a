//! Order Ledger
//!
//! Holds each turn's active orders, at most one per
//! (country, order type, target). Accepts submissions only during planning;
//! a resubmission replaces the earlier order outright.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::game::state::{
    CountryId, Order, OrderId, OrderStatus, OrderType, Phase, ProvinceId, Turn, TurnId,
};
use crate::game::world::WorldState;
use crate::store::{StoreError, TurnStore};

/// Order as submitted by a client, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayload {
    /// Order type wire name (`claim_target`, `build`, `move`).
    #[serde(rename = "type")]
    pub order_type: String,
    /// Target province.
    #[serde(default)]
    pub target_id: Option<String>,
    /// Secondary province.
    #[serde(default)]
    pub secondary_target_id: Option<String>,
}

impl OrderPayload {
    /// Shorthand for a payload with no secondary target.
    pub fn new(order_type: OrderType, target: impl Into<String>) -> Self {
        Self {
            order_type: order_type.as_str().to_string(),
            target_id: Some(target.into()),
            secondary_target_id: None,
        }
    }

    /// Attach a secondary target.
    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary_target_id = Some(secondary.into());
        self
    }
}

/// A payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidOrder {
    /// Parsed type.
    pub order_type: OrderType,
    /// Target province.
    pub target_id: ProvinceId,
    /// Secondary province.
    pub secondary_target_id: Option<ProvinceId>,
}

/// Submission failures.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Orders are only accepted during planning.
    #[error("orders are not accepted during {phase}")]
    PhaseViolation {
        /// Phase the turn was in.
        phase: Phase,
    },

    /// Malformed or incomplete payload.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SubmitError {
    /// Reason code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::PhaseViolation { .. } => "phase_violation",
            SubmitError::InvalidOrder(_) => "invalid_order",
            SubmitError::Store(_) => "internal_error",
        }
    }
}

/// Result of an accepted submission.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The stored order.
    pub order: Order,
    /// Id of the order it replaced, if any.
    pub replaced: Option<OrderId>,
}

/// Check a payload is well formed.
pub fn validate(payload: &OrderPayload) -> Result<ValidOrder, SubmitError> {
    let order_type = OrderType::from_name(&payload.order_type).ok_or_else(|| {
        SubmitError::InvalidOrder(format!("unrecognized order type {:?}", payload.order_type))
    })?;

    let target_id = match payload.target_id.as_deref().map(str::trim) {
        Some(target) if !target.is_empty() => ProvinceId::from(target),
        _ => return Err(SubmitError::InvalidOrder("missing target".into())),
    };

    let secondary_target_id = match payload.secondary_target_id.as_deref().map(str::trim) {
        None => None,
        Some("") => return Err(SubmitError::InvalidOrder("empty secondary target".into())),
        Some(secondary) => Some(ProvinceId::from(secondary)),
    };

    Ok(ValidOrder { order_type, target_id, secondary_target_id })
}

/// Record a country's order for the turn.
///
/// Replaces any active order with the same (country, type, target), creates
/// referenced provinces on first use, and recomputes contest flags so that
/// multi-claim targets show up before resolution.
pub fn submit<S: TurnStore + ?Sized>(
    store: &mut S,
    turn: &Turn,
    country: &CountryId,
    payload: &OrderPayload,
    default_resolution_cost: u32,
) -> Result<Submission, SubmitError> {
    if turn.phase != Phase::Planning {
        return Err(SubmitError::PhaseViolation { phase: turn.phase });
    }

    let valid = validate(payload)?;

    {
        let mut world = WorldState::new(store, default_resolution_cost);
        world.ensure_province(&valid.target_id)?;
        if let Some(ref secondary) = valid.secondary_target_id {
            world.ensure_province(secondary)?;
        }
    }

    let order = Order {
        id: OrderId::generate(),
        turn_id: turn.id,
        country_id: country.clone(),
        order_type: valid.order_type,
        target_id: valid.target_id,
        secondary_target_id: valid.secondary_target_id,
        status: OrderStatus::Planned,
    };
    let replaced = store.upsert_order(&order)?.map(|old| old.id);

    let mut pending = Vec::new();
    for order_type in OrderType::ALL.into_iter().filter(|t| t.requires_resolution()) {
        pending.extend(orders_of_type(store, turn.id, order_type)?);
    }
    let changed = WorldState::new(store, default_resolution_cost).recompute_contest_flags(&pending)?;

    debug!(
        turn = turn.number,
        country = %country,
        order_type = %order.order_type,
        province = %order.target_id,
        replaced = replaced.is_some(),
        contest_changes = changed.len(),
        "Order recorded"
    );

    Ok(Submission { order, replaced })
}

/// All active orders of one type for a turn.
pub fn orders_of_type<S: TurnStore + ?Sized>(
    store: &S,
    turn_id: TurnId,
    order_type: OrderType,
) -> Result<Vec<Order>, StoreError> {
    let orders = store.orders_for_turn(turn_id)?;
    Ok(select_type(&orders, order_type).cloned().collect())
}

/// Orders of one type out of a loaded order set, keeping their order.
pub fn select_type(orders: &[Order], order_type: OrderType) -> impl Iterator<Item = &Order> {
    orders.iter().filter(move |o| o.order_type == order_type)
}
