//! Replay Verification
//!
//! Re-derives a resolved turn from its stored seed and orders and checks the
//! stored outcome against it. Resolution is a pure function of
//! (seed, orders), so any difference means the store was written by a
//! different resolver or was altered afterwards.

use std::collections::BTreeMap;
use std::fmt;

use crate::game::resolve::plan_resolution;
use crate::game::state::{OrderId, OrderStatus, Phase, ProvinceId, ResolutionRecord, TurnId};
use crate::store::{StoreError, TurnStore};

/// One disagreement between replay and the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mismatch {
    /// Stored order status differs from the replayed one.
    OrderStatus {
        /// Order.
        order_id: OrderId,
        /// Replayed status.
        expected: OrderStatus,
        /// Stored status.
        stored: OrderStatus,
    },
    /// Replay produced a record the store lacks.
    MissingRecord(ProvinceId),
    /// Stored record differs from the replayed one.
    RecordDiffers(ProvinceId),
    /// Store holds a record replay did not produce.
    UnexpectedRecord(ProvinceId),
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrderStatus { order_id, expected, stored } => {
                write!(f, "order {} stored as {:?}, replay gives {:?}", order_id, stored, expected)
            }
            Self::MissingRecord(target) => write!(f, "missing resolution record for {}", target),
            Self::RecordDiffers(target) => write!(f, "resolution record for {} differs", target),
            Self::UnexpectedRecord(target) => write!(f, "unexpected resolution record for {}", target),
        }
    }
}

/// Outcome of a replay.
#[derive(Clone, Debug)]
pub struct ReplayReport {
    /// Turn replayed.
    pub turn_id: TurnId,
    /// Its number.
    pub turn_number: u32,
    /// Orders compared.
    pub orders_checked: usize,
    /// Resolution records compared.
    pub records_checked: usize,
    /// Every disagreement found.
    pub mismatches: Vec<Mismatch>,
}

impl ReplayReport {
    /// Check if the stored outcome matches the replay.
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Replay failures.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// No such turn.
    #[error("unknown turn {0}")]
    UnknownTurn(TurnId),

    /// The turn has not been resolved yet.
    #[error("turn {number} is still in {phase}")]
    Unresolved {
        /// Turn number.
        number: u32,
        /// Phase it is in.
        phase: Phase,
    },

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Replay a resolved turn against its stored outcome.
pub fn verify_turn<S: TurnStore + ?Sized>(store: &S, turn_id: TurnId) -> Result<ReplayReport, ReplayError> {
    let turn = store.turn(turn_id)?.ok_or(ReplayError::UnknownTurn(turn_id))?;
    if turn.phase != Phase::Commit {
        return Err(ReplayError::Unresolved { number: turn.number, phase: turn.phase });
    }

    let orders = store.orders_for_turn(turn_id)?;
    let plan = plan_resolution(&turn, &orders);
    let mut mismatches = Vec::new();

    for order in &orders {
        if let Some(&expected) = plan.statuses.get(&order.id) {
            if expected != order.status {
                mismatches.push(Mismatch::OrderStatus {
                    order_id: order.id,
                    expected,
                    stored: order.status,
                });
            }
        }
    }

    let mut stored: BTreeMap<ProvinceId, ResolutionRecord> = store.resolutions_for_turn(turn_id)?
        .into_iter()
        .map(|r| (r.target_id.clone(), r))
        .collect();
    let records_checked = stored.len();

    for expected in &plan.records {
        match stored.remove(&expected.target_id) {
            None => mismatches.push(Mismatch::MissingRecord(expected.target_id.clone())),
            Some(record) if record != *expected => {
                mismatches.push(Mismatch::RecordDiffers(expected.target_id.clone()))
            }
            Some(_) => {}
        }
    }
    mismatches.extend(stored.into_keys().map(Mismatch::UnexpectedRecord));

    Ok(ReplayReport {
        turn_id,
        turn_number: turn.number,
        orders_checked: orders.len(),
        records_checked,
        mismatches,
    })
}
