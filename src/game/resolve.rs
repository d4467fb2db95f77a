//! Conflict Resolution
//!
//! Turns a bag of simultaneous orders into ownership decisions.
//!
//! ## Algorithm
//!
//! 1. Group the turn's orders of every type that requires resolution by target
//! 2. A target with one order: that order wins uncontested
//! 3. A target with several orders: rank by
//!    `score(seed:country:target)` descending, ties by ascending country id
//! 4. The top claim is applied and takes the province; the rest are rejected
//! 5. A contested target gets one record naming the top two contenders
//!
//! Orders of other types are applied as-is.
//!
//! ## Replay
//!
//! Resolution is split into a pure [`plan_resolution`] and an idempotent
//! [`apply_plan`]. The plan depends only on the turn seed and the order set,
//! never on the orders' current statuses, so re-running a partially applied
//! resolution converges on the same provinces, statuses and records.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::core::score::contention_score;
use crate::game::state::{
    CountryId, Order, OrderId, OrderStatus, OrderType, ProvinceId,
    ResolutionRecord, Turn, TurnId,
};
use crate::game::order::select_type;
use crate::game::world::WorldState;
use crate::store::{StoreError, TurnStore};

/// One claim's standing in a contest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedClaim {
    /// The claiming order.
    pub order_id: OrderId,
    /// The claiming country.
    pub country_id: CountryId,
    /// Contention score under the turn seed.
    pub score: u64,
}

/// Outcome for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDecision {
    /// Order type the claims were made with.
    pub order_type: OrderType,
    /// The target.
    pub target_id: ProvinceId,
    /// Claims, winner first. Never empty.
    pub ranking: Vec<RankedClaim>,
}

impl TargetDecision {
    /// The winning claim.
    pub fn winner(&self) -> &RankedClaim {
        &self.ranking[0]
    }

    /// The second-ranked claim, if the target was contested.
    pub fn runner_up(&self) -> Option<&RankedClaim> {
        self.ranking.get(1)
    }

    /// Claimed by more than one country.
    pub fn is_contested(&self) -> bool {
        self.ranking.len() > 1
    }
}

/// Everything resolving a turn will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// Turn being resolved.
    pub turn_id: TurnId,
    /// Decisions, in (type, target) order.
    pub decisions: Vec<TargetDecision>,
    /// Final status of every order of the turn.
    pub statuses: BTreeMap<OrderId, OrderStatus>,
    /// One record per contested target.
    pub records: Vec<ResolutionRecord>,
}

impl ResolutionPlan {
    /// Number of contested targets.
    pub fn contested_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.is_contested()).count()
    }
}

/// Rank claims on one target, best first.
pub fn rank_claims(seed: &str, target: &ProvinceId, claims: &[&Order]) -> Vec<RankedClaim> {
    let mut ranking: Vec<RankedClaim> = claims.iter()
        .map(|order| RankedClaim {
            order_id: order.id,
            country_id: order.country_id.clone(),
            score: contention_score(seed, order.country_id.as_str(), target.as_str()),
        })
        .collect();

    ranking.sort_by(compare_claims);
    ranking
}

/// Score descending, then country ascending.
///
/// Countries are unique within a target, so this is a total order.
pub fn compare_claims(a: &RankedClaim, b: &RankedClaim) -> Ordering {
    b.score.cmp(&a.score).then_with(|| a.country_id.cmp(&b.country_id))
}

/// Decide a turn's outcome from its seed and orders.
pub fn plan_resolution(turn: &Turn, orders: &[Order]) -> ResolutionPlan {
    let mut statuses = BTreeMap::new();
    let mut groups: BTreeMap<(OrderType, &ProvinceId), Vec<&Order>> = BTreeMap::new();

    for order_type in OrderType::ALL {
        let of_turn = select_type(orders, order_type).filter(|o| o.turn_id == turn.id);
        if order_type.requires_resolution() {
            for order in of_turn {
                groups.entry((order_type, &order.target_id)).or_default().push(order);
            }
        } else {
            statuses.extend(of_turn.map(|o| (o.id, OrderStatus::Applied)));
        }
    }

    let mut decisions = Vec::with_capacity(groups.len());
    let mut records = Vec::new();

    for ((order_type, target_id), claims) in groups {
        let ranking = rank_claims(&turn.seed, target_id, &claims);

        for (place, claim) in ranking.iter().enumerate() {
            let status = if place == 0 { OrderStatus::Applied } else { OrderStatus::Rejected };
            statuses.insert(claim.order_id, status);
        }

        let decision = TargetDecision {
            order_type,
            target_id: target_id.clone(),
            ranking,
        };

        if decision.is_contested() {
            records.push(contest_record(turn.id, &decision));
        }
        decisions.push(decision);
    }

    ResolutionPlan {
        turn_id: turn.id,
        decisions,
        statuses,
        records,
    }
}

/// Audit record for a contested decision.
fn contest_record(turn_id: TurnId, decision: &TargetDecision) -> ResolutionRecord {
    let winner = decision.winner();
    let defender = decision.runner_up().map(|c| c.country_id.clone());
    let rivals = decision.ranking.len() - 1;

    let summary = match defender {
        Some(ref defender) => format!(
            "{} took {} over {} ({} rival claim{})",
            winner.country_id,
            decision.target_id,
            defender,
            rivals,
            if rivals == 1 { "" } else { "s" },
        ),
        None => format!("{} took {} unopposed", winner.country_id, decision.target_id),
    };

    ResolutionRecord {
        turn_id,
        target_id: decision.target_id.clone(),
        attacker_id: winner.country_id.clone(),
        defender_id: defender,
        winner_id: winner.country_id.clone(),
        summary,
    }
}

/// Write a plan to the store.
///
/// Ownership first, then order statuses, then records. Every write is an
/// overwrite keyed by id, so applying the same plan again is a no-op.
pub fn apply_plan<S: TurnStore + ?Sized>(
    store: &mut S,
    plan: &ResolutionPlan,
    default_resolution_cost: u32,
) -> Result<(), StoreError> {
    {
        let mut world = WorldState::new(store, default_resolution_cost);
        for decision in &plan.decisions {
            world.assign_owner(&decision.target_id, &decision.winner().country_id)?;
        }
    }

    for (order_id, status) in &plan.statuses {
        store.set_order_status(*order_id, *status)?;
    }

    for record in &plan.records {
        debug!(province = %record.target_id, winner = %record.winner_id, "Contest recorded");
        store.put_resolution(record)?;
    }

    Ok(())
}

/// Resolve a turn in full from its stored orders.
#[instrument(skip(store, turn), fields(turn = turn.number))]
pub fn resolve_turn<S: TurnStore + ?Sized>(
    store: &mut S,
    turn: &Turn,
    default_resolution_cost: u32,
) -> Result<ResolutionPlan, StoreError> {
    let orders = store.orders_for_turn(turn.id)?;
    let plan = plan_resolution(turn, &orders);
    apply_plan(store, &plan, default_resolution_cost)?;

    info!(
        "Resolved {} orders: {} targets decided, {} contested",
        orders.len(),
        plan.decisions.len(),
        plan.contested_count(),
    );
    Ok(plan)
}
