//! Public Snapshot
//!
//! Client-safe projection of the match: turn, phase, deadline, readiness
//! and the province table. Orders are never included, so no country can
//! see another's plans before resolution.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::scheduler::MatchContext;
use crate::game::state::{CountryId, Phase, Province, ProvinceId, TurnId};

/// Point-in-time view of the match, pushed to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSnapshot {
    /// Increases by one with every published change. Starts over when the process restarts.
    pub version: u64,
    /// Current turn.
    pub turn_id: TurnId,
    /// Current turn number.
    pub turn_number: u32,
    /// Current phase.
    pub phase: Phase,
    /// When the current phase ends, if it has a published deadline.
    pub phase_deadline: Option<DateTime<Utc>>,
    /// Countries that declared readiness this turn.
    pub ready: Vec<CountryId>,
    /// Per-country status.
    pub countries: Vec<CountryStatus>,
    /// Every known province.
    pub provinces: Vec<ProvinceView>,
}

/// One country's public status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryStatus {
    /// Country.
    pub country_id: CountryId,
    /// In the ready set.
    pub ready: bool,
    /// Submitted at least one order this turn.
    pub submitted: bool,
    /// Provinces currently owned.
    pub provinces_owned: u32,
}

/// One province's public state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvinceView {
    /// Province.
    pub id: ProvinceId,
    /// Display name.
    pub name: String,
    /// Owner, if any.
    pub owner: Option<CountryId>,
    /// Claimed by more than one country this turn.
    pub contested: bool,
    /// Resolution cost.
    pub resolution_cost: u32,
}

impl From<&Province> for ProvinceView {
    fn from(p: &Province) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            owner: p.owner_country_id.clone(),
            contested: p.is_contested,
            resolution_cost: p.resolution_cost,
        }
    }
}

impl PublicSnapshot {
    /// Look up a province.
    pub fn province(&self, id: &str) -> Option<&ProvinceView> {
        self.provinces.iter().find(|p| p.id.as_str() == id)
    }

    /// Look up a country.
    pub fn country(&self, id: &str) -> Option<&CountryStatus> {
        self.countries.iter().find(|c| c.country_id.as_str() == id)
    }
}

/// Build a snapshot from the engine context and the province table.
///
/// Both inputs must be read under the same borrow of the engine.
pub fn project(ctx: &MatchContext, provinces: &[Province]) -> PublicSnapshot {
    let mut owned: BTreeMap<&CountryId, u32> = BTreeMap::new();
    for owner in provinces.iter().filter_map(|p| p.owner_country_id.as_ref()) {
        *owned.entry(owner).or_default() += 1;
    }

    let countries = ctx.countries.iter()
        .map(|id| CountryStatus {
            country_id: id.clone(),
            ready: ctx.ready.contains(id),
            submitted: ctx.submitted.contains(id),
            provinces_owned: owned.get(id).copied().unwrap_or(0),
        })
        .collect();

    PublicSnapshot {
        version: ctx.revision,
        turn_id: ctx.turn.id,
        turn_number: ctx.turn.number,
        phase: ctx.turn.phase,
        phase_deadline: ctx.turn.phase_deadline,
        ready: ctx.ready.iter().cloned().collect(),
        countries,
        provinces: provinces.iter().map(ProvinceView::from).collect(),
    }
}
