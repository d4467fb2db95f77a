//! World State
//!
//! Province ownership and contest flags. Ownership changes only through
//! [`WorldState::assign_owner`], called by the conflict resolver; contest
//! flags are recomputed by the order ledger after every submission.

use std::collections::{BTreeMap, BTreeSet};

use crate::game::state::{CountryId, Order, Province, ProvinceId};
use crate::store::{StoreError, TurnStore};

/// Mutable view of the province table.
pub struct WorldState<'a, S: TurnStore + ?Sized> {
    store: &'a mut S,
    default_resolution_cost: u32,
}

impl<'a, S: TurnStore + ?Sized> WorldState<'a, S> {
    /// Wrap a store. Lazily created provinces get `default_resolution_cost`.
    pub fn new(store: &'a mut S, default_resolution_cost: u32) -> Self {
        Self { store, default_resolution_cost }
    }

    /// Fetch a province, creating it unowned if this is its first reference.
    pub fn ensure_province(&mut self, id: &ProvinceId) -> Result<Province, StoreError> {
        if let Some(province) = self.store.province(id)? {
            return Ok(province);
        }
        let province = Province::unowned(id.clone(), self.default_resolution_cost);
        self.store.upsert_province(&province)?;
        Ok(province)
    }

    /// Give a province to its sole winner and clear its contest flag.
    pub fn assign_owner(&mut self, id: &ProvinceId, winner: &CountryId) -> Result<Province, StoreError> {
        let mut province = self.ensure_province(id)?;
        if province.owner_country_id.as_ref() != Some(winner) || province.is_contested {
            province.owner_country_id = Some(winner.clone());
            province.is_contested = false;
            self.store.upsert_province(&province)?;
        }
        Ok(province)
    }

    /// Recompute every contest flag from a turn's active orders.
    ///
    /// A province is contested while more than one country holds an active
    /// claim on it. Returns the provinces whose flag changed.
    pub fn recompute_contest_flags(&mut self, orders: &[Order]) -> Result<Vec<ProvinceId>, StoreError> {
        let contested = contested_targets(orders);
        let mut changed = Vec::new();

        for mut province in self.store.provinces()? {
            let flag = contested.contains(&province.id);
            if province.is_contested != flag {
                province.is_contested = flag;
                self.store.upsert_province(&province)?;
                changed.push(province.id);
            }
        }

        Ok(changed)
    }
}

/// Targets claimed by more than one country.
pub fn contested_targets(orders: &[Order]) -> BTreeSet<ProvinceId> {
    let mut claimants: BTreeMap<&ProvinceId, BTreeSet<&CountryId>> = BTreeMap::new();
    for order in orders.iter().filter(|o| o.order_type.requires_resolution()) {
        claimants.entry(&order.target_id).or_default().insert(&order.country_id);
    }
    claimants.into_iter()
        .filter(|(_, countries)| countries.len() > 1)
        .map(|(target, _)| target.clone())
        .collect()
}
