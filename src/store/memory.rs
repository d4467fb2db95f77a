//! In-memory store.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

use super::{StoreError, TurnStore};
use crate::game::state::{
    CountryId, Order, OrderId, OrderKey, OrderStatus, Province, ProvinceId,
    ResolutionRecord, Turn, TurnId,
};

/// BTreeMap-backed tables.
///
/// Serializable as a whole so [`super::FileStore`] can persist it as one image.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    turns: BTreeMap<TurnId, Turn>,
    orders: BTreeMap<OrderKey, Order>,
    provinces: BTreeMap<ProvinceId, Province>,
    resolutions: BTreeMap<(TurnId, ProvinceId), ResolutionRecord>,
    countries: BTreeSet<CountryId>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of turns ever created.
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }
}

impl TurnStore for MemoryStore {
    fn open_turns(&self) -> Result<Vec<Turn>, StoreError> {
        let mut open: Vec<Turn> = self.turns.values()
            .filter(|t| t.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|t| t.number);
        Ok(open)
    }

    fn turn(&self, id: TurnId) -> Result<Option<Turn>, StoreError> {
        Ok(self.turns.get(&id).cloned())
    }

    fn insert_turn(&mut self, turn: &Turn) -> Result<(), StoreError> {
        if self.turns.contains_key(&turn.id) {
            return Err(StoreError::Duplicate(format!("turn {}", turn.id)));
        }
        if self.turns.values().any(|t| t.number == turn.number) {
            return Err(StoreError::Duplicate(format!("turn number {}", turn.number)));
        }
        self.turns.insert(turn.id, turn.clone());
        Ok(())
    }

    fn update_turn(&mut self, turn: &Turn) -> Result<(), StoreError> {
        match self.turns.get_mut(&turn.id) {
            Some(existing) => {
                *existing = turn.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("turn {}", turn.id))),
        }
    }

    fn upsert_order(&mut self, order: &Order) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.insert(order.key(), order.clone()))
    }

    fn orders_for_turn(&self, turn_id: TurnId) -> Result<Vec<Order>, StoreError> {
        Ok(self.orders.values()
            .filter(|o| o.turn_id == turn_id)
            .cloned()
            .collect())
    }

    fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), StoreError> {
        match self.orders.values_mut().find(|o| o.id == id) {
            Some(order) => {
                order.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("order {}", id))),
        }
    }

    fn province(&self, id: &ProvinceId) -> Result<Option<Province>, StoreError> {
        Ok(self.provinces.get(id).cloned())
    }

    fn upsert_province(&mut self, province: &Province) -> Result<(), StoreError> {
        self.provinces.insert(province.id.clone(), province.clone());
        Ok(())
    }

    fn provinces(&self) -> Result<Vec<Province>, StoreError> {
        Ok(self.provinces.values().cloned().collect())
    }

    fn put_resolution(&mut self, record: &ResolutionRecord) -> Result<(), StoreError> {
        self.resolutions.insert((record.turn_id, record.target_id.clone()), record.clone());
        Ok(())
    }

    fn resolutions_for_turn(&self, turn_id: TurnId) -> Result<Vec<ResolutionRecord>, StoreError> {
        Ok(self.resolutions.values()
            .filter(|r| r.turn_id == turn_id)
            .cloned()
            .collect())
    }

    fn countries(&self) -> Result<Vec<CountryId>, StoreError> {
        Ok(self.countries.iter().cloned().collect())
    }

    fn insert_country(&mut self, id: &CountryId) -> Result<bool, StoreError> {
        Ok(self.countries.insert(id.clone()))
    }
}
