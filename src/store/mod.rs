//! Persistence
//!
//! The engine reads and writes its records through [`TurnStore`] and assumes
//! whatever implements it is durable across restarts. Two implementations
//! ship with the crate:
//!
//! - [`MemoryStore`]: BTreeMap tables, lost on exit
//! - [`FileStore`]: the same tables persisted to a bincode image after every write

pub mod memory;
pub mod file;

pub use memory::MemoryStore;
pub use file::FileStore;

use crate::game::state::{
    CountryId, Order, OrderId, OrderStatus, Province, ProvinceId,
    ResolutionRecord, Turn, TurnId,
};

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Image could not be encoded or decoded.
    #[error("store image codec failed: {0}")]
    Codec(#[from] bincode::Error),

    /// Record to update does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Record to insert already exists.
    #[error("duplicate record: {0}")]
    Duplicate(String),
}

/// CRUD over the engine's records.
///
/// Keys follow the data model: turns by id (numbers unique), orders by
/// (turn, country, type, target), provinces by id, resolution records by
/// (turn, target), countries by id.
pub trait TurnStore: Send {
    /// Every turn not yet committed, lowest number first.
    fn open_turns(&self) -> Result<Vec<Turn>, StoreError>;

    /// The open turn with the highest number.
    fn open_turn(&self) -> Result<Option<Turn>, StoreError> {
        Ok(self.open_turns()?.pop())
    }

    /// Look up a turn.
    fn turn(&self, id: TurnId) -> Result<Option<Turn>, StoreError>;

    /// Insert a new turn. Fails on a duplicate id or number.
    fn insert_turn(&mut self, turn: &Turn) -> Result<(), StoreError>;

    /// Overwrite an existing turn.
    fn update_turn(&mut self, turn: &Turn) -> Result<(), StoreError>;

    /// Insert an order, replacing the order with the same key.
    ///
    /// Returns the replaced order.
    fn upsert_order(&mut self, order: &Order) -> Result<Option<Order>, StoreError>;

    /// All active orders of a turn, in key order.
    fn orders_for_turn(&self, turn_id: TurnId) -> Result<Vec<Order>, StoreError>;

    /// Set the status of an existing order.
    fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), StoreError>;

    /// Look up a province.
    fn province(&self, id: &ProvinceId) -> Result<Option<Province>, StoreError>;

    /// Insert or overwrite a province.
    fn upsert_province(&mut self, province: &Province) -> Result<(), StoreError>;

    /// All provinces, in id order.
    fn provinces(&self) -> Result<Vec<Province>, StoreError>;

    /// Write the resolution record for (turn, target), replacing any previous one.
    fn put_resolution(&mut self, record: &ResolutionRecord) -> Result<(), StoreError>;

    /// Resolution records of a turn, in target order.
    fn resolutions_for_turn(&self, turn_id: TurnId) -> Result<Vec<ResolutionRecord>, StoreError>;

    /// Known countries, in id order.
    fn countries(&self) -> Result<Vec<CountryId>, StoreError>;

    /// Add a country. Returns false if it was already known.
    fn insert_country(&mut self, id: &CountryId) -> Result<bool, StoreError>;
}
