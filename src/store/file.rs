//! File-backed store.
//!
//! Keeps a [`MemoryStore`] in memory and rewrites its bincode image after
//! every mutation. The image is written to a sibling temp file and renamed
//! over the previous one, so a crash leaves either the old or the new image.

use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

use super::{MemoryStore, StoreError, TurnStore};
use crate::game::state::{
    CountryId, Order, OrderId, OrderStatus, Province, ProvinceId,
    ResolutionRecord, Turn, TurnId,
};

/// Durable store persisted to a single file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    image: MemoryStore,
}

impl FileStore {
    /// Open the image at `path`, or start empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let image = if path.exists() {
            let bytes = fs::read(&path)?;
            let image: MemoryStore = bincode::deserialize(&bytes)?;
            info!("Loaded store image from {} ({} turns)", path.display(), image.turn_count());
            image
        } else {
            info!("No store image at {}, starting empty", path.display());
            MemoryStore::new()
        };
        Ok(Self { path, image })
    }

    fn flush(&self) -> Result<(), StoreError> {
        let bytes = bincode::serialize(&self.image)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Flushed {} byte store image", bytes.len());
        Ok(())
    }
}

impl TurnStore for FileStore {
    fn open_turns(&self) -> Result<Vec<Turn>, StoreError> {
        self.image.open_turns()
    }

    fn turn(&self, id: TurnId) -> Result<Option<Turn>, StoreError> {
        self.image.turn(id)
    }

    fn insert_turn(&mut self, turn: &Turn) -> Result<(), StoreError> {
        self.image.insert_turn(turn)?;
        self.flush()
    }

    fn update_turn(&mut self, turn: &Turn) -> Result<(), StoreError> {
        self.image.update_turn(turn)?;
        self.flush()
    }

    fn upsert_order(&mut self, order: &Order) -> Result<Option<Order>, StoreError> {
        let replaced = self.image.upsert_order(order)?;
        self.flush()?;
        Ok(replaced)
    }

    fn orders_for_turn(&self, turn_id: TurnId) -> Result<Vec<Order>, StoreError> {
        self.image.orders_for_turn(turn_id)
    }

    fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), StoreError> {
        self.image.set_order_status(id, status)?;
        self.flush()
    }

    fn province(&self, id: &ProvinceId) -> Result<Option<Province>, StoreError> {
        self.image.province(id)
    }

    fn upsert_province(&mut self, province: &Province) -> Result<(), StoreError> {
        self.image.upsert_province(province)?;
        self.flush()
    }

    fn provinces(&self) -> Result<Vec<Province>, StoreError> {
        self.image.provinces()
    }

    fn put_resolution(&mut self, record: &ResolutionRecord) -> Result<(), StoreError> {
        self.image.put_resolution(record)?;
        self.flush()
    }

    fn resolutions_for_turn(&self, turn_id: TurnId) -> Result<Vec<ResolutionRecord>, StoreError> {
        self.image.resolutions_for_turn(turn_id)
    }

    fn countries(&self) -> Result<Vec<CountryId>, StoreError> {
        self.image.countries()
    }

    fn insert_country(&mut self, id: &CountryId) -> Result<bool, StoreError> {
        let inserted = self.image.insert_country(id)?;
        if inserted {
            self.flush()?;
        }
        Ok(inserted)
    }
}
