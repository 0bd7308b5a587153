//! Storage contracts shared by the ingestion and analytics paths.
//!
//! Two implementations exist: [`postgres::PgStore`] for production and
//! [`memory::MemoryStore`], an in-process stand-in with failure injection.

pub mod memory;
pub mod postgres;

use time::OffsetDateTime;

use crate::domain::{
    MeterHistoryRow, MeterReading, MeterWindowTotals, TimeWindow, VehicleHistoryRow,
    VehicleMeterMapping, VehicleReading, VehicleWindowTotals,
};

pub use memory::{FailPoint, MemoryStore};
pub use postgres::PgStore;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            // Class 22 (data exception) and 23 (integrity constraint violation).
            sqlx::Error::Database(db)
                if db
                    .code()
                    .is_some_and(|c| c.starts_with("22") || c.starts_with("23")) =>
            {
                StoreError::Constraint(e.to_string())
            }
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// Scoped unit of work over the reading tables.
///
/// Writes become visible only through [`StoreTransaction::commit`]. Dropping
/// the unit without committing rolls every write back.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    async fn append_meter_history(
        &mut self,
        reading: &MeterReading,
        ingested_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Replace the live row for the meter. Returns `false` when the stored
    /// row already held identical values and no update was written.
    async fn upsert_meter_live(&mut self, reading: &MeterReading) -> Result<bool, StoreError>;

    async fn append_vehicle_history(
        &mut self,
        reading: &VehicleReading,
        ingested_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    async fn upsert_vehicle_live(&mut self, reading: &VehicleReading) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// `SUM(kwh_consumed_ac)` over the meter's history in `window`.
    async fn meter_window_totals(
        &self,
        meter_id: &str,
        window: TimeWindow,
    ) -> Result<MeterWindowTotals, StoreError>;

    /// `SUM(kwh_delivered_dc)` and `AVG(battery_temp)` over the vehicle's
    /// history in `window`.
    async fn vehicle_window_totals(
        &self,
        vehicle_id: &str,
        window: TimeWindow,
    ) -> Result<VehicleWindowTotals, StoreError>;

    async fn meter_live(&self, meter_id: &str) -> Result<Option<MeterReading>, StoreError>;

    async fn vehicle_live(&self, vehicle_id: &str) -> Result<Option<VehicleReading>, StoreError>;

    /// Time-ordered history rows for one meter.
    async fn meter_history(
        &self,
        meter_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<MeterHistoryRow>, StoreError>;

    async fn vehicle_history(
        &self,
        vehicle_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<VehicleHistoryRow>, StoreError>;
}

#[async_trait::async_trait]
pub trait MappingStore: Send + Sync {
    async fn find_mapping(&self, vehicle_id: &str)
        -> Result<Option<VehicleMeterMapping>, StoreError>;

    /// Insert or replace the mapping keyed by vehicle id.
    async fn upsert_mapping(&self, mapping: &VehicleMeterMapping) -> Result<(), StoreError>;
}
