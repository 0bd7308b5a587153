use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;

use super::{MappingStore, ReadingStore, StoreError, StoreTransaction};
use crate::db::{mapping_queries, reading_queries};
use crate::domain::{
    MeterHistoryRow, MeterReading, MeterWindowTotals, TimeWindow, VehicleHistoryRow,
    VehicleMeterMapping, VehicleReading, VehicleWindowTotals,
};

/// PostgreSQL-backed reading and mapping store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Wraps an sqlx transaction; sqlx rolls it back when dropped uncommitted.
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn append_meter_history(
        &mut self,
        reading: &MeterReading,
        ingested_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        reading_queries::append_meter_history(&mut *self.tx, reading, ingested_at).await?;
        Ok(())
    }

    async fn upsert_meter_live(&mut self, reading: &MeterReading) -> Result<bool, StoreError> {
        Ok(reading_queries::upsert_meter_live(&mut *self.tx, reading).await?)
    }

    async fn append_vehicle_history(
        &mut self,
        reading: &VehicleReading,
        ingested_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        reading_queries::append_vehicle_history(&mut *self.tx, reading, ingested_at).await?;
        Ok(())
    }

    async fn upsert_vehicle_live(&mut self, reading: &VehicleReading) -> Result<bool, StoreError> {
        Ok(reading_queries::upsert_vehicle_live(&mut *self.tx, reading).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgStoreTransaction { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }

    async fn meter_window_totals(
        &self,
        meter_id: &str,
        window: TimeWindow,
    ) -> Result<MeterWindowTotals, StoreError> {
        Ok(reading_queries::meter_window_totals(&self.pool, meter_id, window).await?)
    }

    async fn vehicle_window_totals(
        &self,
        vehicle_id: &str,
        window: TimeWindow,
    ) -> Result<VehicleWindowTotals, StoreError> {
        Ok(reading_queries::vehicle_window_totals(&self.pool, vehicle_id, window).await?)
    }

    async fn meter_live(&self, meter_id: &str) -> Result<Option<MeterReading>, StoreError> {
        Ok(reading_queries::meter_live(&self.pool, meter_id).await?)
    }

    async fn vehicle_live(&self, vehicle_id: &str) -> Result<Option<VehicleReading>, StoreError> {
        Ok(reading_queries::vehicle_live(&self.pool, vehicle_id).await?)
    }

    async fn meter_history(
        &self,
        meter_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<MeterHistoryRow>, StoreError> {
        Ok(reading_queries::meter_history(&self.pool, meter_id, window).await?)
    }

    async fn vehicle_history(
        &self,
        vehicle_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<VehicleHistoryRow>, StoreError> {
        Ok(reading_queries::vehicle_history(&self.pool, vehicle_id, window).await?)
    }
}

#[async_trait::async_trait]
impl MappingStore for PgStore {
    async fn find_mapping(
        &self,
        vehicle_id: &str,
    ) -> Result<Option<VehicleMeterMapping>, StoreError> {
        Ok(mapping_queries::find_mapping(&self.pool, vehicle_id).await?)
    }

    async fn upsert_mapping(&self, mapping: &VehicleMeterMapping) -> Result<(), StoreError> {
        mapping_queries::upsert_mapping(&self.pool, mapping).await?;
        Ok(())
    }
}
