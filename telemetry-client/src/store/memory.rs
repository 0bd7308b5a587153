use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::{MappingStore, ReadingStore, StoreError, StoreTransaction};
use crate::domain::{
    MeterHistoryRow, MeterReading, MeterWindowTotals, TimeWindow, VehicleHistoryRow,
    VehicleMeterMapping, VehicleReading, VehicleWindowTotals,
};

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    MeterHistoryAppend,
    MeterLiveUpsert,
    VehicleHistoryAppend,
    VehicleLiveUpsert,
    Commit,
    MeterTotals,
    VehicleTotals,
    MappingLookup,
    MappingUpsert,
}

/// How often each kind of statement reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub meter_totals_queries: u64,
    pub vehicle_totals_queries: u64,
    pub live_writes: u64,
    pub mapping_writes: u64,
}

#[derive(Default)]
struct Inner {
    meter_history: Vec<MeterHistoryRow>,
    meter_live: HashMap<String, MeterReading>,
    vehicle_history: Vec<VehicleHistoryRow>,
    vehicle_live: HashMap<String, VehicleReading>,
    mappings: HashMap<String, VehicleMeterMapping>,
    next_id: i64,
    stats: StoreStats,
    failures: HashSet<FailPoint>,
}

impl Inner {
    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        if self.failures.contains(&point) {
            return Err(StoreError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store with the same commit semantics as the PostgreSQL store:
/// writes staged in a [`MemoryTransaction`] are applied under one lock on
/// commit and discarded on drop.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call at `point` fail until [`MemoryStore::clear_failures`].
    pub async fn fail_on(&self, point: FailPoint) {
        self.inner.lock().await.failures.insert(point);
    }

    pub async fn clear_failures(&self) {
        self.inner.lock().await.failures.clear();
    }

    pub async fn stats(&self) -> StoreStats {
        self.inner.lock().await.stats
    }

    pub async fn mapping_count(&self) -> usize {
        self.inner.lock().await.mappings.len()
    }
}

enum Staged {
    MeterHistory(MeterReading, OffsetDateTime),
    MeterLive(MeterReading),
    VehicleHistory(VehicleReading, OffsetDateTime),
    VehicleLive(VehicleReading),
}

pub struct MemoryTransaction {
    inner: Arc<Mutex<Inner>>,
    staged: Vec<Staged>,
}

impl MemoryTransaction {
    fn staged_meter_live(&self, meter_id: &str) -> Option<&MeterReading> {
        self.staged.iter().rev().find_map(|s| match s {
            Staged::MeterLive(r) if r.meter_id == meter_id => Some(r),
            _ => None,
        })
    }

    fn staged_vehicle_live(&self, vehicle_id: &str) -> Option<&VehicleReading> {
        self.staged.iter().rev().find_map(|s| match s {
            Staged::VehicleLive(r) if r.vehicle_id == vehicle_id => Some(r),
            _ => None,
        })
    }
}

#[async_trait::async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn append_meter_history(
        &mut self,
        reading: &MeterReading,
        ingested_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.inner.lock().await.check(FailPoint::MeterHistoryAppend)?;
        self.staged
            .push(Staged::MeterHistory(reading.clone(), ingested_at));
        Ok(())
    }

    async fn upsert_meter_live(&mut self, reading: &MeterReading) -> Result<bool, StoreError> {
        let unchanged = {
            let inner = self.inner.lock().await;
            inner.check(FailPoint::MeterLiveUpsert)?;
            self.staged_meter_live(&reading.meter_id)
                .or_else(|| inner.meter_live.get(&reading.meter_id))
                .is_some_and(|current| current.same_live_values(reading))
        };
        // Staged regardless; commit compares against the row live holds then.
        self.staged.push(Staged::MeterLive(reading.clone()));
        Ok(!unchanged)
    }

    async fn append_vehicle_history(
        &mut self,
        reading: &VehicleReading,
        ingested_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.inner.lock().await.check(FailPoint::VehicleHistoryAppend)?;
        self.staged
            .push(Staged::VehicleHistory(reading.clone(), ingested_at));
        Ok(())
    }

    async fn upsert_vehicle_live(&mut self, reading: &VehicleReading) -> Result<bool, StoreError> {
        let unchanged = {
            let inner = self.inner.lock().await;
            inner.check(FailPoint::VehicleLiveUpsert)?;
            self.staged_vehicle_live(&reading.vehicle_id)
                .or_else(|| inner.vehicle_live.get(&reading.vehicle_id))
                .is_some_and(|current| current.same_live_values(reading))
        };
        // Staged regardless; commit compares against the row live holds then.
        self.staged.push(Staged::VehicleLive(reading.clone()));
        Ok(!unchanged)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { inner: shared, staged } = *self;
        let mut inner = shared.lock().await;
        inner.check(FailPoint::Commit)?;

        for write in staged {
            match write {
                Staged::MeterHistory(reading, ingested_at) => {
                    let id = inner.next_id();
                    inner.meter_history.push(MeterHistoryRow {
                        id,
                        reading,
                        ingested_at,
                    });
                }
                Staged::MeterLive(reading) => {
                    let current = inner.meter_live.get(&reading.meter_id);
                    if current.is_some_and(|c| c.same_live_values(&reading)) {
                        continue;
                    }
                    inner.stats.live_writes += 1;
                    inner.meter_live.insert(reading.meter_id.clone(), reading);
                }
                Staged::VehicleHistory(reading, ingested_at) => {
                    let id = inner.next_id();
                    inner.vehicle_history.push(VehicleHistoryRow {
                        id,
                        reading,
                        ingested_at,
                    });
                }
                Staged::VehicleLive(reading) => {
                    let current = inner.vehicle_live.get(&reading.vehicle_id);
                    if current.is_some_and(|c| c.same_live_values(&reading)) {
                        continue;
                    }
                    inner.stats.live_writes += 1;
                    inner.vehicle_live.insert(reading.vehicle_id.clone(), reading);
                }
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl ReadingStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.inner.lock().await.check(FailPoint::Begin)?;
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
        }))
    }

    async fn meter_window_totals(
        &self,
        meter_id: &str,
        window: TimeWindow,
    ) -> Result<MeterWindowTotals, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.stats.meter_totals_queries += 1;
        inner.check(FailPoint::MeterTotals)?;

        let kwh_consumed_ac = inner
            .meter_history
            .iter()
            .filter(|row| row.reading.meter_id == meter_id && window.contains(row.reading.timestamp))
            .map(|row| row.reading.kwh_consumed_ac)
            .sum();

        Ok(MeterWindowTotals { kwh_consumed_ac })
    }

    async fn vehicle_window_totals(
        &self,
        vehicle_id: &str,
        window: TimeWindow,
    ) -> Result<VehicleWindowTotals, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.stats.vehicle_totals_queries += 1;
        inner.check(FailPoint::VehicleTotals)?;

        let rows: Vec<&VehicleReading> = inner
            .vehicle_history
            .iter()
            .map(|row| &row.reading)
            .filter(|r| r.vehicle_id == vehicle_id && window.contains(r.timestamp))
            .collect();

        let kwh_delivered_dc = rows.iter().map(|r| r.kwh_delivered_dc).sum();
        let temps: Vec<Decimal> = rows.iter().filter_map(|r| r.battery_temp).collect();
        let avg_battery_temp = if temps.is_empty() {
            None
        } else {
            let total: Decimal = temps.iter().copied().sum();
            Some((total / Decimal::from(temps.len())).round_dp(6))
        };

        Ok(VehicleWindowTotals {
            kwh_delivered_dc,
            avg_battery_temp,
        })
    }

    async fn meter_live(&self, meter_id: &str) -> Result<Option<MeterReading>, StoreError> {
        Ok(self.inner.lock().await.meter_live.get(meter_id).cloned())
    }

    async fn vehicle_live(&self, vehicle_id: &str) -> Result<Option<VehicleReading>, StoreError> {
        Ok(self.inner.lock().await.vehicle_live.get(vehicle_id).cloned())
    }

    async fn meter_history(
        &self,
        meter_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<MeterHistoryRow>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<MeterHistoryRow> = inner
            .meter_history
            .iter()
            .filter(|row| row.reading.meter_id == meter_id && window.contains(row.reading.timestamp))
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.reading.timestamp, row.id));
        Ok(rows)
    }

    async fn vehicle_history(
        &self,
        vehicle_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<VehicleHistoryRow>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<VehicleHistoryRow> = inner
            .vehicle_history
            .iter()
            .filter(|row| {
                row.reading.vehicle_id == vehicle_id && window.contains(row.reading.timestamp)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.reading.timestamp, row.id));
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl MappingStore for MemoryStore {
    async fn find_mapping(
        &self,
        vehicle_id: &str,
    ) -> Result<Option<VehicleMeterMapping>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check(FailPoint::MappingLookup)?;
        Ok(inner.mappings.get(vehicle_id).cloned())
    }

    async fn upsert_mapping(&self, mapping: &VehicleMeterMapping) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check(FailPoint::MappingUpsert)?;
        if inner.mappings.get(&mapping.vehicle_id) != Some(mapping) {
            inner.stats.mapping_writes += 1;
            inner
                .mappings
                .insert(mapping.vehicle_id.clone(), mapping.clone());
        }
        Ok(())
    }
}
