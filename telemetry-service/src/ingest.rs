use std::{sync::Arc, time::Instant};

use telemetry_client::{
    domain::{MeterReading, VehicleReading},
    ReadingStore, StoreError,
};
use time::OffsetDateTime;

use crate::error::TelemetryError;

/// A validated reading from either device class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Telemetry {
    Meter(MeterReading),
    Vehicle(VehicleReading),
}

impl Telemetry {
    pub fn kind(&self) -> &'static str {
        match self {
            Telemetry::Meter(_) => "meter",
            Telemetry::Vehicle(_) => "vehicle",
        }
    }
}

/// Writes each reading to history and the live snapshot in one transaction.
///
/// The live row is replaced in commit order, even when the incoming reading
/// is older than the one it replaces.
pub struct IngestionCoordinator {
    store: Arc<dyn ReadingStore>,
}

impl IngestionCoordinator {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }

    pub async fn ingest(&self, telemetry: &Telemetry) -> Result<(), TelemetryError> {
        match telemetry {
            Telemetry::Meter(reading) => self.ingest_meter(reading).await,
            Telemetry::Vehicle(reading) => self.ingest_vehicle(reading).await,
        }
    }

    pub async fn ingest_meter(&self, reading: &MeterReading) -> Result<(), TelemetryError> {
        let started = Instant::now();
        let res = self.write_meter(reading).await;
        record_outcome("meter", &reading.meter_id, started, res)
    }

    pub async fn ingest_vehicle(&self, reading: &VehicleReading) -> Result<(), TelemetryError> {
        let started = Instant::now();
        let res = self.write_vehicle(reading).await;
        record_outcome("vehicle", &reading.vehicle_id, started, res)
    }

    // An early return drops `tx` uncommitted, which rolls back the history append.
    async fn write_meter(&self, reading: &MeterReading) -> Result<bool, StoreError> {
        let ingested_at = OffsetDateTime::now_utc();
        let mut tx = self.store.begin().await?;
        tx.append_meter_history(reading, ingested_at).await?;
        let live_written = tx.upsert_meter_live(reading).await?;
        tx.commit().await?;
        Ok(live_written)
    }

    async fn write_vehicle(&self, reading: &VehicleReading) -> Result<bool, StoreError> {
        let ingested_at = OffsetDateTime::now_utc();
        let mut tx = self.store.begin().await?;
        tx.append_vehicle_history(reading, ingested_at).await?;
        let live_written = tx.upsert_vehicle_live(reading).await?;
        tx.commit().await?;
        Ok(live_written)
    }
}

fn record_outcome(
    kind: &'static str,
    device_id: &str,
    started: Instant,
    res: Result<bool, StoreError>,
) -> Result<(), TelemetryError> {
    match res {
        Ok(live_written) => {
            metrics::counter!("telemetry_ingested_total", "kind" => kind).increment(1);
            metrics::histogram!("telemetry_ingest_duration_seconds", "kind" => kind)
                .record(started.elapsed().as_secs_f64());
            tracing::debug!(kind, device_id, live_written, "telemetry ingested");
            Ok(())
        }
        Err(e) => {
            metrics::counter!("telemetry_ingest_failed_total", "kind" => kind).increment(1);
            tracing::error!(error = %e, kind, device_id, "telemetry ingestion aborted");
            Err(e.into())
        }
    }
}
