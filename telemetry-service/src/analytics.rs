use std::sync::Arc;

use rust_decimal::{prelude::ToPrimitive, Decimal};
use telemetry_client::{
    domain::{
        MeterWindowTotals, PerformanceSummary, TimeWindow, VehicleMeterMapping,
        VehicleWindowTotals,
    },
    MappingStore, ReadingStore,
};
use time::{Duration, OffsetDateTime};

use crate::error::TelemetryError;

/// DC delivered over AC consumed. Undefined unless AC consumption is
/// strictly positive.
pub fn efficiency_ratio(kwh_delivered_dc: Decimal, kwh_consumed_ac: Decimal) -> Option<Decimal> {
    if kwh_consumed_ac > Decimal::ZERO {
        kwh_delivered_dc.checked_div(kwh_consumed_ac)
    } else {
        None
    }
}

// Trailing zeros are stripped first so the conversion divides by the smallest
// power of ten. `Decimal` always has an `f64` approximation.
fn as_f64(value: Decimal) -> f64 {
    value.normalize().to_f64().unwrap_or_default()
}

pub fn summarize(
    vehicle_id: &str,
    meter_id: Option<String>,
    window: TimeWindow,
    vehicle: VehicleWindowTotals,
    meter: MeterWindowTotals,
) -> PerformanceSummary {
    let ratio = efficiency_ratio(vehicle.kwh_delivered_dc, meter.kwh_consumed_ac);

    PerformanceSummary {
        vehicle_id: vehicle_id.to_string(),
        meter_id,
        window,
        kwh_consumed_ac: as_f64(meter.kwh_consumed_ac),
        kwh_delivered_dc: as_f64(vehicle.kwh_delivered_dc),
        efficiency_ratio: ratio.map(as_f64),
        avg_battery_temp: vehicle.avg_battery_temp.map(as_f64),
    }
}

/// Correlates a vehicle's DC series with its mapped meter's AC series.
///
/// Reads history only; live snapshots are never consulted.
pub struct PerformanceAggregator {
    readings: Arc<dyn ReadingStore>,
    mappings: Arc<dyn MappingStore>,
    trailing_span: Duration,
}

impl PerformanceAggregator {
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        mappings: Arc<dyn MappingStore>,
        trailing_span: Duration,
    ) -> Self {
        Self {
            readings,
            mappings,
            trailing_span,
        }
    }

    /// Summary over the configured trailing span ending now (24 hours by default).
    pub async fn performance_trailing(
        &self,
        vehicle_id: &str,
    ) -> Result<PerformanceSummary, TelemetryError> {
        let window = TimeWindow::trailing(OffsetDateTime::now_utc(), self.trailing_span)
            .map_err(|e| TelemetryError::validation(e.to_string()))?;
        self.performance_window(vehicle_id, window).await
    }

    pub async fn performance_window(
        &self,
        vehicle_id: &str,
        window: TimeWindow,
    ) -> Result<PerformanceSummary, TelemetryError> {
        let meter_id = self
            .mappings
            .find_mapping(vehicle_id)
            .await?
            .map(|m| m.meter_id);

        let vehicle_totals = self.readings.vehicle_window_totals(vehicle_id, window);
        let meter_totals = async {
            match meter_id.as_deref() {
                Some(meter_id) => self.readings.meter_window_totals(meter_id, window).await,
                // Unmapped vehicles have no AC series; nothing is queried.
                None => Ok(MeterWindowTotals::default()),
            }
        };

        let (vehicle, meter) = tokio::try_join!(vehicle_totals, meter_totals).map_err(|e| {
            tracing::error!(error = %e, vehicle_id, "performance window query failed");
            e
        })?;

        tracing::debug!(
            vehicle_id,
            meter_id = ?meter_id,
            "performance window evaluated"
        );
        metrics::counter!("analytics_performance_requests_total").increment(1);

        Ok(summarize(vehicle_id, meter_id, window, vehicle, meter))
    }

    /// Register or replace the meter feeding a vehicle's charger.
    pub async fn set_mapping(
        &self,
        vehicle_id: &str,
        meter_id: &str,
    ) -> Result<VehicleMeterMapping, TelemetryError> {
        let mapping = VehicleMeterMapping::new(vehicle_id, meter_id);
        self.mappings.upsert_mapping(&mapping).await?;
        tracing::info!(vehicle_id, meter_id, "vehicle meter mapping registered");
        Ok(mapping)
    }

    pub async fn mapping(
        &self,
        vehicle_id: &str,
    ) -> Result<Option<VehicleMeterMapping>, TelemetryError> {
        Ok(self.mappings.find_mapping(vehicle_id).await?)
    }
}
