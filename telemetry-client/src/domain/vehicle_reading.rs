use rust_decimal::Decimal;
use time::OffsetDateTime;

/// One charger/vehicle sample as accepted by the ingestion path.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VehicleReading {
    pub vehicle_id: String,
    pub soc: Decimal,
    pub kwh_delivered_dc: Decimal,
    pub battery_temp: Option<Decimal>,
    pub timestamp: OffsetDateTime,
}

impl VehicleReading {
    pub fn same_live_values(&self, other: &VehicleReading) -> bool {
        self.soc == other.soc
            && self.kwh_delivered_dc == other.kwh_delivered_dc
            && self.battery_temp == other.battery_temp
            && self.timestamp == other.timestamp
    }
}

/// A persisted row of `vehicle_readings_history`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VehicleHistoryRow {
    pub id: i64,
    #[sqlx(flatten)]
    pub reading: VehicleReading,
    pub ingested_at: OffsetDateTime,
}

/// DC energy and mean battery temperature over a window for one vehicle.
///
/// `avg_battery_temp` is `None` when the window holds no rows or only rows
/// without a temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::FromRow)]
pub struct VehicleWindowTotals {
    pub kwh_delivered_dc: Decimal,
    pub avg_battery_temp: Option<Decimal>,
}
