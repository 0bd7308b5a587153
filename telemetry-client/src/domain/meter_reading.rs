use rust_decimal::Decimal;
use time::OffsetDateTime;

/// One AC meter sample as accepted by the ingestion path.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MeterReading {
    pub meter_id: String,
    pub kwh_consumed_ac: Decimal,
    pub voltage: Option<Decimal>,
    pub timestamp: OffsetDateTime,
}

impl MeterReading {
    /// True when every column of the live snapshot would stay the same.
    pub fn same_live_values(&self, other: &MeterReading) -> bool {
        self.kwh_consumed_ac == other.kwh_consumed_ac
            && self.voltage == other.voltage
            && self.timestamp == other.timestamp
    }
}

/// A persisted row of `meter_readings_history`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MeterHistoryRow {
    pub id: i64,
    #[sqlx(flatten)]
    pub reading: MeterReading,
    pub ingested_at: OffsetDateTime,
}

/// AC energy summed over a window for one meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::FromRow)]
pub struct MeterWindowTotals {
    pub kwh_consumed_ac: Decimal,
}
