use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;

use crate::domain::{
    MeterHistoryRow, MeterReading, MeterWindowTotals, TimeWindow, VehicleHistoryRow,
    VehicleReading, VehicleWindowTotals,
};

// Range predicates are `device_id = $1 AND "timestamp" >= $2 AND "timestamp" <= $3`
// so each one is served by the (device_id, timestamp) index on the history table.

pub async fn append_meter_history(
    conn: &mut PgConnection,
    reading: &MeterReading,
    ingested_at: OffsetDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO meter_readings_history (meter_id, kwh_consumed_ac, voltage, "timestamp", ingested_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&reading.meter_id)
    .bind(reading.kwh_consumed_ac)
    .bind(reading.voltage)
    .bind(reading.timestamp)
    .bind(ingested_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Upsert the live row for a meter, skipping the update when nothing changed.
///
/// Returns whether a row was inserted or updated.
pub async fn upsert_meter_live(
    conn: &mut PgConnection,
    reading: &MeterReading,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        r#"
        INSERT INTO meter_readings_live AS live (meter_id, kwh_consumed_ac, voltage, "timestamp", updated_at)
        VALUES ($1, $2, $3, $4, now())
        ON CONFLICT (meter_id) DO UPDATE SET
            kwh_consumed_ac = EXCLUDED.kwh_consumed_ac,
            voltage         = EXCLUDED.voltage,
            "timestamp"     = EXCLUDED."timestamp",
            updated_at      = EXCLUDED.updated_at
        WHERE (live.kwh_consumed_ac, live.voltage, live."timestamp")
              IS DISTINCT FROM (EXCLUDED.kwh_consumed_ac, EXCLUDED.voltage, EXCLUDED."timestamp")
        "#,
    )
    .bind(&reading.meter_id)
    .bind(reading.kwh_consumed_ac)
    .bind(reading.voltage)
    .bind(reading.timestamp)
    .execute(conn)
    .await?;

    Ok(res.rows_affected() > 0)
}

pub async fn append_vehicle_history(
    conn: &mut PgConnection,
    reading: &VehicleReading,
    ingested_at: OffsetDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO vehicle_readings_history (vehicle_id, soc, kwh_delivered_dc, battery_temp, "timestamp", ingested_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&reading.vehicle_id)
    .bind(reading.soc)
    .bind(reading.kwh_delivered_dc)
    .bind(reading.battery_temp)
    .bind(reading.timestamp)
    .bind(ingested_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn upsert_vehicle_live(
    conn: &mut PgConnection,
    reading: &VehicleReading,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        r#"
        INSERT INTO vehicle_readings_live AS live (vehicle_id, soc, kwh_delivered_dc, battery_temp, "timestamp", updated_at)
        VALUES ($1, $2, $3, $4, $5, now())
        ON CONFLICT (vehicle_id) DO UPDATE SET
            soc              = EXCLUDED.soc,
            kwh_delivered_dc = EXCLUDED.kwh_delivered_dc,
            battery_temp     = EXCLUDED.battery_temp,
            "timestamp"      = EXCLUDED."timestamp",
            updated_at       = EXCLUDED.updated_at
        WHERE (live.soc, live.kwh_delivered_dc, live.battery_temp, live."timestamp")
              IS DISTINCT FROM (EXCLUDED.soc, EXCLUDED.kwh_delivered_dc, EXCLUDED.battery_temp, EXCLUDED."timestamp")
        "#,
    )
    .bind(&reading.vehicle_id)
    .bind(reading.soc)
    .bind(reading.kwh_delivered_dc)
    .bind(reading.battery_temp)
    .bind(reading.timestamp)
    .execute(conn)
    .await?;

    Ok(res.rows_affected() > 0)
}

/// Total AC energy drawn by one meter over a closed window.
pub async fn meter_window_totals(
    pool: &PgPool,
    meter_id: &str,
    window: TimeWindow,
) -> Result<MeterWindowTotals, sqlx::Error> {
    sqlx::query_as::<_, MeterWindowTotals>(
        r#"
        SELECT
            COALESCE(SUM(kwh_consumed_ac), 0) AS kwh_consumed_ac
        FROM meter_readings_history
        WHERE meter_id = $1
          AND "timestamp" >= $2
          AND "timestamp" <= $3
        "#,
    )
    .bind(meter_id)
    .bind(window.from())
    .bind(window.to())
    .fetch_one(pool)
    .await
}

/// Total DC energy and mean battery temperature for one vehicle over a
/// closed window. The mean is rounded to 6 places to stay within `Decimal`
/// precision.
pub async fn vehicle_window_totals(
    pool: &PgPool,
    vehicle_id: &str,
    window: TimeWindow,
) -> Result<VehicleWindowTotals, sqlx::Error> {
    sqlx::query_as::<_, VehicleWindowTotals>(
        r#"
        SELECT
            COALESCE(SUM(kwh_delivered_dc), 0) AS kwh_delivered_dc,
            ROUND(AVG(battery_temp), 6)        AS avg_battery_temp
        FROM vehicle_readings_history
        WHERE vehicle_id = $1
          AND "timestamp" >= $2
          AND "timestamp" <= $3
        "#,
    )
    .bind(vehicle_id)
    .bind(window.from())
    .bind(window.to())
    .fetch_one(pool)
    .await
}

pub async fn meter_live(pool: &PgPool, meter_id: &str) -> Result<Option<MeterReading>, sqlx::Error> {
    sqlx::query_as::<_, MeterReading>(
        r#"
        SELECT meter_id, kwh_consumed_ac, voltage, "timestamp"
        FROM meter_readings_live
        WHERE meter_id = $1
        "#,
    )
    .bind(meter_id)
    .fetch_optional(pool)
    .await
}

pub async fn vehicle_live(
    pool: &PgPool,
    vehicle_id: &str,
) -> Result<Option<VehicleReading>, sqlx::Error> {
    sqlx::query_as::<_, VehicleReading>(
        r#"
        SELECT vehicle_id, soc, kwh_delivered_dc, battery_temp, "timestamp"
        FROM vehicle_readings_live
        WHERE vehicle_id = $1
        "#,
    )
    .bind(vehicle_id)
    .fetch_optional(pool)
    .await
}

/// Fetch a time-ordered load profile for a single meter.
pub async fn meter_history(
    pool: &PgPool,
    meter_id: &str,
    window: TimeWindow,
) -> Result<Vec<MeterHistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, MeterHistoryRow>(
        r#"
        SELECT
            id,
            meter_id,
            kwh_consumed_ac,
            voltage,
            "timestamp",
            ingested_at
        FROM meter_readings_history
        WHERE meter_id = $1
          AND "timestamp" >= $2
          AND "timestamp" <= $3
        ORDER BY "timestamp", id
        "#,
    )
    .bind(meter_id)
    .bind(window.from())
    .bind(window.to())
    .fetch_all(pool)
    .await
}

pub async fn vehicle_history(
    pool: &PgPool,
    vehicle_id: &str,
    window: TimeWindow,
) -> Result<Vec<VehicleHistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, VehicleHistoryRow>(
        r#"
        SELECT
            id,
            vehicle_id,
            soc,
            kwh_delivered_dc,
            battery_temp,
            "timestamp",
            ingested_at
        FROM vehicle_readings_history
        WHERE vehicle_id = $1
          AND "timestamp" >= $2
          AND "timestamp" <= $3
        ORDER BY "timestamp", id
        "#,
    )
    .bind(vehicle_id)
    .bind(window.from())
    .bind(window.to())
    .fetch_all(pool)
    .await
}
