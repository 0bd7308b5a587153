use sqlx::PgPool;

use crate::domain::VehicleMeterMapping;

pub async fn find_mapping(
    pool: &PgPool,
    vehicle_id: &str,
) -> Result<Option<VehicleMeterMapping>, sqlx::Error> {
    sqlx::query_as::<_, VehicleMeterMapping>(
        r#"
        SELECT vehicle_id, meter_id
        FROM vehicle_meter_mapping
        WHERE vehicle_id = $1
        "#,
    )
    .bind(vehicle_id)
    .fetch_optional(pool)
    .await
}

/// Last write wins; re-registering an identical pair writes nothing.
pub async fn upsert_mapping(pool: &PgPool, mapping: &VehicleMeterMapping) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO vehicle_meter_mapping AS m (vehicle_id, meter_id)
        VALUES ($1, $2)
        ON CONFLICT (vehicle_id) DO UPDATE SET
            meter_id = EXCLUDED.meter_id
        WHERE m.meter_id IS DISTINCT FROM EXCLUDED.meter_id
        "#,
    )
    .bind(&mapping.vehicle_id)
    .bind(&mapping.meter_id)
    .execute(pool)
    .await?;

    Ok(())
}
