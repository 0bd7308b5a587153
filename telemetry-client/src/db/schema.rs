//! Idempotent schema bootstrap for the telemetry tables.

use anyhow::{Context, Result};
use sqlx::PgPool;

const TELEMETRY_SCHEMA: &str = include_str!("../../sql/schema/01_telemetry.sql");

/// Split a DDL script into individual statements, dropping `--` comments.
pub fn statements(script: &str) -> Vec<String> {
    let without_comments: String = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Create the telemetry tables and indexes if they do not exist yet.
///
/// Runs in a single transaction; safe to call on every startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin schema transaction")?;

    for stmt in statements(TELEMETRY_SCHEMA) {
        sqlx::query(&stmt)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to apply schema statement: {stmt}"))?;
    }

    tx.commit().await.context("failed to commit schema transaction")?;
    tracing::info!("telemetry schema ensured");
    Ok(())
}
