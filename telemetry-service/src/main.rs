use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use telemetry_client::{db::schema, store::PgStore};
use telemetry_service::{api, config::AppConfig, metrics_server, observability};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let db = &cfg.database;
    let connect_options = PgConnectOptions::from_str(&db.uri)
        .map_err(|e| anyhow::anyhow!("invalid database.uri: {e}"))?
        .options([("statement_timeout", db.statement_timeout_ms.to_string())]);

    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .acquire_timeout(Duration::from_millis(db.acquire_timeout_ms))
        .connect_with(connect_options)
        .await?;

    // Otherwise the schema is expected to be applied out-of-band from
    // `telemetry-client/sql/schema/*.sql`.
    if db.apply_schema {
        schema::ensure_schema(&pool).await?;
    }

    let store = Arc::new(PgStore::new(pool));
    let state = api::AppState::new(
        store.clone(),
        store,
        time::Duration::hours(i64::from(cfg.analytics.window_hours)),
    );

    tracing::info!(
        window_hours = cfg.analytics.window_hours,
        "starting telemetry service"
    );
    api::serve(&cfg.http.bind_addr, state).await
}
