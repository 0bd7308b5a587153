use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use telemetry_client::{
    domain::{PerformanceSummary, VehicleMeterMapping},
    MappingStore, ReadingStore, StoreError,
};
use time::{Duration, OffsetDateTime};

use crate::{
    analytics::PerformanceAggregator, error::TelemetryError, ingest::IngestionCoordinator,
    validation,
};

#[derive(Clone)]
pub struct AppState {
    ingestion: Arc<IngestionCoordinator>,
    analytics: Arc<PerformanceAggregator>,
}

impl AppState {
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        mappings: Arc<dyn MappingStore>,
        trailing_span: Duration,
    ) -> Self {
        Self {
            ingestion: Arc::new(IngestionCoordinator::new(Arc::clone(&readings))),
            analytics: Arc::new(PerformanceAggregator::new(readings, mappings, trailing_span)),
        }
    }
}

#[derive(Serialize)]
struct IngestAck {
    ok: bool,
}

#[derive(Deserialize)]
struct WindowQuery {
    #[serde(default, with = "time::serde::rfc3339::option")]
    from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    to: Option<OffsetDateTime>,
}

impl IntoResponse for TelemetryError {
    fn into_response(self) -> Response {
        match self {
            TelemetryError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "message": "Validation failed", "errors": errors })),
            )
                .into_response(),
            TelemetryError::Store(e) => {
                let status = match e {
                    StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    StoreError::Constraint(_) => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, Json(serde_json::json!({ "message": e.to_string() }))).into_response()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/telemetry/ingest", post(ingest))
        .route("/v1/analytics/performance/:vehicle_id", get(performance))
        .route("/v1/analytics/vehicle-mapping", post(set_mapping))
        .with_state(state)
}

pub async fn serve(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http bind addr {bind_addr}: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "telemetry API listening");
    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

async fn ingest(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestAck>, TelemetryError> {
    let telemetry = validation::parse_ingest_body(&body)?;
    metrics::counter!("http_ingest_requests_total", "kind" => telemetry.kind()).increment(1);
    state.ingestion.ingest(&telemetry).await?;
    Ok(Json(IngestAck { ok: true }))
}

async fn performance(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<PerformanceSummary>, TelemetryError> {
    let Query(query) = query.map_err(|e| TelemetryError::validation(e.body_text()))?;
    let summary = match validation::window_from_bounds(query.from, query.to)? {
        Some(window) => state.analytics.performance_window(&vehicle_id, window).await?,
        None => state.analytics.performance_trailing(&vehicle_id).await?,
    };
    Ok(Json(summary))
}

async fn set_mapping(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<VehicleMeterMapping>, TelemetryError> {
    let requested = validation::parse_mapping_body(&body)?;
    let mapping = state
        .analytics
        .set_mapping(&requested.vehicle_id, &requested.meter_id)
        .await?;
    Ok(Json(mapping))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use axum::{body::Body, http::Request};
    use telemetry_client::{
        domain::TimeWindow,
        store::{FailPoint, MemoryStore},
    };
    use time::macros::datetime;
    use tower::ServiceExt; // for `oneshot`

    fn app(store: &MemoryStore) -> Router {
        router(AppState::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Duration::hours(24),
        ))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn ingest_meter_reading_over_http() {
        let store = MemoryStore::new();
        let resp = app(&store)
            .oneshot(post_json(
                "/v1/telemetry/ingest",
                serde_json::json!({
                    "type": "meter",
                    "meterId": "M001",
                    "kwhConsumedAc": 12.5,
                    "voltage": 240,
                    "timestamp": "2024-05-01T10:00:00Z"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, serde_json::json!({ "ok": true }));

        let live = store.meter_live("M001").await.unwrap().unwrap();
        assert_eq!(live.timestamp, datetime!(2024-05-01 10:00:00 UTC));
    }

    #[tokio::test]
    async fn invalid_reading_never_reaches_the_store() {
        let store = MemoryStore::new();
        let resp = app(&store)
            .oneshot(post_json(
                "/v1/telemetry/ingest",
                serde_json::json!({
                    "type": "vehicle",
                    "vehicleId": "V001",
                    "soc": 140,
                    "kwhDeliveredDc": 1,
                    "timestamp": "2024-05-01T10:00:00Z"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"][0], "soc must be 0-100");

        let all = TimeWindow::new(
            datetime!(2000-01-01 00:00:00 UTC),
            datetime!(2100-01-01 00:00:00 UTC),
        )
        .unwrap();
        assert!(store.vehicle_history("V001", all).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_outage_maps_to_service_unavailable() {
        let store = MemoryStore::new();
        store.fail_on(FailPoint::Begin).await;

        let resp = app(&store)
            .oneshot(post_json(
                "/v1/telemetry/ingest",
                serde_json::json!({
                    "type": "meter",
                    "meterId": "M001",
                    "kwhConsumedAc": 1,
                    "timestamp": "2024-05-01T10:00:00Z"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn mapping_then_explicit_window_performance() {
        let store = MemoryStore::new();
        let app = app(&store);

        let resp = app
            .clone()
            .oneshot(post_json(
                "/v1/analytics/vehicle-mapping",
                serde_json::json!({ "vehicleId": "V001", "meterId": "M001" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json_body(resp).await,
            serde_json::json!({ "vehicleId": "V001", "meterId": "M001" })
        );

        for body in [
            serde_json::json!({
                "type": "meter", "meterId": "M001", "kwhConsumedAc": 100,
                "voltage": 230, "timestamp": "2024-05-01T08:00:00Z"
            }),
            serde_json::json!({
                "type": "vehicle", "vehicleId": "V001", "soc": 80, "kwhDeliveredDc": 88,
                "batteryTemp": 26.5, "timestamp": "2024-05-01T09:00:00Z"
            }),
        ] {
            let resp = app
                .clone()
                .oneshot(post_json("/v1/telemetry/ingest", body))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/v1/analytics/performance/V001?from=2024-05-01T00:00:00Z&to=2024-05-02T00:00:00Z")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert_eq!(body["vehicleId"], "V001");
        assert_eq!(body["meterId"], "M001");
        assert_eq!(body["window"]["from"], "2024-05-01T00:00:00Z");
        assert_eq!(body["window"]["to"], "2024-05-02T00:00:00Z");
        assert_relative_eq!(body["kwhConsumedAc"].as_f64().unwrap(), 100.0);
        assert_relative_eq!(body["kwhDeliveredDc"].as_f64().unwrap(), 88.0);
        assert_relative_eq!(body["efficiencyRatio"].as_f64().unwrap(), 0.88);
        assert_relative_eq!(body["avgBatteryTemp"].as_f64().unwrap(), 26.5);
    }

    #[tokio::test]
    async fn unmapped_vehicle_performance_has_null_meter_and_ratio() {
        let store = MemoryStore::new();
        let resp = app(&store)
            .oneshot(
                Request::builder()
                    .uri("/v1/analytics/performance/V404")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert!(body["meterId"].is_null());
        assert!(body["efficiencyRatio"].is_null());
        assert!(body["avgBatteryTemp"].is_null());
        assert_eq!(body["kwhConsumedAc"].as_f64(), Some(0.0));
    }

    #[tokio::test]
    async fn malformed_window_bound_gets_validation_body() {
        let store = MemoryStore::new();
        let resp = app(&store)
            .oneshot(
                Request::builder()
                    .uri("/v1/analytics/performance/V001?from=yesterday&to=2024-05-02T00:00:00Z")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = json_body(resp).await;
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"].as_array().map(Vec::len), Some(1));
        assert_eq!(store.stats().await.vehicle_totals_queries, 0);
    }

    #[tokio::test]
    async fn half_specified_window_is_a_bad_request() {
        let store = MemoryStore::new();
        let resp = app(&store)
            .oneshot(
                Request::builder()
                    .uri("/v1/analytics/performance/V001?from=2024-05-01T00:00:00Z")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
