pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics_server;
pub mod observability;
pub mod validation;

pub use analytics::PerformanceAggregator;
pub use error::TelemetryError;
pub use ingest::{IngestionCoordinator, Telemetry};
