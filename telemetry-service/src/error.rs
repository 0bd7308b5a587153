use telemetry_client::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    /// Request rejected before reaching the ingestion or analytics core.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TelemetryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }
}
