use serde::{Deserialize, Serialize};

/// Which meter feeds the charger of a vehicle. At most one per vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VehicleMeterMapping {
    pub vehicle_id: String,
    pub meter_id: String,
}

impl VehicleMeterMapping {
    pub fn new(vehicle_id: impl Into<String>, meter_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            meter_id: meter_id.into(),
        }
    }
}
