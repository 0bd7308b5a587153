use serde::Serialize;

use super::TimeWindow;

/// Efficiency of one vehicle over a window, correlating DC energy delivered
/// to it with AC energy drawn by its mapped meter.
///
/// Quantities are carried as `Decimal` up to this point and converted to
/// `f64` only here, at the output boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub vehicle_id: String,
    pub meter_id: Option<String>,
    pub window: TimeWindow,
    pub kwh_consumed_ac: f64,
    pub kwh_delivered_dc: f64,
    pub efficiency_ratio: Option<f64>,
    pub avg_battery_temp: Option<f64>,
}
