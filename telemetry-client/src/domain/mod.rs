pub mod mapping;
pub mod meter_reading;
pub mod performance;
pub mod vehicle_reading;
pub mod window;

pub use mapping::VehicleMeterMapping;
pub use meter_reading::{MeterHistoryRow, MeterReading, MeterWindowTotals};
pub use performance::PerformanceSummary;
pub use vehicle_reading::{VehicleHistoryRow, VehicleReading, VehicleWindowTotals};
pub use window::{TimeWindow, WindowError};
