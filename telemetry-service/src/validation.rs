//! Request-layer validation. Everything past this module trusts its inputs.

use rust_decimal::Decimal;
use serde::Deserialize;
use telemetry_client::domain::{MeterReading, TimeWindow, VehicleMeterMapping, VehicleReading};
use time::OffsetDateTime;

use crate::{error::TelemetryError, ingest::Telemetry};

const MAX_VOLTAGE: Decimal = Decimal::ONE_THOUSAND;
const MAX_SOC: Decimal = Decimal::ONE_HUNDRED;

// Column scales of the reading tables; finer values would be rounded on insert.
const ENERGY_SCALE: u32 = 4;
const MEASUREMENT_SCALE: u32 = 2;

fn check_scale(errors: &mut Vec<String>, field: &str, value: Decimal, max_scale: u32) {
    if value.normalize().scale() > max_scale {
        errors.push(format!("{field} allows at most {max_scale} decimal places"));
    }
}

/// Ingestion body, discriminated by its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IngestRequest {
    Meter(MeterTelemetry),
    Vehicle(VehicleTelemetry),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterTelemetry {
    pub meter_id: String,
    pub kwh_consumed_ac: Decimal,
    #[serde(default)]
    pub voltage: Option<Decimal>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleTelemetry {
    pub vehicle_id: String,
    pub soc: Decimal,
    pub kwh_delivered_dc: Decimal,
    #[serde(default)]
    pub battery_temp: Option<Decimal>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRequest {
    pub vehicle_id: String,
    pub meter_id: String,
}

/// Rules:
/// - meterId must be non-empty.
/// - kwhConsumedAc must be non-negative, with at most 4 decimal places.
/// - voltage, when present, must be within [0, 1000], with at most 2 decimal places.
pub fn validate_meter(t: MeterTelemetry) -> Result<MeterReading, TelemetryError> {
    let mut errors = Vec::new();

    if t.meter_id.trim().is_empty() {
        errors.push("meterId must not be empty".to_string());
    }
    if t.kwh_consumed_ac < Decimal::ZERO {
        errors.push("kwhConsumedAc must be non-negative".to_string());
    }
    check_scale(&mut errors, "kwhConsumedAc", t.kwh_consumed_ac, ENERGY_SCALE);
    if let Some(v) = t.voltage {
        if v < Decimal::ZERO || v > MAX_VOLTAGE {
            errors.push("voltage must be between 0 and 1000".to_string());
        }
        check_scale(&mut errors, "voltage", v, MEASUREMENT_SCALE);
    }

    if !errors.is_empty() {
        return Err(TelemetryError::Validation(errors));
    }

    Ok(MeterReading {
        meter_id: t.meter_id,
        kwh_consumed_ac: t.kwh_consumed_ac,
        voltage: t.voltage,
        timestamp: t.timestamp,
    })
}

/// Rules:
/// - vehicleId must be non-empty.
/// - soc must be within [0, 100].
/// - kwhDeliveredDc must be non-negative.
/// - soc and batteryTemp carry at most 2 decimal places, kwhDeliveredDc at most 4.
pub fn validate_vehicle(t: VehicleTelemetry) -> Result<VehicleReading, TelemetryError> {
    let mut errors = Vec::new();

    if t.vehicle_id.trim().is_empty() {
        errors.push("vehicleId must not be empty".to_string());
    }
    if t.soc < Decimal::ZERO || t.soc > MAX_SOC {
        errors.push("soc must be 0-100".to_string());
    }
    if t.kwh_delivered_dc < Decimal::ZERO {
        errors.push("kwhDeliveredDc must be non-negative".to_string());
    }
    check_scale(&mut errors, "soc", t.soc, MEASUREMENT_SCALE);
    check_scale(&mut errors, "kwhDeliveredDc", t.kwh_delivered_dc, ENERGY_SCALE);
    if let Some(temp) = t.battery_temp {
        check_scale(&mut errors, "batteryTemp", temp, MEASUREMENT_SCALE);
    }

    if !errors.is_empty() {
        return Err(TelemetryError::Validation(errors));
    }

    Ok(VehicleReading {
        vehicle_id: t.vehicle_id,
        soc: t.soc,
        kwh_delivered_dc: t.kwh_delivered_dc,
        battery_temp: t.battery_temp,
        timestamp: t.timestamp,
    })
}

/// Parse and validate a raw ingestion body.
pub fn parse_ingest_body(body: &[u8]) -> Result<Telemetry, TelemetryError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| TelemetryError::validation(format!("malformed JSON body: {e}")))?;

    match value.get("type").and_then(serde_json::Value::as_str) {
        Some("meter") | Some("vehicle") => {}
        _ => {
            metrics::counter!("validation_rejected_total", "kind" => "unknown").increment(1);
            return Err(TelemetryError::validation(
                "type must be either \"meter\" or \"vehicle\"",
            ));
        }
    }

    let request: IngestRequest = serde_json::from_value(value)
        .map_err(|e| TelemetryError::validation(e.to_string()))?;

    let res = match request {
        IngestRequest::Meter(t) => validate_meter(t).map(Telemetry::Meter),
        IngestRequest::Vehicle(t) => validate_vehicle(t).map(Telemetry::Vehicle),
    };

    if let Err(TelemetryError::Validation(errors)) = &res {
        metrics::counter!("validation_rejected_total", "kind" => "reading").increment(1);
        tracing::debug!(?errors, "telemetry rejected");
    }
    res
}

pub fn parse_mapping_body(body: &[u8]) -> Result<VehicleMeterMapping, TelemetryError> {
    let req: MappingRequest = serde_json::from_slice(body)
        .map_err(|e| TelemetryError::validation(format!("malformed mapping body: {e}")))?;

    let mut errors = Vec::new();
    if req.vehicle_id.trim().is_empty() {
        errors.push("vehicleId must not be empty".to_string());
    }
    if req.meter_id.trim().is_empty() {
        errors.push("meterId must not be empty".to_string());
    }
    if !errors.is_empty() {
        return Err(TelemetryError::Validation(errors));
    }

    Ok(VehicleMeterMapping::new(req.vehicle_id, req.meter_id))
}

/// An explicit window needs both ends; with neither the caller falls back to
/// the trailing window.
pub fn window_from_bounds(
    from: Option<OffsetDateTime>,
    to: Option<OffsetDateTime>,
) -> Result<Option<TimeWindow>, TelemetryError> {
    match (from, to) {
        (None, None) => Ok(None),
        (Some(from), Some(to)) => TimeWindow::new(from, to)
            .map(Some)
            .map_err(|e| TelemetryError::validation(e.to_string())),
        _ => Err(TelemetryError::validation(
            "from and to must be given together",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn errors_of(res: Result<Telemetry, TelemetryError>) -> Vec<String> {
        match res {
            Err(TelemetryError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn meter_body_is_parsed_into_reading() {
        let body = br#"{"type":"meter","meterId":"M001","kwhConsumedAc":12.5,"voltage":240,"timestamp":"2024-05-01T10:00:00Z"}"#;

        match parse_ingest_body(body).unwrap() {
            Telemetry::Meter(r) => {
                assert_eq!(r.meter_id, "M001");
                assert_eq!(r.kwh_consumed_ac, dec!(12.5));
                assert_eq!(r.voltage, Some(dec!(240)));
                assert_eq!(r.timestamp, datetime!(2024-05-01 10:00:00 UTC));
            }
            other => panic!("expected meter telemetry, got {other:?}"),
        }
    }

    #[test]
    fn vehicle_body_without_battery_temp_is_accepted() {
        let body = br#"{"type":"vehicle","vehicleId":"V002","soc":55.5,"kwhDeliveredDc":50,"timestamp":"2024-05-01T10:00:00+02:00"}"#;

        match parse_ingest_body(body).unwrap() {
            Telemetry::Vehicle(r) => {
                assert_eq!(r.vehicle_id, "V002");
                assert_eq!(r.battery_temp, None);
                assert_eq!(r.timestamp, datetime!(2024-05-01 08:00:00 UTC));
            }
            other => panic!("expected vehicle telemetry, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let body = br#"{"type":"inverter","timestamp":"2024-05-01T10:00:00Z"}"#;
        assert_eq!(
            errors_of(parse_ingest_body(body)),
            vec!["type must be either \"meter\" or \"vehicle\"".to_string()]
        );
    }

    #[test]
    fn out_of_range_meter_fields_are_all_reported() {
        let body = br#"{"type":"meter","meterId":"","kwhConsumedAc":-1,"voltage":1000.5,"timestamp":"2024-05-01T10:00:00Z"}"#;
        let errors = errors_of(parse_ingest_body(body));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn soc_above_hundred_is_rejected() {
        let body = br#"{"type":"vehicle","vehicleId":"V001","soc":100.01,"kwhDeliveredDc":1,"timestamp":"2024-05-01T10:00:00Z"}"#;
        assert_eq!(errors_of(parse_ingest_body(body)), vec!["soc must be 0-100".to_string()]);
    }

    #[test]
    fn precision_beyond_column_scale_is_rejected() {
        let body = br#"{"type":"meter","meterId":"M001","kwhConsumedAc":1.23456,"voltage":230.125,"timestamp":"2024-05-01T10:00:00Z"}"#;
        assert_eq!(
            errors_of(parse_ingest_body(body)),
            vec![
                "kwhConsumedAc allows at most 4 decimal places".to_string(),
                "voltage allows at most 2 decimal places".to_string(),
            ]
        );

        let body = br#"{"type":"vehicle","vehicleId":"V001","soc":50,"kwhDeliveredDc":1,"batteryTemp":24.125,"timestamp":"2024-05-01T10:00:00Z"}"#;
        assert_eq!(
            errors_of(parse_ingest_body(body)),
            vec!["batteryTemp allows at most 2 decimal places".to_string()]
        );
    }

    #[test]
    fn trailing_zeros_do_not_count_against_scale() {
        let body = br#"{"type":"meter","meterId":"M001","kwhConsumedAc":"1.500000","timestamp":"2024-05-01T10:00:00Z"}"#;
        match parse_ingest_body(body).unwrap() {
            Telemetry::Meter(r) => assert_eq!(r.kwh_consumed_ac, dec!(1.5)),
            other => panic!("expected meter telemetry, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_timestamp_is_rejected() {
        let body = br#"{"type":"meter","meterId":"M001","kwhConsumedAc":1,"timestamp":"yesterday"}"#;
        assert_eq!(errors_of(parse_ingest_body(body)).len(), 1);
    }

    #[test]
    fn boundary_values_are_accepted() {
        let body = br#"{"type":"meter","meterId":"M001","kwhConsumedAc":0,"voltage":1000,"timestamp":"2024-05-01T10:00:00Z"}"#;
        assert!(parse_ingest_body(body).is_ok());

        let body = br#"{"type":"vehicle","vehicleId":"V001","soc":0,"kwhDeliveredDc":0,"timestamp":"2024-05-01T10:00:00Z"}"#;
        assert!(parse_ingest_body(body).is_ok());
    }

    #[test]
    fn mapping_requires_both_ids() {
        let res = parse_mapping_body(br#"{"vehicleId":"V001","meterId":" "}"#);
        assert!(matches!(res, Err(TelemetryError::Validation(ref e)) if e.len() == 1));

        let ok = parse_mapping_body(br#"{"vehicleId":"V001","meterId":"M001"}"#).unwrap();
        assert_eq!(ok, VehicleMeterMapping::new("V001", "M001"));
    }

    #[test]
    fn half_open_window_bounds_are_rejected() {
        let from = Some(datetime!(2024-05-01 00:00:00 UTC));
        assert!(window_from_bounds(from, None).is_err());
        assert!(window_from_bounds(None, None).unwrap().is_none());
        assert!(window_from_bounds(from, Some(datetime!(2024-04-30 00:00:00 UTC))).is_err());
    }
}
