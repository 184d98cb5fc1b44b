//! UpsSource trait and the parsed UPS snapshot.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SampleError;

pub mod apcupsd;
pub mod parser;

pub use apcupsd::ApcupsdClient;

/// Status string apcupsd reports while the UPS is running from battery.
pub const STATUS_ON_BATTERY: &str = "ONBATT";

/// One parsed UPS status reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: String,
    pub battery_charge_pct: f64,
    pub load_pct: f64,
    pub time_left_minutes: f64,
    pub line_voltage: f64,
    pub battery_voltage: f64,
}

impl Snapshot {
    /// Build a snapshot from the raw apcupsd key/value map.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, SampleError> {
        Ok(Self {
            status: required(fields, "STATUS")?.trim().to_string(),
            battery_charge_pct: parser::parse_number(fields, "BCHARGE")?,
            load_pct: parser::parse_number(fields, "LOADPCT")?,
            time_left_minutes: parser::parse_number(fields, "TIMELEFT")?,
            line_voltage: parser::parse_number(fields, "LINEV")?,
            battery_voltage: parser::parse_number(fields, "BATTV")?,
        })
    }

    pub fn on_battery(&self) -> bool {
        self.status == STATUS_ON_BATTERY
    }
}

fn required<'a>(fields: &'a BTreeMap<String, String>, key: &'static str) -> Result<&'a str, SampleError> {
    fields
        .get(key)
        .map(|v| v.as_str())
        .ok_or(SampleError::MissingField(key))
}

#[async_trait]
pub trait UpsSource: Send + Sync {
    /// Query the UPS daemon once and return every reported key/value pair.
    async fn status_fields(&self) -> Result<BTreeMap<String, String>, SampleError>;

    /// Query the UPS daemon once and parse the six monitored fields.
    async fn sample(&self) -> Result<Snapshot, SampleError> {
        let fields = self.status_fields().await?;
        Snapshot::from_fields(&fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn snapshot_from_unit_suffixed_fields() {
        let snapshot = Snapshot::from_fields(&fields(&[
            ("STATUS", "ONLINE "),
            ("BCHARGE", "100.0 Percent"),
            ("LOADPCT", "12.0 Percent"),
            ("TIMELEFT", "48.5 Minutes"),
            ("LINEV", "121.0 Volts"),
            ("BATTV", "13.6 Volts"),
        ]))
        .unwrap();

        assert_eq!(snapshot.status, "ONLINE");
        assert_eq!(snapshot.battery_charge_pct, 100.0);
        assert_eq!(snapshot.time_left_minutes, 48.5);
        assert_eq!(snapshot.battery_voltage, 13.6);
        assert!(!snapshot.on_battery());
    }

    #[test]
    fn missing_field_is_a_sample_error() {
        let err = Snapshot::from_fields(&fields(&[
            ("STATUS", "ONBATT"),
            ("BCHARGE", "50.0"),
            ("LOADPCT", "10.0"),
            ("TIMELEFT", "20.0"),
            ("LINEV", "0.0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SampleError::MissingField("BATTV")));
    }
}
