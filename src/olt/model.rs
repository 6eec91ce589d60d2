//! Records returned to callers.
//!
//! Optional fields are `Option` and always serialized, so a missing value
//! shows up as `null` rather than an absent key.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::olt::parser::Diagnostic;

/// Operational state of an ONT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OntState {
    Online,
    Offline,
    Disabled,
    DyingGasp,
    LossOfSignal,
    Unknown,
}

impl OntState {
    pub fn is_online(self) -> bool {
        self == OntState::Online
    }
}

/// One ONT/ONU registered on a PON port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceRecord {
    pub id: String,
    pub board: String,
    pub port: String,
    pub state: OntState,
    /// Receive power at the ONT, dBm.
    pub ont_rx: Option<f64>,
    /// Receive power at the OLT, dBm.
    pub olt_rx: Option<f64>,
    pub temperature: Option<i64>,
    /// Fiber distance in meters.
    pub distance: Option<i64>,
    pub description: Option<String>,
    pub last_down_time: Option<String>,
    pub last_down_cause: Option<String>,
}

impl DeviceRecord {
    /// A record with every optional field unset and an unknown state.
    pub fn new(board: impl Into<String>, port: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            board: board.into(),
            port: port.into(),
            state: OntState::Unknown,
            ont_rx: None,
            olt_rx: None,
            temperature: None,
            distance: None,
            description: None,
            last_down_time: None,
            last_down_cause: None,
        }
    }

    /// Copies every populated attribute of `other` onto `self`.
    ///
    /// Unknown state and `None` fields in `other` never erase known values.
    pub fn enrich(&mut self, other: &DeviceRecord) {
        if other.state != OntState::Unknown {
            self.state = other.state;
        }
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        take(&mut self.ont_rx, &other.ont_rx);
        take(&mut self.olt_rx, &other.olt_rx);
        take(&mut self.temperature, &other.temperature);
        take(&mut self.distance, &other.distance);
        take(&mut self.description, &other.description);
        take(&mut self.last_down_time, &other.last_down_time);
        take(&mut self.last_down_cause, &other.last_down_cause);
    }
}

/// PON technology generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PonType {
    #[serde(rename = "GPON")]
    Gpon,
    #[serde(rename = "XG-PON")]
    XgPon,
}

/// An unregistered ONT seen by the OLT's discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AutofindRecord {
    pub serial_number: String,
    pub board: String,
    pub port: String,
    pub pon_type: PonType,
    /// Index exactly as the device printed it.
    pub index: String,
    pub vendor_id: Option<String>,
    pub equipment_id: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ScanStats {
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub total: usize,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub online: usize,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub offline: usize,
}

impl ScanStats {
    pub fn from_records(records: &[DeviceRecord]) -> Self {
        let total = records.len();
        let online = records.iter().filter(|r| r.state.is_online()).count();
        Self {
            total,
            online,
            offline: total - online,
        }
    }
}

/// One registration period from the ONT's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HistoryEntry {
    pub index: String,
    pub up_time: Option<String>,
    pub down_time: Option<String>,
    pub cause: Option<String>,
    /// The period is still open.
    pub online: bool,
}

/// Basic information block plus registration history of one ONT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OntDetail {
    pub board: String,
    pub port: String,
    pub id: String,
    pub info_lines: Vec<String>,
    pub history: Vec<HistoryEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of a search by serial number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SerialMatch {
    pub interface: String,
    pub record: DeviceRecord,
    pub serial_number: Option<String>,
    pub onu_type: Option<String>,
    pub name: Option<String>,
    pub admin_state: Option<String>,
    pub phase_state: Option<String>,
    pub online_duration: Option<String>,
    /// False when a follow-up query failed and only the location is known.
    pub complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_serializes_every_field() {
        let record = DeviceRecord::new("2", "3", "1");
        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "id",
            "board",
            "port",
            "state",
            "ont_rx",
            "olt_rx",
            "temperature",
            "distance",
            "description",
            "last_down_time",
            "last_down_cause",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert!(object["ont_rx"].is_null());
        assert_eq!(object["state"], "unknown");
    }

    #[test]
    fn test_enrich_keeps_known_values() {
        let mut base = DeviceRecord::new("2", "3", "1");
        base.state = OntState::Online;
        base.description = Some("cliente".to_string());

        let mut optical = DeviceRecord::new("2", "3", "1");
        optical.olt_rx = Some(-20.491);

        base.enrich(&optical);
        assert_eq!(base.state, OntState::Online);
        assert_eq!(base.description.as_deref(), Some("cliente"));
        assert_eq!(base.olt_rx, Some(-20.491));
    }

    #[test]
    fn test_stats() {
        let mut a = DeviceRecord::new("1", "1", "1");
        a.state = OntState::Online;
        let b = DeviceRecord::new("1", "1", "2");
        let stats = ScanStats::from_records(&[a, b]);
        assert_eq!(stats, ScanStats { total: 2, online: 1, offline: 1 });
    }

    #[test]
    fn test_pon_type_names() {
        assert_eq!(serde_json::to_string(&PonType::XgPon).unwrap(), "\"XG-PON\"");
        assert_eq!(serde_json::to_string(&PonType::Gpon).unwrap(), "\"GPON\"");
    }
}
