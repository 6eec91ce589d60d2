//! Output parser engine.
//!
//! Turns free-form CLI text into typed records. The engine is stateless and
//! never fails: every entry point returns [`Parsed`], a (possibly empty)
//! record list plus [`Diagnostic`]s for whatever it had to skip.
//!
//! # Pipeline
//!
//! 1. **Shape detection** ([`detect_shape`]): marker substrings classify a
//!    payload into one of the known [`OutputShape`]s. Entry points that take
//!    several shapes ([`parse_port_records`],
//!    [`autofind::parse_autofind`]) dispatch on it. Unknown payloads yield
//!    no records and one diagnostic.
//! 2. **Tolerant parsing**: one parser per shape, line or block oriented. A
//!    short or malformed line is skipped with a diagnostic; numbers go
//!    through [`numeric`] and come back as `None` rather than an error.
//! 3. **Reconciliation** ([`RecordSet`]): separate commands (state table,
//!    optical table, description table) each fill part of the same
//!    [`DeviceRecord`](crate::olt::model::DeviceRecord). They are merged by
//!    id, never overwritten wholesale.
//!
//! # Shapes
//!
//! | Shape | Vendor | Markers |
//! |-------|--------|---------|
//! | `ZteOnuState` | ZTE | `gpon-onu_` rows with admin/OMCC/O7/phase columns |
//! | `ZteAttenuation` | ZTE | rows starting `up` / `down` with `Rx` |
//! | `ZteAutofindTable` | ZTE | `OnuIndex` and `gpon-onu_` |
//! | `HuaweiAutofindBlocks` | Huawei | `Number:` and `F/S/P:` blocks |
//! | `HuaweiSummary` | Huawei | `Run` state header or `SN  Type` header |
//! | `HuaweiOptical` | Huawei | `Rx optical power` style header, numeric rows |
//! | `ZteDetail` | ZTE | `ONU interface:` key/value block |

pub mod autofind;
pub mod detail;
pub mod index;
pub mod numeric;
pub mod optical;
pub mod running;
pub mod state;
pub mod summary;

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::olt::model::DeviceRecord;

/// Something a parser skipped or could not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Diagnostic {
    /// 1-based line number in the raw payload, when the problem is line-local.
    #[schemars(schema_with = "crate::mcp::schema::optional_uint")]
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            line: None,
            message: message.into(),
        }
    }
}

/// Records plus diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

impl<T> Parsed<T> {
    pub fn empty_with(diagnostic: Diagnostic) -> Self {
        Self {
            records: Vec::new(),
            diagnostics: vec![diagnostic],
        }
    }

    pub fn diagnose(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn absorb_diagnostics<U>(&mut self, other: Parsed<U>) -> Vec<U> {
        self.diagnostics.extend(other.diagnostics);
        other.records
    }
}

/// Known payload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    ZteOnuState,
    ZteAttenuation,
    ZteAutofindTable,
    HuaweiAutofindBlocks,
    HuaweiSummary,
    HuaweiOptical,
    ZteDetail,
    Unknown,
}

/// Classifies a payload by its marker substrings.
///
/// Order matters: the autofind table also contains `gpon-onu_` rows, so its
/// `OnuIndex` + `Sn` header is checked before the generic state table.
pub fn detect_shape(raw: &str) -> OutputShape {
    if raw.contains("ONU interface:") {
        return OutputShape::ZteDetail;
    }
    if raw.contains("Number") && raw.contains("F/S/P") {
        return OutputShape::HuaweiAutofindBlocks;
    }
    if summary::is_summary(raw) {
        return OutputShape::HuaweiSummary;
    }
    if autofind::is_table(raw) {
        return OutputShape::ZteAutofindTable;
    }
    if raw.contains(index::ONU_PREFIX) {
        return OutputShape::ZteOnuState;
    }
    if optical::is_attenuation(raw) {
        return OutputShape::ZteAttenuation;
    }
    if optical::is_huawei_optical(raw) {
        return OutputShape::HuaweiOptical;
    }
    OutputShape::Unknown
}

/// Parses a per-port listing into device records, picking the parser by shape.
///
/// Accepts the ZTE state table and the Huawei summary and optical tables.
/// Empty output and a bare ZTE header mean an empty port, not a problem.
pub fn parse_port_records(raw: &str, board: &str, port: &str) -> Parsed<DeviceRecord> {
    match detect_shape(raw) {
        OutputShape::ZteOnuState => state::parse_onu_state(raw, board, port),
        OutputShape::HuaweiSummary => summary::parse_summary(raw, board, port),
        OutputShape::HuaweiOptical => optical::parse_huawei_optical(raw, board, port),
        OutputShape::Unknown if raw.trim().is_empty() || raw.contains("OnuIndex") => Parsed::default(),
        shape => Parsed::empty_with(Diagnostic::general(format!(
            "unrecognised port listing ({:?})",
            shape
        ))),
    }
}

/// Device records of one query batch, merged by id.
#[derive(Debug, Default, Clone)]
pub struct RecordSet {
    records: Vec<DeviceRecord>,
    by_id: HashMap<String, usize>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new record or enriches the existing one with the same id.
    pub fn merge(&mut self, record: DeviceRecord) {
        match self.by_id.get(&record.id) {
            Some(&idx) => self.records[idx].enrich(&record),
            None => {
                self.by_id.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Enriches an existing record only; returns false when the id is unknown.
    pub fn enrich(&mut self, record: &DeviceRecord) -> bool {
        match self.by_id.get(&record.id) {
            Some(&idx) => {
                self.records[idx].enrich(record);
                true
            }
            None => false,
        }
    }

    pub fn into_records(self) -> Vec<DeviceRecord> {
        self.records
    }
}

/// Trimmed lines with their 1-based line numbers.
pub(crate) fn numbered_lines(raw: &str) -> impl Iterator<Item = (usize, &str)> {
    raw.lines().enumerate().map(|(i, l)| (i + 1, l.trim()))
}

pub(crate) fn is_separator(line: &str) -> bool {
    line.starts_with("--") || line.starts_with("==")
}

pub(crate) fn is_numeric_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::olt::model::OntState;

    mod shape_detection {
        use super::*;

        #[test]
        fn test_zte_state() {
            let raw = "OnuIndex   Admin State  OMCC State  O7 State  Phase State\n\
                       ---------------------------------------------------------\n\
                       gpon-onu_1/2/3:1  enable  enable  operation  working";
            assert_eq!(detect_shape(raw), OutputShape::ZteOnuState);
        }

        #[test]
        fn test_zte_autofind() {
            let raw = "OnuIndex                 Sn                  State\n\
                       ---------------------------------------------------\n\
                       gpon-onu_1/1/5:2   HWTC00FFF039   unknown";
            assert_eq!(detect_shape(raw), OutputShape::ZteAutofindTable);
        }

        #[test]
        fn test_attenuation() {
            let raw = "           OLT                  ONU              Attenuation\n\
                       up      Rx:-20.491(dbm)      Tx:2.649(dbm)        23.140(dB)\n\
                       down    Tx:6.644(dbm)        Rx:-17.092(dbm)      23.736(dB)";
            assert_eq!(detect_shape(raw), OutputShape::ZteAttenuation);
        }

        #[test]
        fn test_unknown() {
            assert_eq!(detect_shape("% Unknown command."), OutputShape::Unknown);
            assert_eq!(detect_shape(""), OutputShape::Unknown);
        }
    }

    mod port_records {
        use super::*;

        const ZTE_STATE: &str = "\
OnuIndex          Admin State  OMCC State  O7 State   Phase State
----------------------------------------------------------------
gpon-onu_1/2/3:1  enable       enable      operation  working";

        #[test]
        fn test_zte_state_table() {
            let parsed = parse_port_records(ZTE_STATE, "2", "3");
            assert_eq!(parsed.records.len(), 1);
            assert_eq!(parsed.records[0].state, OntState::Online);
            assert!(parsed.diagnostics.is_empty());
        }

        #[test]
        fn test_huawei_summary() {
            let raw = "ONT  Run     Last                Last                Last\n\
                       ID   State   UpTime              DownTime            DownCause\n\
                       0    online  2023-01-10 10:20:30 2023-01-09 08:00:00 dying-gasp";
            let parsed = parse_port_records(raw, "2", "3");
            assert_eq!(parsed.records.len(), 1);
            assert_eq!(parsed.records[0].id, "0");
        }

        #[test]
        fn test_empty_port_is_quiet() {
            assert_eq!(parse_port_records("", "2", "3"), Parsed::default());
            let header = "OnuIndex   Admin State  OMCC State  O7 State  Phase State\n--------";
            assert_eq!(parse_port_records(header, "2", "3"), Parsed::default());
        }

        #[test]
        fn test_foreign_output_is_diagnosed() {
            let parsed = parse_port_records("% Unknown command.", "2", "3");
            assert!(parsed.records.is_empty());
            assert_eq!(parsed.diagnostics.len(), 1);

            let attenuation = " up      Rx:-20.491(dbm)      Tx:2.649(dbm)        23.140(dB)";
            let parsed = parse_port_records(attenuation, "2", "3");
            assert!(parsed.diagnostics[0].message.contains("ZteAttenuation"));
        }

        #[test]
        fn test_same_output_parses_identically() {
            assert_eq!(
                parse_port_records(ZTE_STATE, "2", "3"),
                parse_port_records(ZTE_STATE, "2", "3")
            );
        }
    }

    mod reconciliation {
        use super::*;

        #[test]
        fn test_merge_by_id() {
            let mut set = RecordSet::new();
            let mut state = DeviceRecord::new("2", "3", "1");
            state.state = OntState::Online;
            set.merge(state);

            let mut optical = DeviceRecord::new("2", "3", "1");
            optical.ont_rx = Some(-17.1);
            set.merge(optical);

            set.merge(DeviceRecord::new("2", "3", "2"));

            let records = set.into_records();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].state, OntState::Online);
            assert_eq!(records[0].ont_rx, Some(-17.1));
        }

        #[test]
        fn test_enrich_ignores_unknown_ids() {
            let mut set = RecordSet::new();
            set.merge(DeviceRecord::new("2", "3", "1"));
            assert!(!set.enrich(&DeviceRecord::new("2", "3", "9")));
            assert_eq!(set.into_records().len(), 1);
        }
    }
}
