//! ZTE `show gpon onu state` table.
//!
//! ```text
//! OnuIndex          Admin State  OMCC State  O7 State   Phase State
//! ----------------------------------------------------------------
//! gpon-onu_1/2/3:1  enable       enable      operation  working
//! gpon-onu_1/2/3:2  enable       disable     unknown    DyingGasp
//! ```

use tracing::debug;

use super::index::{ONU_PREFIX, find_onu_index};
use super::{Diagnostic, Parsed, numbered_lines};
use crate::olt::model::{DeviceRecord, OntState};

/// Maps the admin / O7 / phase columns onto a single state.
pub fn classify(admin: &str, o7: &str, phase: &str) -> OntState {
    let phase_lower = phase.to_lowercase();
    if admin.eq_ignore_ascii_case("disable") {
        OntState::Disabled
    } else if phase_lower == "working" && o7.eq_ignore_ascii_case("operation") {
        OntState::Online
    } else if phase_lower.contains("dying") {
        OntState::DyingGasp
    } else if phase_lower == "los" {
        OntState::LossOfSignal
    } else if matches!(phase_lower.as_str(), "offline" | "down" | "failed" | "syncmib" | "logging") {
        OntState::Offline
    } else {
        debug!("Unrecognised ONU state admin={} o7={} phase={}", admin, o7, phase);
        OntState::Offline
    }
}

/// Parses the state table for `board`/`port`.
///
/// Any line starting with an ONU index is a row, so a bare row without the
/// header parses too. The description is left `None`; it comes from the
/// detail query.
pub fn parse_onu_state(raw: &str, board: &str, port: &str) -> Parsed<DeviceRecord> {
    let mut parsed = Parsed::default();
    if !raw.contains(ONU_PREFIX) {
        if !raw.trim().is_empty() && !raw.contains("OnuIndex") {
            parsed.diagnose(Diagnostic::general("unrecognised ONU state output"));
        }
        return parsed;
    }

    for (n, line) in numbered_lines(raw) {
        if !line.starts_with(ONU_PREFIX) {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            parsed.diagnose(Diagnostic::at(n, format!("short state row: '{}'", line)));
            continue;
        }
        let Some(index) = find_onu_index(parts[0]) else {
            parsed.diagnose(Diagnostic::at(n, format!("bad ONU index '{}'", parts[0])));
            continue;
        };
        let Some(id) = index.id else {
            continue;
        };

        let phase = parts.get(4).copied().unwrap_or("unknown");
        let mut record = DeviceRecord::new(board, port, id);
        record.state = classify(parts[1], parts[3], phase);
        parsed.records.push(record);
    }

    parsed
}
