//! Huawei `display ont info summary` output.
//!
//! Two tables follow each other: a run-state table and an SN/type table whose
//! trailing columns are the free-text description.
//!
//! ```text
//! ONT  Run     Last                Last                Last
//! ID   State   UpTime              DownTime            DownCause
//! -------------------------------------------------------------------
//! 0    online  2023-01-10 10:20:30 2023-01-09 08:00:00 dying-gasp
//! 1    offline -                   2023-01-11 12:00:00 LOS
//! -------------------------------------------------------------------
//! ONT        SN        Type          Distance Rx/Tx power  Description
//! -------------------------------------------------------------------
//! 0   48575443E6D8B69B EG8145V5      1423     -19.31/2.15  cliente juan
//! ```
//!
//! Header spacing varies between firmware releases, so headers are matched
//! after collapsing runs of whitespace.

use super::{Diagnostic, Parsed, RecordSet, is_numeric_token, is_separator, numbered_lines};
use crate::olt::model::{DeviceRecord, OntState};

const STATE_HEADERS: &[&str] = &["ONT Run Last", "ONT-ID Run-state"];
const DESCRIPTION_HEADERS: &[&str] = &["ONT SN Type", "ONT-ID SN"];

fn collapse(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn header_kind(line: &str) -> Option<Section> {
    let collapsed = collapse(line);
    if STATE_HEADERS.iter().any(|h| collapsed.starts_with(h)) {
        Some(Section::State)
    } else if DESCRIPTION_HEADERS.iter().any(|h| collapsed.starts_with(h)) {
        Some(Section::Description)
    } else {
        None
    }
}

pub(crate) fn is_summary(raw: &str) -> bool {
    raw.lines().any(|l| header_kind(l.trim()).is_some())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    State,
    Description,
}

fn is_date(token: &str) -> bool {
    let b = token.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter().enumerate().all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
}

fn is_time(token: &str) -> bool {
    let b = token.as_bytes();
    b.len() >= 8
        && b[2] == b':'
        && b[5] == b':'
        && b[..8].iter().enumerate().all(|(i, c)| i == 2 || i == 5 || c.is_ascii_digit())
}

/// Maps a Huawei run state onto [`OntState`].
pub fn run_state(value: &str) -> OntState {
    let lower = value.to_lowercase();
    match lower.as_str() {
        "online" => OntState::Online,
        "offline" => OntState::Offline,
        _ if lower.contains("dying") => OntState::DyingGasp,
        "los" => OntState::LossOfSignal,
        _ => OntState::Unknown,
    }
}

/// Reads a state row: id, run state, then date/time pairs and a cause.
///
/// The last date/time pair on the row is the last down time; the token
/// after it is the cause unless it is `-`.
fn parse_state_row(parts: &[&str], board: &str, port: &str) -> DeviceRecord {
    let mut record = DeviceRecord::new(board, port, parts[0]);
    record.state = run_state(parts[1]);

    let mut last_pair = None;
    let mut i = 2;
    while i + 1 < parts.len() {
        if is_date(parts[i]) && is_time(parts[i + 1]) {
            last_pair = Some(i);
            i += 2;
        } else {
            i += 1;
        }
    }

    if let Some(pos) = last_pair {
        record.last_down_time = Some(format!("{} {}", parts[pos], &parts[pos + 1][..8]));
        record.last_down_cause = parts
            .get(pos + 2)
            .filter(|cause| **cause != "-")
            .map(|cause| cause.to_string());
    }
    record
}

/// Description is every token after the `Rx/Tx` power column.
fn description_of(parts: &[&str]) -> Option<String> {
    let power = parts.iter().skip(1).position(|p| p.contains('/') && p.contains('-'))? + 1;
    let words = &parts[power + 1..];
    if words.is_empty() {
        None
    } else {
        Some(words.join("_"))
    }
}

/// Parses both summary tables, reconciled by ONT id.
pub fn parse_summary(raw: &str, board: &str, port: &str) -> Parsed<DeviceRecord> {
    let mut parsed = Parsed::default();
    if !is_summary(raw) {
        if !raw.trim().is_empty() {
            parsed.diagnose(Diagnostic::general("unrecognised ONT summary output"));
        }
        return parsed;
    }

    let mut set = RecordSet::new();
    let mut section = None;
    for (n, line) in numbered_lines(raw) {
        if let Some(kind) = header_kind(line) {
            section = Some(kind);
            continue;
        }
        if line.is_empty() || is_separator(line) {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if !is_numeric_token(parts[0]) {
            continue;
        }

        match section {
            Some(Section::State) => {
                if parts.len() < 2 {
                    parsed.diagnose(Diagnostic::at(n, format!("short state row: '{}'", line)));
                    continue;
                }
                set.merge(parse_state_row(&parts, board, port));
            }
            Some(Section::Description) => {
                if parts.len() < 6 {
                    parsed.diagnose(Diagnostic::at(n, format!("short description row: '{}'", line)));
                    continue;
                }
                let mut record = DeviceRecord::new(board, port, parts[0]);
                record.description = description_of(&parts);
                if !set.enrich(&record) {
                    parsed.diagnose(Diagnostic::at(
                        n,
                        format!("description for unknown ONT {}", parts[0]),
                    ));
                }
            }
            None => {}
        }
    }

    parsed.records = set.into_records();
    parsed
}
