//! Per-ONT detail output.
//!
//! ZTE `show gpon onu detail-info gpon-onu_1/B/P:ID` is a `Key: value` block
//! starting at `ONU interface:` followed by a registration history table:
//!
//! ```text
//! ONU interface:          gpon-onu_1/2/3:1
//!   Name:                 cliente_juan
//!   Phase state:          working
//!   Serial number:        ZTEGC8AB1234
//!   ONU Distance:         1423m
//! ------------------------------------------
//!    Authpass Time          OfflineTime             Cause
//!    1   2025-10-17 08:27:34    2025-10-18 06:02:46     DyingGasp
//!    2   2025-10-18 06:03:40    0000-00-00 00:00:00
//! ```
//!
//! An all-zero offline time marks the period that is still open.
//!
//! Huawei splits the same data over `display ont info <port> <id>` (basic
//! lines from `F/S/P` to `Global ONT-ID`) and `display ont register-info`
//! (one `Index`/`UpTime`/`DownTime`/`DownCause` block per period).

use super::numeric::leading_digits;
use super::{Diagnostic, Parsed, is_numeric_token, is_separator, numbered_lines};
use crate::olt::model::{HistoryEntry, OntState};

const ZTE_INFO_START: &str = "ONU interface:";
const ZTE_HISTORY_MARKERS: &[&str] = &["Authpass Time", "OfflineTime"];
const ZERO_DATE: &str = "0000-00-00";
const MAX_DESCRIPTION_LEN: usize = 100;

/// Key/value fields of a ZTE detail-info block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZteDetail {
    pub interface: Option<String>,
    pub name: Option<String>,
    pub onu_type: Option<String>,
    pub admin_state: Option<String>,
    pub phase_state: Option<String>,
    pub state: Option<OntState>,
    pub serial_number: Option<String>,
    pub description: Option<String>,
    pub distance: Option<i64>,
    pub online_duration: Option<String>,
}

/// Maps a ZTE phase state onto [`OntState`].
pub fn phase_state(value: &str) -> OntState {
    if value == "working" {
        OntState::Online
    } else if value.eq_ignore_ascii_case("dyinggasp") {
        OntState::DyingGasp
    } else if value.eq_ignore_ascii_case("los") {
        OntState::LossOfSignal
    } else {
        OntState::Offline
    }
}

fn is_history_header(line: &str) -> bool {
    ZTE_HISTORY_MARKERS.iter().any(|m| line.contains(m))
}

pub fn parse_zte_detail(raw: &str) -> Parsed<ZteDetail> {
    if !raw.contains(ZTE_INFO_START) {
        return Parsed::empty_with(Diagnostic::general("no ONU interface block in detail output"));
    }

    let mut detail = ZteDetail::default();
    for (_, line) in numbered_lines(raw) {
        if is_history_header(line) {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let owned = Some(value.to_string());
        match key.trim() {
            "ONU interface" => detail.interface = owned,
            "Name" => detail.name = owned,
            "Type" => detail.onu_type = owned,
            "Admin state" => detail.admin_state = owned,
            "Phase state" => {
                detail.state = Some(phase_state(value));
                detail.phase_state = owned;
            }
            "Serial number" => detail.serial_number = owned,
            "Description" => detail.description = owned,
            "ONU Distance" => detail.distance = leading_digits(value),
            "Online Duration" => detail.online_duration = owned,
            _ => {}
        }
    }

    Parsed {
        records: vec![detail],
        diagnostics: Vec::new(),
    }
}

/// Short label for scan listings: the name, else the description capped at
/// 100 characters.
pub fn scan_description(raw: &str) -> Option<String> {
    let detail = parse_zte_detail(raw).records.pop()?;
    if detail.name.is_some() {
        return detail.name;
    }
    detail.description.map(|d| {
        if d.chars().count() > MAX_DESCRIPTION_LEN {
            let head: String = d.chars().take(MAX_DESCRIPTION_LEN - 3).collect();
            format!("{}...", head)
        } else {
            d
        }
    })
}

/// Basic information lines of a ZTE detail-info reply.
pub fn zte_info_lines(raw: &str) -> Vec<String> {
    numbered_lines(raw)
        .skip_while(|(_, line)| !line.contains(ZTE_INFO_START))
        .take_while(|(_, line)| !is_history_header(line))
        .filter(|(_, line)| !line.is_empty() && !is_separator(line))
        .map(|(_, line)| line.to_string())
        .collect()
}

/// Registration history rows of a ZTE detail-info reply.
pub fn parse_zte_history(raw: &str) -> Parsed<HistoryEntry> {
    let mut parsed = Parsed::default();
    let mut in_table = false;

    for (n, line) in numbered_lines(raw) {
        if line.contains("Authpass Time") {
            in_table = true;
            continue;
        }
        if !in_table || line.is_empty() || is_separator(line) {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if !is_numeric_token(parts[0]) {
            continue;
        }
        if parts.len() < 3 {
            parsed.diagnose(Diagnostic::at(n, format!("short history row: '{}'", line)));
            continue;
        }

        let up_time = Some(format!("{} {}", parts[1], parts[2]));
        let closed = parts.len() >= 5 && parts[3] != ZERO_DATE;
        let entry = if closed {
            let cause = parts[5..].join(" ");
            HistoryEntry {
                index: parts[0].to_string(),
                up_time,
                down_time: Some(format!("{} {}", parts[3], parts[4])),
                cause: (!cause.is_empty()).then_some(cause),
                online: false,
            }
        } else {
            HistoryEntry {
                index: parts[0].to_string(),
                up_time,
                down_time: None,
                cause: None,
                online: true,
            }
        };
        parsed.records.push(entry);
    }

    if !in_table {
        parsed.diagnose(Diagnostic::general("no registration history in output"));
    }
    parsed
}

/// Basic lines of a Huawei `display ont info` reply, `F/S/P` through
/// `Global ONT-ID`.
pub fn huawei_info_lines(raw: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut started = false;

    for (_, line) in numbered_lines(raw) {
        if line.is_empty() {
            continue;
        }
        if !started && line.contains("F/S/P") && line.contains(':') {
            started = true;
        }
        if !started {
            continue;
        }
        if is_separator(line) {
            if lines.len() > 5 {
                break;
            }
            continue;
        }
        lines.push(line.to_string());
        if line.contains("Global ONT-ID") && line.contains(':') {
            break;
        }
    }
    lines
}

#[derive(Default)]
struct RegisterBlock {
    index: String,
    up_time: Option<String>,
    down_time: Option<String>,
    down_cause: Option<String>,
}

impl From<RegisterBlock> for HistoryEntry {
    fn from(block: RegisterBlock) -> Self {
        let online = block.down_time.is_none();
        HistoryEntry {
            index: block.index,
            up_time: block.up_time,
            down_time: block.down_time,
            cause: if online { None } else { block.down_cause },
            online,
        }
    }
}

/// Huawei `display ont register-info` blocks.
pub fn parse_huawei_register_info(raw: &str) -> Parsed<HistoryEntry> {
    let mut parsed = Parsed::default();
    let mut current: Option<RegisterBlock> = None;

    for (_, line) in numbered_lines(raw) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let known = (!value.is_empty() && value != "-").then(|| value.to_string());

        match key.trim() {
            "Index" => {
                if let Some(block) = current.take() {
                    parsed.records.push(block.into());
                }
                current = Some(RegisterBlock {
                    index: value.to_string(),
                    ..RegisterBlock::default()
                });
            }
            "UpTime" => {
                if let Some(block) = current.as_mut() {
                    block.up_time = known;
                }
            }
            "DownTime" => {
                if let Some(block) = current.as_mut() {
                    block.down_time = known;
                }
            }
            "DownCause" => {
                if let Some(block) = current.as_mut() {
                    block.down_cause = known;
                }
            }
            _ => {}
        }
    }
    if let Some(block) = current {
        parsed.records.push(block.into());
    }

    if parsed.records.is_empty() && !raw.trim().is_empty() {
        parsed.diagnose(Diagnostic::general("no register-info blocks in output"));
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZTE_DETAIL: &str = "\
ONU interface:          gpon-onu_1/2/3:1
  Name:                 cliente_juan
  Type:                 ZTE-F660
  State:                ready
  Admin state:          enable
  Phase state:          working
  Serial number:        ZTEGC8AB1234
  Password:
  Description:          cliente juan perez
  ONU Distance:         1423m
  Online Duration:      3h 12m 5s
------------------------------------------
   Authpass Time          OfflineTime             Cause
   1   2025-10-17 08:27:34    2025-10-18 06:02:46     DyingGasp
   2   2025-10-18 06:03:40    0000-00-00 00:00:00
------------------------------------------";

    mod zte {
        use super::*;

        #[test]
        fn test_fields() {
            let detail = parse_zte_detail(ZTE_DETAIL).records.remove(0);
            assert_eq!(detail.interface.as_deref(), Some("gpon-onu_1/2/3:1"));
            assert_eq!(detail.name.as_deref(), Some("cliente_juan"));
            assert_eq!(detail.onu_type.as_deref(), Some("ZTE-F660"));
            assert_eq!(detail.state, Some(OntState::Online));
            assert_eq!(detail.serial_number.as_deref(), Some("ZTEGC8AB1234"));
            assert_eq!(detail.distance, Some(1423));
            assert_eq!(detail.online_duration.as_deref(), Some("3h 12m 5s"));
        }

        #[test]
        fn test_missing_block() {
            let parsed = parse_zte_detail("%Error 20209: The ONU does not exist");
            assert!(parsed.records.is_empty());
            assert_eq!(parsed.diagnostics.len(), 1);
        }

        #[test]
        fn test_phase_states() {
            assert_eq!(phase_state("DyingGasp"), OntState::DyingGasp);
            assert_eq!(phase_state("LOS"), OntState::LossOfSignal);
            assert_eq!(phase_state("syncmib"), OntState::Offline);
        }

        #[test]
        fn test_info_lines_stop_at_history() {
            let lines = zte_info_lines(ZTE_DETAIL);
            assert_eq!(lines.first().map(String::as_str), Some("ONU interface:          gpon-onu_1/2/3:1"));
            assert_eq!(lines.last().map(String::as_str), Some("Online Duration:      3h 12m 5s"));
            assert!(lines.iter().all(|l| !l.starts_with("--")));
        }

        #[test]
        fn test_history() {
            let parsed = parse_zte_history(ZTE_DETAIL);
            assert_eq!(parsed.records.len(), 2);
            assert_eq!(
                parsed.records[0],
                HistoryEntry {
                    index: "1".to_string(),
                    up_time: Some("2025-10-17 08:27:34".to_string()),
                    down_time: Some("2025-10-18 06:02:46".to_string()),
                    cause: Some("DyingGasp".to_string()),
                    online: false,
                }
            );
            assert!(parsed.records[1].online);
            assert_eq!(parsed.records[1].down_time, None);
        }

        #[test]
        fn test_scan_description_prefers_name() {
            assert_eq!(scan_description(ZTE_DETAIL).as_deref(), Some("cliente_juan"));
        }

        #[test]
        fn test_scan_description_truncates() {
            let long = "x".repeat(150);
            let raw = format!("ONU interface: gpon-onu_1/2/3:1\n  Description: {}", long);
            let description = scan_description(&raw).unwrap();
            assert_eq!(description.len(), 100);
            assert!(description.ends_with("..."));
        }
    }

    mod huawei {
        use super::*;

        const INFO: &str = "\
  -----------------------------------------------------------------------------
  F/S/P                   : 0/1/0
  ONT-ID                  : 0
  Control flag            : active
  Run state               : online
  Config state            : normal
  Match state             : match
  Description             : cliente juan
  Global ONT-ID           : 12
  -----------------------------------------------------------------------------
  Line profile ID      : 10";

        const REGISTER: &str = "\
  ------------------------------------------------------------------------
  Index             : 1
  Auth-type         : SN-auth
  UpTime            : 2023-01-10 10:20:30+08:00
  DownTime          : 2023-01-11 11:00:00+08:00
  DownCause         : dying-gasp
  ------------------------------------------------------------------------
  Index             : 2
  UpTime            : 2023-01-11 11:05:00+08:00
  DownTime          : -
  DownCause         : -
  ------------------------------------------------------------------------";

        #[test]
        fn test_info_lines() {
            let lines = huawei_info_lines(INFO);
            assert_eq!(lines.len(), 8);
            assert!(lines[0].starts_with("F/S/P"));
            assert!(lines[7].starts_with("Global ONT-ID"));
        }

        #[test]
        fn test_register_info() {
            let parsed = parse_huawei_register_info(REGISTER);
            assert_eq!(parsed.records.len(), 2);
            assert_eq!(parsed.records[0].cause.as_deref(), Some("dying-gasp"));
            assert!(!parsed.records[0].online);
            assert_eq!(parsed.records[0].up_time.as_deref(), Some("2023-01-10 10:20:30+08:00"));
            assert!(parsed.records[1].online);
            assert_eq!(parsed.records[1].cause, None);
        }
    }
}
