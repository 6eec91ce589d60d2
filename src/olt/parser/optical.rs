//! Optical power readings.
//!
//! ZTE answers `show pon power attenuation gpon-onu_1/B/P:ID` with one `up`
//! and one `down` row:
//!
//! ```text
//!            OLT                  ONU              Attenuation
//! --------------------------------------------------------------------
//!  up      Rx :-20.491(dbm)      Tx:2.649(dbm)        23.140(dB)
//!  down    Tx :6.644(dbm)        Rx:-17.092(dbm)      23.736(dB)
//! ```
//!
//! The `up` Rx is measured at the OLT, the `down` Rx at the ONT. Both
//! `Rx:-20.491` and `Rx :-20.491` spellings occur.
//!
//! Huawei answers `display ont optical-info <port> all` with a numeric table:
//! id, ONT Rx, ONT Tx, OLT Rx, temperature, voltage, distance.

use super::numeric::{safe_float, safe_int};
use super::{Diagnostic, Parsed, is_numeric_token, is_separator, numbered_lines};
use crate::olt::model::DeviceRecord;

/// Receive power pair for one ONU.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attenuation {
    pub olt_rx: Option<f64>,
    pub ont_rx: Option<f64>,
}

pub(crate) fn is_attenuation(raw: &str) -> bool {
    raw.lines().any(|l| {
        let l = l.trim_start();
        (l.starts_with("up") || l.starts_with("down")) && l.contains("Rx")
    })
}

pub(crate) fn is_huawei_optical(raw: &str) -> bool {
    raw.contains("OLT Rx") || (raw.contains("Rx") && raw.contains("Temperature"))
}

/// Value of the `Rx` field in a whitespace-split row.
fn rx_value(parts: &[&str]) -> Option<f64> {
    let pos = parts.iter().position(|p| p.starts_with("Rx"))?;
    let rest = parts[pos][2..].trim_start_matches(':');
    if rest.is_empty() {
        parts.get(pos + 1).and_then(|next| safe_float(next.trim_start_matches(':')))
    } else {
        safe_float(rest)
    }
}

/// Parses a ZTE attenuation reply into at most one [`Attenuation`].
pub fn parse_attenuation(raw: &str) -> Parsed<Attenuation> {
    let mut parsed = Parsed::default();
    if !is_attenuation(raw) {
        parsed.diagnose(Diagnostic::general("unrecognised attenuation output"));
        return parsed;
    }

    let mut reading = Attenuation::default();
    for (n, line) in numbered_lines(raw) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(direction) = parts.first() else {
            continue;
        };
        let slot = match *direction {
            "up" => &mut reading.olt_rx,
            "down" => &mut reading.ont_rx,
            _ => continue,
        };
        *slot = rx_value(&parts);
        if slot.is_none() {
            parsed.diagnose(Diagnostic::at(n, format!("no Rx value in '{}'", line)));
        }
    }

    parsed.records.push(reading);
    parsed
}

/// Parses the Huawei optical table into partial records for `board`/`port`.
pub fn parse_huawei_optical(raw: &str, board: &str, port: &str) -> Parsed<DeviceRecord> {
    let mut parsed = Parsed::default();
    if !is_huawei_optical(raw) {
        if !raw.trim().is_empty() {
            parsed.diagnose(Diagnostic::general("unrecognised optical-info output"));
        }
        return parsed;
    }

    for (n, line) in numbered_lines(raw) {
        if line.is_empty() || is_separator(line) || line.contains("ONT") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if !parts.first().is_some_and(|p| is_numeric_token(p)) {
            continue;
        }
        if parts.len() < 6 {
            parsed.diagnose(Diagnostic::at(n, format!("short optical row: '{}'", line)));
            continue;
        }

        let mut record = DeviceRecord::new(board, port, parts[0]);
        record.ont_rx = safe_float(parts[1]);
        record.olt_rx = safe_float(parts[3]);
        record.temperature = safe_int(parts[4]);
        record.distance = parts.get(6).and_then(|d| safe_int(d));
        parsed.records.push(record);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attenuation_compact_form() {
        let raw = "up      Rx:-20.491(dbm)      Tx:2.649(dbm)        23.140(dB)\n\
                   down    Tx:6.644(dbm)        Rx:-17.092(dbm)      23.736(dB)";
        let parsed = parse_attenuation(raw);
        assert_eq!(
            parsed.records,
            vec![Attenuation {
                olt_rx: Some(-20.491),
                ont_rx: Some(-17.092)
            }]
        );
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_attenuation_spaced_form() {
        let raw = "           OLT                  ONU              Attenuation\n\
                   ----------------------------------------------------------\n\
                   up      Rx :-20.491(dbm)      Tx:2.649(dbm)        23.140(dB)\n\
                   \n\
                   down    Tx :6.644(dbm)        Rx :-17.092(dbm)      23.736(dB)";
        let reading = parse_attenuation(raw).records[0];
        assert_eq!(reading.olt_rx, Some(-20.491));
        assert_eq!(reading.ont_rx, Some(-17.092));
    }

    #[test]
    fn test_attenuation_reparse_is_stable() {
        let raw = "up      Rx:-20.491(dbm)      Tx:2.649(dbm)        23.140(dB)\n\
                   down    Tx:6.644(dbm)        Rx:-17.092(dbm)      23.736(dB)";
        let first = parse_attenuation(raw);
        assert_eq!(first, parse_attenuation(raw));
        assert_eq!(first.records.len(), 1);
    }

    #[test]
    fn test_attenuation_missing_value() {
        let raw = "up      Rx:N/A      Tx:2.649(dbm)\ndown    Tx:6.644(dbm)   Rx:-17.092(dbm)";
        let parsed = parse_attenuation(raw);
        assert_eq!(parsed.records[0].olt_rx, None);
        assert_eq!(parsed.records[0].ont_rx, Some(-17.092));
        assert_eq!(parsed.diagnostics.len(), 1);
    }

    #[test]
    fn test_attenuation_unrecognised() {
        let parsed = parse_attenuation("%Error 20209: The ONU is offline");
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.diagnostics.len(), 1);
    }

    #[test]
    fn test_huawei_optical_table() {
        let raw = "\
  -----------------------------------------------------------------------------
  ONT    Rx       ONT      OLT Rx   Temperature  Voltage  Distance
  ID     Power    Tx Power Power    (C)          (V)      (m)
  -----------------------------------------------------------------------------
  0      -19.31   2.15     -22.45   48           3.260    1423
  1      -        -        -        -            -        -
  2      -21.00   2.01
  -----------------------------------------------------------------------------";
        let parsed = parse_huawei_optical(raw, "1", "0");
        assert_eq!(parsed.records.len(), 2);
        let first = &parsed.records[0];
        assert_eq!(first.id, "0");
        assert_eq!(first.ont_rx, Some(-19.31));
        assert_eq!(first.olt_rx, Some(-22.45));
        assert_eq!(first.temperature, Some(48));
        assert_eq!(first.distance, Some(1423));
        let second = &parsed.records[1];
        assert_eq!(second.ont_rx, None);
        assert_eq!(second.distance, None);
        assert_eq!(parsed.diagnostics.len(), 1);
    }
}
