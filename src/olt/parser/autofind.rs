//! Unregistered ONT discovery output.
//!
//! ZTE `show gpon onu uncfg` prints a table:
//!
//! ```text
//! OnuIndex                 Sn                  State
//! ---------------------------------------------------------------------
//! gpon-onu_1/1/5:2         HWTC00FFF039        unknown
//! ```
//!
//! Huawei `display ont autofind all` prints one key/value block per ONT:
//!
//! ```text
//! Number              : 1
//! F/S/P               : 0/1/0
//! Ont SN              : 48575443E6D8B69B (HWTC-E6D8B69B)
//! VendorID            : HWTC
//! Ont EquipmentID     : EG8145V5
//! ```

use std::collections::HashSet;

use super::index::{ONU_PREFIX, parse_fsp};
use super::{Diagnostic, OutputShape, Parsed, detect_shape, is_separator, numbered_lines};
use crate::olt::model::{AutofindRecord, PonType};

const XG_PON_VENDORS: &[&str] = &["HWTX", "ZTEX"];
const MIN_SERIAL_LEN: usize = 8;

pub(crate) fn is_table(raw: &str) -> bool {
    raw.contains("OnuIndex")
        && raw.contains(ONU_PREFIX)
        && !raw.contains("Admin State")
        && !raw.contains("Phase")
}

/// PON generation implied by the vendor prefix of a serial.
///
/// Known 10G vendors map to XG-PON; everything else, including the common
/// GPON vendors (HWTC, GPTF, MONU, VSOL, ZTEG, ALCL, D031...), is GPON.
pub fn pon_type_for_serial(serial: &str) -> PonType {
    let vendor = serial.get(..4).map(str::to_uppercase).unwrap_or_default();
    if XG_PON_VENDORS.contains(&vendor.as_str()) {
        PonType::XgPon
    } else {
        PonType::Gpon
    }
}

/// Upper-cases and strips everything but ASCII alphanumerics.
pub fn normalize_serial(serial: &str) -> String {
    serial
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Readable serial from a Huawei `Ont SN` value.
///
/// Prefers the parenthesised `(HWTC-E6D8B69B)` form; a bare 16-digit hex
/// serial has its first four bytes decoded as the vendor id.
fn huawei_serial(value: &str) -> String {
    if let Some(start) = value.find('(')
        && let Some(end) = value[start..].find(')')
    {
        return normalize_serial(&value[start + 1..start + end]);
    }

    let hex = normalize_serial(value.split_whitespace().next().unwrap_or_default());
    if hex.len() == 16 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        let vendor: Option<String> = (0..4)
            .map(|i| u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok().map(char::from))
            .collect();
        if let Some(vendor) = vendor.filter(|v| v.chars().all(|c| c.is_ascii_alphanumeric())) {
            return format!("{}{}", vendor, &hex[8..]);
        }
    }
    hex
}

fn parse_table_row(line: &str) -> Result<AutofindRecord, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(format!("short autofind row: '{}'", line));
    }
    let index = parse_fsp(&parts[0][ONU_PREFIX.len()..])
        .ok_or_else(|| format!("bad ONU index '{}'", parts[0]))?;
    let serial = parts[1].to_string();
    if serial.len() < MIN_SERIAL_LEN {
        return Err(format!("serial too short: '{}'", serial));
    }

    Ok(AutofindRecord {
        pon_type: pon_type_for_serial(&serial),
        vendor_id: serial.get(..4).map(str::to_string),
        board: index.board,
        port: index.port,
        index: parts[0].to_string(),
        state: Some(parts.get(2).copied().unwrap_or("unknown").to_string()),
        equipment_id: None,
        serial_number: serial,
    })
}

fn parse_table(raw: &str, parsed: &mut Parsed<AutofindRecord>) {
    for (n, line) in numbered_lines(raw) {
        if !line.starts_with(ONU_PREFIX) {
            continue;
        }
        match parse_table_row(line) {
            Ok(record) => parsed.records.push(record),
            Err(message) => parsed.diagnose(Diagnostic::at(n, message)),
        }
    }
}

#[derive(Default)]
struct Block {
    first_line: usize,
    number: Option<String>,
    fsp: Option<String>,
    serial: Option<String>,
    vendor_id: Option<String>,
    equipment_id: Option<String>,
}

impl Block {
    fn into_record(self) -> Result<AutofindRecord, String> {
        let fsp = self.fsp.ok_or("block without F/S/P")?;
        let index = parse_fsp(&fsp).ok_or_else(|| format!("bad F/S/P '{}'", fsp))?;
        let serial = self.serial.ok_or("block without Ont SN")?;
        if serial.len() < MIN_SERIAL_LEN {
            return Err(format!("serial too short: '{}'", serial));
        }

        Ok(AutofindRecord {
            pon_type: pon_type_for_serial(&serial),
            board: index.board,
            port: index.port,
            index: self.number.unwrap_or(fsp),
            vendor_id: self.vendor_id.or_else(|| serial.get(..4).map(str::to_string)),
            equipment_id: self.equipment_id,
            state: None,
            serial_number: serial,
        })
    }
}

fn parse_blocks(raw: &str, parsed: &mut Parsed<AutofindRecord>) {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;

    for (n, line) in numbered_lines(raw) {
        if line.is_empty() || is_separator(line) {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let value = (!value.is_empty()).then(|| value.to_string());

        match key.trim() {
            "Number" => {
                blocks.extend(current.take());
                current = Some(Block {
                    first_line: n,
                    number: value,
                    ..Block::default()
                });
            }
            key => {
                let Some(block) = current.as_mut() else {
                    continue;
                };
                match key {
                    "F/S/P" => block.fsp = value,
                    "Ont SN" => block.serial = value.map(|v| huawei_serial(&v)),
                    "VendorID" => block.vendor_id = value,
                    "Ont EquipmentID" => block.equipment_id = value,
                    _ => {}
                }
            }
        }
    }
    blocks.extend(current);

    for block in blocks {
        let line = block.first_line;
        match block.into_record() {
            Ok(record) => parsed.records.push(record),
            Err(message) => parsed.diagnose(Diagnostic::at(line, message)),
        }
    }
}

/// Parses either discovery format; duplicates by serial are dropped.
pub fn parse_autofind(raw: &str) -> Parsed<AutofindRecord> {
    let mut parsed = Parsed::default();
    match detect_shape(raw) {
        OutputShape::HuaweiAutofindBlocks => parse_blocks(raw, &mut parsed),
        // Some firmware prints bare rows without the header.
        OutputShape::ZteAutofindTable | OutputShape::ZteOnuState => parse_table(raw, &mut parsed),
        _ => {
            if !raw.trim().is_empty() && !raw.contains("OnuIndex") {
                parsed.diagnose(Diagnostic::general("unrecognised autofind output"));
            }
            return parsed;
        }
    }

    let mut seen = HashSet::new();
    parsed.records.retain(|r| seen.insert(r.serial_number.clone()));
    parsed
}
