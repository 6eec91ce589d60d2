//! ZTE running configuration of a PON port.
//!
//! `show run interface gpon-olt_1/B/P` lists one `onu <id> type <type> sn <sn>`
//! line per registered ONU.

use std::collections::BTreeSet;

use super::numbered_lines;

/// Highest ONU id a ZTE GPON port accepts.
pub const MAX_ONU_ID: u8 = 128;

/// Ids of every `onu N type ...` line.
pub fn parse_used_onu_ids(raw: &str) -> BTreeSet<u8> {
    numbered_lines(raw)
        .filter(|(_, line)| line.starts_with("onu ") && line.contains(" type "))
        .filter_map(|(_, line)| line.split_whitespace().nth(1)?.parse().ok())
        .collect()
}

/// Lowest id in `1..=128` not present in `used`.
pub fn lowest_free_id(used: &BTreeSet<u8>) -> Option<u8> {
    (1..=MAX_ONU_ID).find(|id| !used.contains(id))
}
