//! Vendor interface index strings.
//!
//! ZTE addresses an ONU as `gpon-onu_<frame>/<board>/<port>:<id>` and a PON
//! line as `gpon-olt_<frame>/<board>/<port>`; Huawei uses a bare
//! `<frame>/<slot>/<port>` triple.

use std::fmt;

pub const ONU_PREFIX: &str = "gpon-onu_";
pub const OLT_PREFIX: &str = "gpon-olt_";

/// Decomposed `frame/board/port[:id]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OnuIndex {
    pub frame: String,
    pub board: String,
    pub port: String,
    pub id: Option<String>,
}

impl fmt::Display for OnuIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.frame, self.board, self.port)?;
        if let Some(id) = &self.id {
            write!(f, ":{}", id)?;
        }
        Ok(())
    }
}

fn is_number(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Parses `F/S/P` or `F/S/P:ID`.
pub fn parse_fsp(value: &str) -> Option<OnuIndex> {
    let (fsp, id) = match value.split_once(':') {
        Some((fsp, id)) => (fsp, Some(id)),
        None => (value, None),
    };
    let mut parts = fsp.split('/');
    let (frame, board, port) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || ![frame, board, port].iter().all(|p| is_number(p)) {
        return None;
    }
    if let Some(id) = id
        && !is_number(id)
    {
        return None;
    }
    Some(OnuIndex {
        frame: frame.to_string(),
        board: board.to_string(),
        port: port.to_string(),
        id: id.map(str::to_string),
    })
}

/// Finds and parses a `gpon-onu_F/S/P:ID` token anywhere in `text`.
pub fn find_onu_index(text: &str) -> Option<OnuIndex> {
    let start = text.find(ONU_PREFIX)? + ONU_PREFIX.len();
    let token: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '/' || *c == ':')
        .collect();
    parse_fsp(&token).filter(|index| index.id.is_some())
}

pub fn onu_interface(board: u8, port: u8, id: u8) -> String {
    format!("{}1/{}/{}:{}", ONU_PREFIX, board, port, id)
}

pub fn olt_interface(board: u8, port: u8) -> String {
    format!("{}1/{}/{}", OLT_PREFIX, board, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fsp_with_id() {
        let index = parse_fsp("1/2/3:14").unwrap();
        assert_eq!(index.board, "2");
        assert_eq!(index.port, "3");
        assert_eq!(index.id.as_deref(), Some("14"));
    }

    #[test]
    fn test_parse_fsp_without_id() {
        let index = parse_fsp("0/1/0").unwrap();
        assert_eq!(index.frame, "0");
        assert_eq!(index.id, None);
    }

    #[test]
    fn test_parse_fsp_rejects_garbage() {
        assert!(parse_fsp("1/2").is_none());
        assert!(parse_fsp("1/2/3/4").is_none());
        assert!(parse_fsp("1/x/3").is_none());
        assert!(parse_fsp("1/2/3:").is_none());
    }

    #[test]
    fn test_find_onu_index_in_line() {
        let index = find_onu_index("  gpon-onu_1/1/16:1   ").unwrap();
        assert_eq!(index.to_string(), "1/1/16:1");
    }

    #[test]
    fn test_find_onu_index_requires_id() {
        assert!(find_onu_index("gpon-onu_1/1/16").is_none());
        assert!(find_onu_index("no index here").is_none());
    }

    #[test]
    fn test_interface_names() {
        assert_eq!(onu_interface(2, 3, 1), "gpon-onu_1/2/3:1");
        assert_eq!(olt_interface(2, 3), "gpon-olt_1/2/3");
    }
}
