//! JSON Schema helpers for MCP-compliant schemas.
//!
//! Generates standard JSON Schema without Rust-specific formats like "uint"
//! that LLMs may not understand correctly.

use schemars::Schema;
use schemars::json_schema;

/// Unsigned integer schema: `{"type": "integer", "minimum": 0}`
///
/// Use with `#[schemars(schema_with = "crate::mcp::schema::uint")]` on unsigned fields.
pub fn uint(_generator: &mut schemars::SchemaGenerator) -> Schema {
    json_schema!({
        "type": "integer",
        "minimum": 0
    })
}

/// Nullable variant of [`uint`] for `Option<usize>` fields.
pub fn optional_uint(_generator: &mut schemars::SchemaGenerator) -> Schema {
    json_schema!({
        "type": ["integer", "null"],
        "minimum": 0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::{JsonSchema, SchemaGenerator};

    fn schema_json<T: JsonSchema>() -> String {
        let schema = SchemaGenerator::default().into_root_schema_for::<T>();
        serde_json::to_string(&schema).expect("Failed to serialize schema")
    }

    #[test]
    fn test_uint_schema_structure() {
        let mut generator = SchemaGenerator::default();
        let schema = uint(&mut generator);

        let json = serde_json::to_value(&schema).expect("Failed to serialize schema");

        assert_eq!(json.get("type"), Some(&serde_json::json!("integer")));
        assert_eq!(json.get("minimum"), Some(&serde_json::json!(0)));
        assert!(json.get("format").is_none(), "Should not have format field");
    }

    #[test]
    fn test_optional_uint_allows_null() {
        let mut generator = SchemaGenerator::default();
        let json = serde_json::to_value(optional_uint(&mut generator)).expect("Failed to serialize schema");

        assert_eq!(json.get("type"), Some(&serde_json::json!(["integer", "null"])));
        assert!(json.get("format").is_none());
    }

    #[test]
    fn test_active_sessions_response_schema_no_uint() {
        let json_str = schema_json::<crate::mcp::types::ActiveSessionsResponse>();
        assert!(
            !json_str.contains("\"uint"),
            "ActiveSessionsResponse schema should not contain 'uint' format: {}",
            json_str
        );
    }

    #[test]
    fn test_session_response_schema_no_uint() {
        let json_str = schema_json::<crate::mcp::types::OltSessionResponse>();
        assert!(
            !json_str.contains("\"uint"),
            "OltSessionResponse schema should not contain 'uint' format: {}",
            json_str
        );
    }

    #[test]
    fn test_records_response_schema_no_uint() {
        let json_str = schema_json::<crate::mcp::types::OltRecordsResponse>();
        assert!(
            !json_str.contains("\"uint"),
            "OltRecordsResponse schema should not contain 'uint' format: {}",
            json_str
        );
    }

    #[test]
    fn test_scan_report_schema_no_uint() {
        let json_str = schema_json::<crate::olt::service::ScanReport>();
        assert!(
            !json_str.contains("\"uint"),
            "ScanReport schema should not contain 'uint' format: {}",
            json_str
        );
    }

    #[test]
    fn test_workflow_response_schema_no_uint() {
        let json_str = schema_json::<crate::mcp::types::OltWorkflowResponse>();
        assert!(
            !json_str.contains("\"uint"),
            "OltWorkflowResponse schema should not contain 'uint' format: {}",
            json_str
        );
    }

    #[test]
    fn test_next_onu_id_response_schema_no_uint() {
        let json_str = schema_json::<crate::mcp::types::OltNextOnuIdResponse>();
        assert!(
            !json_str.contains("\"uint"),
            "OltNextOnuIdResponse schema should not contain 'uint' format: {}",
            json_str
        );
    }
}
