//! Serializable response types for the OLT MCP tools.
//!
//! Records, scan reports and details are returned as the engine produces
//! them; the types here wrap them with the caller id and counts.

use schemars::JsonSchema;
use serde::Serialize;

use crate::olt::model::{AutofindRecord, DeviceRecord};
use crate::olt::parser::{Diagnostic, Parsed};
use crate::olt::pool::SessionInfo;
use crate::olt::vendor::Vendor;
use crate::olt::workflow::{WorkflowOutcome, WorkflowState};

#[derive(Debug, Serialize, JsonSchema)]
pub struct OltSessionResponse {
    /// Caller id to pass to every other tool
    pub caller_id: String,
    pub message: String,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct OltDisconnectResponse {
    pub caller_id: String,
    /// False when no session was registered for the caller
    pub disconnected: bool,
    pub message: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ActiveSessionsResponse {
    /// Number of sessions in the registry, connected or not
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub count: usize,
    /// Vendor profile the server was started with
    pub vendor: Vendor,
}

/// ONT records for one PON port.
#[derive(Debug, Serialize, JsonSchema)]
pub struct OltRecordsResponse {
    pub caller_id: String,
    pub interface: String,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub count: usize,
    pub records: Vec<DeviceRecord>,
    /// Lines the parsers skipped
    pub diagnostics: Vec<Diagnostic>,
}

impl OltRecordsResponse {
    pub fn new(caller_id: &str, board: u32, port: u32, parsed: Parsed<DeviceRecord>) -> Self {
        Self {
            caller_id: caller_id.to_string(),
            interface: format!("{}/{}", board, port),
            count: parsed.records.len(),
            records: parsed.records,
            diagnostics: parsed.diagnostics,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct OltAutofindResponse {
    pub caller_id: String,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub count: usize,
    pub records: Vec<AutofindRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl OltAutofindResponse {
    pub fn new(caller_id: &str, parsed: Parsed<AutofindRecord>) -> Self {
        Self {
            caller_id: caller_id.to_string(),
            count: parsed.records.len(),
            records: parsed.records,
            diagnostics: parsed.diagnostics,
        }
    }
}

/// Result of a committed provisioning workflow.
#[derive(Debug, Serialize, JsonSchema)]
pub struct OltWorkflowResponse {
    pub caller_id: String,
    pub state: WorkflowState,
    /// Commands applied to the device, in order
    pub commands_executed: Vec<String>,
    pub message: String,
}

impl OltWorkflowResponse {
    pub fn new(caller_id: &str, message: String, outcome: WorkflowOutcome) -> Self {
        Self {
            caller_id: caller_id.to_string(),
            state: outcome.state,
            commands_executed: outcome.commands_executed,
            message,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct OltNextOnuIdResponse {
    pub interface: String,
    /// Lowest ONU id not configured on the port
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub onu_id: u8,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct OltVendorResponse {
    pub configured: Vendor,
    pub detected: Vendor,
    /// Whether the configured profile matches the device
    pub matches: bool,
}

#[cfg(test)]
mod response_serialization {
    use super::*;
    use crate::olt::model::OntState;

    mod records_response {
        use super::*;

        #[test]
        fn test_counts_and_interface() {
            let mut record = DeviceRecord::new("2", "3", "1");
            record.state = OntState::Online;
            let parsed = Parsed {
                records: vec![record],
                diagnostics: vec![Diagnostic::at(4, "unrecognised row")],
            };

            let response = OltRecordsResponse::new("caller-1", 2, 3, parsed);
            assert_eq!(response.interface, "2/3");
            assert_eq!(response.count, 1);

            let json = serde_json::to_value(&response).unwrap();
            assert_eq!(json["records"][0]["state"], "online");
            assert_eq!(json["diagnostics"][0]["line"], 4);
        }

        #[test]
        fn test_missing_values_serialize_as_null() {
            let parsed = Parsed {
                records: vec![DeviceRecord::new("1", "1", "7")],
                diagnostics: Vec::new(),
            };
            let json = serde_json::to_value(OltRecordsResponse::new("c", 1, 1, parsed)).unwrap();
            assert!(json["records"][0]["ont_rx"].is_null());
            assert!(json["records"][0]["description"].is_null());
        }
    }

    mod workflow_response {
        use super::*;

        #[test]
        fn test_committed_state_is_tagged() {
            let outcome = WorkflowOutcome {
                state: WorkflowState::Committed,
                commands_executed: vec!["interface gpon-olt_1/2/3".to_string(), "write".to_string()],
            };
            let response = OltWorkflowResponse::new("caller-1", "done".to_string(), outcome);
            let json = serde_json::to_value(&response).unwrap();

            assert_eq!(json["state"]["state"], "committed");
            assert_eq!(json["commands_executed"].as_array().map(Vec::len), Some(2));
            assert_eq!(json["caller_id"], "caller-1");
        }
    }

    mod vendor_response {
        use super::*;

        #[test]
        fn test_vendor_is_lowercase() {
            let response = OltVendorResponse {
                configured: Vendor::Zte,
                detected: Vendor::Huawei,
                matches: false,
            };
            let json = serde_json::to_string(&response).unwrap();
            assert!(json.contains("\"configured\":\"zte\""));
            assert!(json.contains("\"detected\":\"huawei\""));
        }
    }
}
