//! MCP OLT Commands implementation.
//!
//! Each tool is a thin adapter over [`OntService`]:
//!
//! - `olt_get_session`: register a caller (connects lazily on first command)
//! - `olt_disconnect_session`, `olt_active_sessions`, `olt_session_info`
//! - `olt_query_records`, `olt_quick_scan`, `olt_ont_details`: per-port queries
//! - `olt_query_autofind`, `olt_search_by_serial`, `olt_next_onu_id`: discovery
//! - `olt_authorize`, `olt_delete`: provisioning workflows
//! - `olt_detect_vendor`: classify the device from its version banner
//!
//! Failures are returned as strings prefixed with the error kind
//! (`transport`, `protocol`, `device`, `validation`).

use std::sync::Arc;

use poem_mcpserver::{Tools, content::Text, tool::StructuredContent};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::types::{
    ActiveSessionsResponse, OltAutofindResponse, OltDisconnectResponse, OltNextOnuIdResponse,
    OltRecordsResponse, OltSessionResponse, OltVendorResponse, OltWorkflowResponse,
};
use crate::olt::error::OltError;
use crate::olt::model::OntDetail;
use crate::olt::pool::SessionInfo;
use crate::olt::service::{AuthorizeRequest, OntService, ScanReport, SerialSearch};
use crate::olt::workflow::WorkflowError;

fn tool_error(err: OltError) -> String {
    error!("[{}] {}", err.caller_id(), err);
    format!("{} error: {}", err.kind(), err)
}

fn workflow_error(err: WorkflowError) -> String {
    error!("[{}] {}", err.source.caller_id(), err);
    format!("{} error: {}", err.source.kind(), err)
}

fn resolve_caller_id(caller_id: Option<String>) -> String {
    caller_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// MCP OLT Commands tool implementation.
///
/// Every tool that talks to the device takes the `caller_id` returned by
/// `olt_get_session`; one caller maps to one pooled CLI session.
#[derive(Clone)]
pub struct McpOltCommands {
    service: Arc<OntService>,
}

impl McpOltCommands {
    pub fn new(service: Arc<OntService>) -> Self {
        Self { service }
    }
}

#[Tools]
impl McpOltCommands {
    /// Register a caller with the session pool.
    ///
    /// Returns the caller_id to use with every other tool. No SSH connection
    /// is opened until the first command runs. Idle sessions are reaped after
    /// OLT_MAX_IDLE_SECS.
    async fn olt_get_session(
        &self,
        /// Optional caller ID to reuse; a new one is generated when omitted
        caller_id: Option<String>,
    ) -> Result<StructuredContent<OltSessionResponse>, String> {
        let caller_id = resolve_caller_id(caller_id);
        let session = self.service.get_session(&caller_id).map_err(tool_error)?;
        let message = if session.connected == Some(true) {
            format!("Reusing connected session for '{}'", caller_id)
        } else {
            format!(
                "Session registered for '{}' ({} profile); it connects on first use",
                caller_id,
                self.service.vendor()
            )
        };
        Ok(StructuredContent(OltSessionResponse {
            caller_id,
            message,
            session,
        }))
    }

    /// Close a caller's session after unwinding it to the top-level prompt.
    async fn olt_disconnect_session(
        &self,
        /// Caller ID to disconnect
        caller_id: String,
    ) -> StructuredContent<OltDisconnectResponse> {
        let disconnected = self.service.disconnect_session(&caller_id).await;
        let message = if disconnected {
            format!("Session for '{}' disconnected", caller_id)
        } else {
            format!("No session registered for '{}'", caller_id)
        };
        StructuredContent(OltDisconnectResponse {
            caller_id,
            disconnected,
            message,
        })
    }

    /// Number of sessions currently held by the pool.
    async fn olt_active_sessions(&self) -> StructuredContent<ActiveSessionsResponse> {
        StructuredContent(ActiveSessionsResponse {
            count: self.service.active_session_count(),
            vendor: self.service.vendor(),
        })
    }

    /// Diagnostic view of one session: timestamps, idle time, connect
    /// attempts, last error and current CLI mode.
    async fn olt_session_info(
        &self,
        /// Caller ID to inspect
        caller_id: String,
    ) -> Result<StructuredContent<SessionInfo>, String> {
        self.service
            .session_info(&caller_id)
            .map(StructuredContent)
            .ok_or_else(|| format!("No session registered for '{}'", caller_id))
    }

    /// State and optical power of every ONT on a PON port.
    async fn olt_query_records(
        &self,
        /// Caller ID from olt_get_session
        caller_id: String,
        /// Board (slot) number, 1-17
        board: u32,
        /// PON port number, 0-16
        port: u32,
    ) -> Result<StructuredContent<OltRecordsResponse>, String> {
        let parsed = self
            .service
            .query_records(&caller_id, board, port)
            .await
            .map_err(tool_error)?;
        Ok(StructuredContent(OltRecordsResponse::new(
            &caller_id, board, port, parsed,
        )))
    }

    /// Unregistered ONTs seen by the OLT's discovery.
    async fn olt_query_autofind(
        &self,
        /// Caller ID from olt_get_session
        caller_id: String,
    ) -> Result<StructuredContent<OltAutofindResponse>, String> {
        let parsed = self
            .service
            .query_autofind(&caller_id)
            .await
            .map_err(tool_error)?;
        Ok(StructuredContent(OltAutofindResponse::new(&caller_id, parsed)))
    }

    /// State listing of a PON port with online/offline totals.
    ///
    /// With `include_descriptions` each ONT's name is fetched with an extra
    /// query per ONT, which is slow on full ports.
    async fn olt_quick_scan(
        &self,
        /// Caller ID from olt_get_session
        caller_id: String,
        /// Board (slot) number, 1-17
        board: u32,
        /// PON port number, 0-16
        port: u32,
        /// Fetch a short description per ONT (default: false)
        include_descriptions: Option<bool>,
    ) -> Result<StructuredContent<ScanReport>, String> {
        self.service
            .quick_scan(&caller_id, board, port, include_descriptions.unwrap_or(false))
            .await
            .map(StructuredContent)
            .map_err(tool_error)
    }

    /// Provision an ONU and save the configuration.
    ///
    /// The configuration is saved only when every step succeeds. On failure
    /// the error lists the commands already applied; those are NOT undone on
    /// the device.
    #[allow(clippy::too_many_arguments)]
    async fn olt_authorize(
        &self,
        /// Caller ID from olt_get_session
        caller_id: String,
        /// Board (slot) number, 1-17
        board: u32,
        /// PON port number, 0-16
        port: u32,
        /// ONU id to assign, 1-128 (see olt_next_onu_id)
        onu_id: u32,
        /// ONU serial number, e.g. "ZTEGC8AB1234"
        serial_number: String,
        /// ONU type as configured on the OLT, e.g. "ZTE-F660"
        onu_type: String,
        /// Service VLAN, 1-4094
        vlan: u32,
        /// "routing" or "bridging"
        mode: String,
        /// Subscriber name written to the ONU description
        name: Option<String>,
        /// Zone label, recorded in the logs only
        zone: Option<String>,
    ) -> Result<StructuredContent<OltWorkflowResponse>, String> {
        let request = AuthorizeRequest {
            board,
            port,
            onu_id,
            serial_number,
            onu_type,
            vlan,
            zone,
            name,
            mode,
        };
        let outcome = self
            .service
            .authorize(&caller_id, &request)
            .await
            .map_err(workflow_error)?;
        info!("[{}] ONU {} authorized on {}/{}", caller_id, onu_id, board, port);
        let message = format!(
            "ONU {} ({}) authorized on {}/{}",
            onu_id, request.serial_number, board, port
        );
        Ok(StructuredContent(OltWorkflowResponse::new(
            &caller_id, message, outcome,
        )))
    }

    /// Remove an ONU registration and save the configuration.
    async fn olt_delete(
        &self,
        /// Caller ID from olt_get_session
        caller_id: String,
        /// Board (slot) number, 1-17
        board: u32,
        /// PON port number, 0-16
        port: u32,
        /// ONU id to remove, 1-128
        onu_id: u32,
    ) -> Result<StructuredContent<OltWorkflowResponse>, String> {
        let outcome = self
            .service
            .delete(&caller_id, board, port, onu_id)
            .await
            .map_err(workflow_error)?;
        let message = format!("ONU {} removed from {}/{}", onu_id, board, port);
        Ok(StructuredContent(OltWorkflowResponse::new(
            &caller_id, message, outcome,
        )))
    }

    /// Locate a registered ONU by serial number.
    ///
    /// `record.complete` is false when the ONU was found but a follow-up
    /// query failed; only its location is reliable then.
    async fn olt_search_by_serial(
        &self,
        /// Caller ID from olt_get_session
        caller_id: String,
        /// Serial number; case and separators are ignored
        serial_number: String,
    ) -> Result<StructuredContent<SerialSearch>, String> {
        let result = self
            .service
            .search_by_serial(&caller_id, &serial_number)
            .await
            .map_err(tool_error)?;
        if !result.found {
            warn!("[{}] serial {} not registered", caller_id, serial_number);
        }
        Ok(StructuredContent(result))
    }

    /// Lowest ONU id not configured on a PON port.
    async fn olt_next_onu_id(
        &self,
        /// Caller ID from olt_get_session
        caller_id: String,
        /// Board (slot) number, 1-17
        board: u32,
        /// PON port number, 0-16
        port: u32,
    ) -> Result<StructuredContent<OltNextOnuIdResponse>, String> {
        let onu_id = self
            .service
            .next_onu_id(&caller_id, board, port)
            .await
            .map_err(tool_error)?;
        Ok(StructuredContent(OltNextOnuIdResponse {
            interface: format!("{}/{}", board, port),
            onu_id,
        }))
    }

    /// Basic information block and registration history of one ONT.
    async fn olt_ont_details(
        &self,
        /// Caller ID from olt_get_session
        caller_id: String,
        /// Board (slot) number, 1-17
        board: u32,
        /// PON port number, 0-16
        port: u32,
        /// ONU id, 1-128
        onu_id: u32,
    ) -> Result<StructuredContent<OntDetail>, String> {
        self.service
            .ont_details(&caller_id, board, port, onu_id)
            .await
            .map(StructuredContent)
            .map_err(tool_error)
    }

    /// Identify the device family from its version banner and compare it
    /// with the configured profile.
    async fn olt_detect_vendor(
        &self,
        /// Caller ID from olt_get_session
        caller_id: String,
    ) -> Result<StructuredContent<OltVendorResponse>, String> {
        let detected = self
            .service
            .detect_vendor(&caller_id)
            .await
            .map_err(tool_error)?;
        let configured = self.service.vendor();
        Ok(StructuredContent(OltVendorResponse {
            configured,
            detected,
            matches: configured == detected,
        }))
    }

    /// Server configuration summary with the password masked.
    async fn olt_config(&self) -> Text<String> {
        Text(self.service.pool().config().device.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::olt::workflow::{RollbackStatus, WorkflowState};

    mod caller_ids {
        use super::*;

        #[test]
        fn test_given_id_is_trimmed() {
            assert_eq!(resolve_caller_id(Some("  noc-1 ".to_string())), "noc-1");
        }

        #[test]
        fn test_missing_or_blank_id_generates_uuid() {
            let generated = resolve_caller_id(None);
            assert!(Uuid::parse_str(&generated).is_ok());
            let blank = resolve_caller_id(Some("   ".to_string()));
            assert!(Uuid::parse_str(&blank).is_ok());
            assert_ne!(generated, blank);
        }
    }

    mod error_strings {
        use super::*;

        #[test]
        fn test_prefixed_with_kind() {
            let message = tool_error(OltError::validation("c1", "board must be 1-17"));
            assert!(message.starts_with("validation error:"));
            assert!(message.contains("board must be 1-17"));

            let message = tool_error(OltError::transport("c1", "timed out"));
            assert!(message.starts_with("transport error:"));
        }

        #[test]
        fn test_workflow_error_lists_progress() {
            let err = WorkflowError {
                state: WorkflowState::RolledBack { failed_step: 1 },
                completed_commands: vec!["interface gpon-olt_1/2/3".to_string()],
                rollback: RollbackStatus::Clean,
                source: OltError::device("c1", "device rejected 'no onu 5'"),
            };
            let message = workflow_error(err);
            assert!(message.starts_with("device error:"));
            assert!(message.contains("rolled back at step 1"));
            assert!(message.contains("1 command(s) already applied"));
        }
    }
}
