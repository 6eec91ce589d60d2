//! Caller-facing ONT operations.
//!
//! [`OntService`] validates every caller-supplied identifier before touching
//! the pool, takes the caller's session for the whole operation, and
//! dispatches to the configured [`VendorProfile`].

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::olt::cli::find_error_marker;
use crate::olt::error::OltError;
use crate::olt::model::{AutofindRecord, DeviceRecord, OntDetail, ScanStats, SerialMatch};
use crate::olt::parser::autofind::{normalize_serial, parse_autofind};
use crate::olt::parser::index::olt_interface;
use crate::olt::parser::running::{MAX_ONU_ID, lowest_free_id};
use crate::olt::parser::{Diagnostic, Parsed};
use crate::olt::pool::{ConnectionPool, SessionInfo};
use crate::olt::vendor::{
    AUTOFIND_TIMEOUT, Authorization, SEARCH_TIMEOUT, ServiceMode, Vendor, VendorProfile,
    detect_vendor, reject_refusal,
};
use crate::olt::workflow::{Workflow, WorkflowError, WorkflowOutcome};

const BOARD_RANGE: (u32, u32) = (1, 17);
const PORT_RANGE: (u32, u32) = (0, 16);
const VLAN_RANGE: (u32, u32) = (1, 4094);
const SERIAL_LEN: (usize, usize) = (8, 16);

/// Provisioning request as supplied by a caller.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AuthorizeRequest {
    pub board: u32,
    pub port: u32,
    pub onu_id: u32,
    pub serial_number: String,
    pub onu_type: String,
    pub vlan: u32,
    pub zone: Option<String>,
    pub name: Option<String>,
    /// `routing` or `bridging`.
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ScanReport {
    pub records: Vec<DeviceRecord>,
    pub stats: ScanStats,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SerialSearch {
    pub found: bool,
    pub record: Option<SerialMatch>,
}

fn in_range(caller_id: &str, field: &str, value: u32, (min, max): (u32, u32)) -> Result<u8, OltError> {
    if value < min || value > max {
        return Err(OltError::validation(
            caller_id,
            format!("{} must be between {} and {}, got {}", field, min, max, value),
        ));
    }
    u8::try_from(value).map_err(|_| OltError::validation(caller_id, format!("{} out of range", field)))
}

fn validate_location(caller_id: &str, board: u32, port: u32) -> Result<(u8, u8), OltError> {
    Ok((
        in_range(caller_id, "board", board, BOARD_RANGE)?,
        in_range(caller_id, "port", port, PORT_RANGE)?,
    ))
}

fn validate_onu_id(caller_id: &str, onu_id: u32) -> Result<u8, OltError> {
    in_range(caller_id, "onu_id", onu_id, (1, u32::from(MAX_ONU_ID)))
}

fn validate_serial(caller_id: &str, serial: &str) -> Result<String, OltError> {
    let normalized = normalize_serial(serial);
    let (min, max) = SERIAL_LEN;
    if normalized.len() < min || normalized.len() > max {
        return Err(OltError::validation(
            caller_id,
            format!(
                "serial number must have {} to {} alphanumeric characters, got '{}'",
                min, max, serial
            ),
        ));
    }
    Ok(normalized)
}

fn validate_authorization(caller_id: &str, request: &AuthorizeRequest) -> Result<Authorization, OltError> {
    let (board, port) = validate_location(caller_id, request.board, request.port)?;
    let onu_id = validate_onu_id(caller_id, request.onu_id)?;
    let serial_number = validate_serial(caller_id, &request.serial_number)?;

    let onu_type = request.onu_type.trim();
    if onu_type.is_empty() || onu_type.chars().any(char::is_whitespace) {
        return Err(OltError::validation(
            caller_id,
            format!("onu_type must be a single non-empty token, got '{}'", request.onu_type),
        ));
    }
    if request.vlan < VLAN_RANGE.0 || request.vlan > VLAN_RANGE.1 {
        return Err(OltError::validation(
            caller_id,
            format!(
                "vlan must be between {} and {}, got {}",
                VLAN_RANGE.0, VLAN_RANGE.1, request.vlan
            ),
        ));
    }
    let vlan = u16::try_from(request.vlan)
        .map_err(|_| OltError::validation(caller_id, "vlan out of range"))?;
    let mode: ServiceMode = request
        .mode
        .parse()
        .map_err(|e: String| OltError::validation(caller_id, e))?;

    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Ok(Authorization {
        board,
        port,
        onu_id,
        serial_number,
        onu_type: onu_type.to_string(),
        vlan,
        name: non_empty(&request.name),
        zone: non_empty(&request.zone),
        mode,
    })
}

pub struct OntService {
    pool: Arc<ConnectionPool>,
    profile: &'static dyn VendorProfile,
}

impl OntService {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        let profile = pool.config().device.vendor.profile();
        Self { pool, profile }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn vendor(&self) -> Vendor {
        self.profile.vendor()
    }

    /// Registers the caller (without connecting) and reports its session.
    pub fn get_session(&self, caller_id: &str) -> Result<SessionInfo, OltError> {
        self.pool.get_or_create(caller_id)?;
        self.pool
            .session_info(caller_id)
            .ok_or_else(|| OltError::transport(caller_id, "session was removed while registering"))
    }

    pub async fn disconnect_session(&self, caller_id: &str) -> bool {
        self.pool.disconnect(caller_id).await
    }

    pub fn active_session_count(&self) -> usize {
        self.pool.active_count()
    }

    pub fn session_info(&self, caller_id: &str) -> Option<SessionInfo> {
        self.pool.session_info(caller_id)
    }

    pub async fn query_records(
        &self,
        caller_id: &str,
        board: u32,
        port: u32,
    ) -> Result<Parsed<DeviceRecord>, OltError> {
        let (board, port) = validate_location(caller_id, board, port)?;
        let session = self.pool.get_or_create(caller_id)?;
        let mut guard = session.lock().await?;
        self.profile.fetch_records(&mut guard, board, port).await
    }

    pub async fn query_autofind(&self, caller_id: &str) -> Result<Parsed<AutofindRecord>, OltError> {
        let session = self.pool.get_or_create(caller_id)?;
        let mut guard = session.lock().await?;
        guard.ensure_global().await?;

        let command = self.profile.autofind_command();
        let output = guard.execute(command, Some(AUTOFIND_TIMEOUT)).await?;
        let parsed = parse_autofind(&output);
        reject_refusal(&guard, command, &output, &parsed)?;
        info!("[{}] autofind found {} ONT(s)", caller_id, parsed.records.len());
        Ok(parsed)
    }

    pub async fn quick_scan(
        &self,
        caller_id: &str,
        board: u32,
        port: u32,
        include_descriptions: bool,
    ) -> Result<ScanReport, OltError> {
        let (board, port) = validate_location(caller_id, board, port)?;
        let session = self.pool.get_or_create(caller_id)?;
        let mut guard = session.lock().await?;
        let parsed = self
            .profile
            .fetch_scan(&mut guard, board, port, include_descriptions)
            .await?;

        let stats = ScanStats::from_records(&parsed.records);
        info!(
            "[{}] scan of {}/{}: {} total, {} online, {} offline",
            caller_id, board, port, stats.total, stats.online, stats.offline
        );
        Ok(ScanReport {
            records: parsed.records,
            stats,
            diagnostics: parsed.diagnostics,
        })
    }

    /// Provisions an ONU. The configuration is saved only if every step succeeded.
    pub async fn authorize(
        &self,
        caller_id: &str,
        request: &AuthorizeRequest,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let authorization = validate_authorization(caller_id, request)?;
        let steps = self.profile.authorize_plan(caller_id, &authorization)?;
        info!(
            "[{}] authorizing {} as ONU {} on {}/{} (vlan {}, {:?}, zone {})",
            caller_id,
            authorization.serial_number,
            authorization.onu_id,
            authorization.board,
            authorization.port,
            authorization.vlan,
            authorization.mode,
            authorization.zone.as_deref().unwrap_or("-")
        );

        let workflow = Workflow::new("authorize", steps, self.pool.config().settle_delay);
        let session = self.pool.get_or_create(caller_id)?;
        let mut guard = session.lock().await?;
        workflow.run(&mut guard).await
    }

    /// Removes an ONU registration and saves the configuration.
    pub async fn delete(
        &self,
        caller_id: &str,
        board: u32,
        port: u32,
        onu_id: u32,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let (board, port) = validate_location(caller_id, board, port)?;
        let onu_id = validate_onu_id(caller_id, onu_id)?;
        let steps = self.profile.delete_plan(caller_id, board, port, onu_id)?;
        info!("[{}] deleting ONU {} on {}/{}", caller_id, onu_id, board, port);

        let workflow = Workflow::new("delete", steps, self.pool.config().settle_delay);
        let session = self.pool.get_or_create(caller_id)?;
        let mut guard = session.lock().await?;
        workflow.run(&mut guard).await
    }

    pub async fn search_by_serial(&self, caller_id: &str, serial: &str) -> Result<SerialSearch, OltError> {
        let serial = validate_serial(caller_id, serial)?;
        let session = self.pool.get_or_create(caller_id)?;
        let mut guard = session.lock().await?;
        let record = self.profile.search_serial(&mut guard, &serial).await?;
        if let Some(found) = &record
            && !found.complete
        {
            warn!("[{}] returning partial record for {}", caller_id, serial);
        }
        Ok(SerialSearch {
            found: record.is_some(),
            record,
        })
    }

    /// Lowest ONU id not configured on the port.
    pub async fn next_onu_id(&self, caller_id: &str, board: u32, port: u32) -> Result<u8, OltError> {
        let (board, port) = validate_location(caller_id, board, port)?;
        let session = self.pool.get_or_create(caller_id)?;
        let mut guard = session.lock().await?;
        let used = self.profile.used_onu_ids(&mut guard, board, port).await?;
        lowest_free_id(&used).ok_or_else(|| {
            OltError::device(
                caller_id,
                format!("no free ONU id on {} ({} in use)", olt_interface(board, port), used.len()),
            )
        })
    }

    pub async fn ont_details(
        &self,
        caller_id: &str,
        board: u32,
        port: u32,
        onu_id: u32,
    ) -> Result<OntDetail, OltError> {
        let (board, port) = validate_location(caller_id, board, port)?;
        let onu_id = validate_onu_id(caller_id, onu_id)?;
        let session = self.pool.get_or_create(caller_id)?;
        let mut guard = session.lock().await?;
        self.profile.fetch_details(&mut guard, board, port, onu_id).await
    }

    /// Asks the device for its version banner and classifies it.
    ///
    /// Tries the ZTE command first and falls back to the Huawei one when it
    /// is refused.
    pub async fn detect_vendor(&self, caller_id: &str) -> Result<Vendor, OltError> {
        let session = self.pool.get_or_create(caller_id)?;
        let mut guard = session.lock().await?;
        guard.ensure_global().await?;

        let mut output = guard.execute("show version", Some(SEARCH_TIMEOUT)).await?;
        if output.trim().is_empty() || find_error_marker(&output).is_some() {
            output = guard.execute("display version", Some(SEARCH_TIMEOUT)).await?;
        }
        let vendor = detect_vendor(&output);
        if vendor != self.vendor() {
            warn!(
                "[{}] device looks like {} but the {} profile is configured",
                caller_id,
                vendor,
                self.vendor()
            );
        }
        Ok(vendor)
    }
}
