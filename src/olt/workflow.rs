//! Ordered multi-step provisioning sequences.
//!
//! A [`Workflow`] is a list of [`Step`]s run on one locked session. Each
//! command reply is scanned for device error markers; a refusal is a
//! `DeviceSemantic` error even though the channel call succeeded. On the first
//! failure the session is unwound to configuration mode best-effort and the
//! original error is returned inside a [`WorkflowError`] together with the
//! commands that had already been applied. The unwind only restores the CLI
//! context, never the device configuration.

use std::fmt;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::olt::cli::{find_error_marker, preview};
use crate::olt::error::OltError;
use crate::olt::pool::SessionGuard;

/// Per-command timeout for configuration steps.
const STEP_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for the persist command; saving the configuration is slow.
const PERSIST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Enter a sub-mode named `name` by sending `command`.
    Enter { name: String, command: String },
    /// Run a command in the current mode; `settle` waits the settle delay afterwards.
    Command { command: String, settle: bool },
    /// Leave the current sub-mode.
    Exit,
    /// Save the configuration from the privileged prompt.
    Persist { command: String },
}

impl Step {
    pub fn enter(name: impl Into<String>, command: impl Into<String>) -> Self {
        Step::Enter {
            name: name.into(),
            command: command.into(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        let name = name.into();
        Step::Enter {
            command: format!("interface {}", name),
            name,
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        Step::Command {
            command: command.into(),
            settle: false,
        }
    }

    pub fn settled(command: impl Into<String>) -> Self {
        Step::Command {
            command: command.into(),
            settle: true,
        }
    }

    pub fn persist(command: impl Into<String>) -> Self {
        Step::Persist {
            command: command.into(),
        }
    }

    /// The command line this step sends, if any.
    pub fn command_text(&self) -> Option<&str> {
        match self {
            Step::Enter { command, .. } | Step::Command { command, .. } | Step::Persist { command } => {
                Some(command)
            }
            Step::Exit => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Executing {
        #[schemars(schema_with = "crate::mcp::schema::uint")]
        step: usize,
    },
    Committed,
    RolledBack {
        #[schemars(schema_with = "crate::mcp::schema::uint")]
        failed_step: usize,
    },
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Idle => write!(f, "idle"),
            WorkflowState::Executing { step } => write!(f, "executing step {}", step),
            WorkflowState::Committed => write!(f, "committed"),
            WorkflowState::RolledBack { failed_step } => {
                write!(f, "rolled back at step {}", failed_step)
            }
        }
    }
}

/// How far the context unwind got after a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RollbackStatus {
    NotNeeded,
    Clean,
    Incomplete(String),
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackStatus::NotNeeded => write!(f, "not needed"),
            RollbackStatus::Clean => write!(f, "context restored"),
            RollbackStatus::Incomplete(reason) => write!(f, "incomplete: {}", reason),
        }
    }
}

#[derive(Debug, Error)]
#[error("{source} ({state}; rollback {rollback}; {} command(s) already applied)", .completed_commands.len())]
pub struct WorkflowError {
    pub state: WorkflowState,
    pub completed_commands: Vec<String>,
    pub rollback: RollbackStatus,
    #[source]
    pub source: OltError,
}

impl WorkflowError {
    /// Failure raised before any step ran.
    pub fn validation(source: OltError) -> Self {
        Self {
            state: WorkflowState::Idle,
            completed_commands: Vec::new(),
            rollback: RollbackStatus::NotNeeded,
            source,
        }
    }
}

impl From<OltError> for WorkflowError {
    fn from(source: OltError) -> Self {
        Self::validation(source)
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WorkflowOutcome {
    pub state: WorkflowState,
    pub commands_executed: Vec<String>,
}

pub struct Workflow {
    name: String,
    steps: Vec<Step>,
    settle_delay: Duration,
}

impl Workflow {
    pub fn new(name: impl Into<String>, steps: Vec<Step>, settle_delay: Duration) -> Self {
        Self {
            name: name.into(),
            steps,
            settle_delay,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    fn check_reply(session: &SessionGuard<'_>, command: &str, output: &str) -> Result<(), OltError> {
        if let Some(marker) = find_error_marker(output) {
            warn!(
                "[{}] device refused '{}' ({}): {}",
                session.caller_id(),
                command,
                marker,
                preview(output)
            );
            return Err(OltError::device(
                session.caller_id(),
                format!("device rejected '{}': {}", command, output.trim()),
            ));
        }
        Ok(())
    }

    async fn run_step(
        &self,
        session: &mut SessionGuard<'_>,
        step: &Step,
        applied: &mut Vec<String>,
    ) -> Result<(), OltError> {
        match step {
            Step::Enter { name, command } => {
                session.enter_context(name, command).await?;
                applied.push(command.clone());
            }
            Step::Command { command, settle } => {
                let output = session.execute(command, Some(STEP_TIMEOUT)).await?;
                Self::check_reply(session, command, &output)?;
                applied.push(command.clone());
                if *settle && !self.settle_delay.is_zero() {
                    tokio::time::sleep(self.settle_delay).await;
                }
            }
            Step::Exit => session.exit_interface().await?,
            Step::Persist { command } => {
                let output = session.execute_privileged(command, Some(PERSIST_TIMEOUT)).await?;
                Self::check_reply(session, command, &output)?;
                applied.push(command.clone());
            }
        }
        Ok(())
    }

    async fn rollback(session: &mut SessionGuard<'_>) -> RollbackStatus {
        match session.ensure_global().await {
            Ok(()) if session.is_connected() => RollbackStatus::Clean,
            Ok(()) => RollbackStatus::Incomplete("channel lost".to_string()),
            Err(e) => RollbackStatus::Incomplete(e.message().to_string()),
        }
    }

    /// Runs every step in order on an exclusively held session.
    pub async fn run(&self, session: &mut SessionGuard<'_>) -> Result<WorkflowOutcome, WorkflowError> {
        info!(
            "[{}] workflow '{}' starting ({} steps)",
            session.caller_id(),
            self.name,
            self.steps.len()
        );
        session.ensure_global().await?;

        let mut applied = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            debug!(
                "[{}] {} {}: {:?}",
                session.caller_id(),
                self.name,
                WorkflowState::Executing { step: index },
                step
            );
            if let Err(source) = self.run_step(session, step, &mut applied).await {
                let rollback = Self::rollback(session).await;
                error!(
                    "[{}] workflow '{}' failed at step {}: {}; rollback {}",
                    session.caller_id(),
                    self.name,
                    index,
                    source,
                    rollback
                );
                return Err(WorkflowError {
                    state: WorkflowState::RolledBack { failed_step: index },
                    completed_commands: applied,
                    rollback,
                    source,
                });
            }
        }

        info!(
            "[{}] workflow '{}' committed ({} commands)",
            session.caller_id(),
            self.name,
            applied.len()
        );
        Ok(WorkflowOutcome {
            state: WorkflowState::Committed,
            commands_executed: applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::olt::channel::mock::MockDevice;
    use crate::olt::cli::CliContext;
    use crate::olt::error::ErrorKind;
    use crate::olt::pool::tests::{pool_for, test_config};

    fn provisioning() -> Workflow {
        Workflow::new(
            "test",
            vec![
                Step::interface("gpon-olt_1/2/3"),
                Step::settled("onu 5 type ZTE-F660 sn ZTEGC8AB1234"),
                Step::Exit,
                Step::persist("write"),
            ],
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_committed_run_records_commands() {
        let device = MockDevice::new().reply("write", "[OK]");
        let (pool, _) = pool_for(&device, test_config());
        let session = pool.get_or_create("caller-1").unwrap();
        let mut guard = session.lock().await.unwrap();

        let outcome = provisioning().run(&mut guard).await.unwrap();
        assert_eq!(outcome.state, WorkflowState::Committed);
        assert_eq!(
            outcome.commands_executed,
            vec![
                "interface gpon-olt_1/2/3",
                "onu 5 type ZTE-F660 sn ZTEGC8AB1234",
                "write"
            ]
        );
        assert_eq!(guard.context(), &CliContext::ConfigGlobal);
    }

    #[tokio::test]
    async fn test_device_refusal_rolls_back_and_skips_persist() {
        let device = MockDevice::new().reply("onu 5", "%Code 32: Invalid ONU type");
        let (pool, _) = pool_for(&device, test_config());
        let session = pool.get_or_create("caller-1").unwrap();
        let mut guard = session.lock().await.unwrap();

        let err = provisioning().run(&mut guard).await.unwrap_err();
        assert_eq!(err.source.kind(), ErrorKind::DeviceSemantic);
        assert_eq!(err.state, WorkflowState::RolledBack { failed_step: 1 });
        assert_eq!(err.rollback, RollbackStatus::Clean);
        assert_eq!(err.completed_commands, vec!["interface gpon-olt_1/2/3"]);
        assert_eq!(guard.context(), &CliContext::ConfigGlobal);
        assert!(!device.history().contains(&"write".to_string()));
    }

    #[tokio::test]
    async fn test_slow_interface_entry_rolls_back_to_config() {
        let device = MockDevice::new().delay("interface", Duration::from_millis(300));
        let (pool, _) = pool_for(&device, test_config());
        let session = pool.get_or_create("caller-1").unwrap();
        let mut guard = session.lock().await.unwrap();

        let err = provisioning().run(&mut guard).await.unwrap_err();
        assert_eq!(err.source.kind(), ErrorKind::Transport);
        assert_eq!(err.state, WorkflowState::RolledBack { failed_step: 0 });
        assert_eq!(err.rollback, RollbackStatus::Clean);
        assert_eq!(guard.context(), &CliContext::ConfigGlobal);
        assert_eq!(device.current_prompt(), "ZXAN(config)#");
        assert!(!device.history().iter().any(|c| c.starts_with("onu 5")));
    }

    #[tokio::test]
    async fn test_channel_loss_reports_incomplete_rollback() {
        let device = MockDevice::new();
        let (pool, _) = pool_for(&device, test_config());
        let session = pool.get_or_create("caller-1").unwrap();
        let mut guard = session.lock().await.unwrap();
        device.kill();

        let err = provisioning().run(&mut guard).await.unwrap_err();
        assert_eq!(err.source.kind(), ErrorKind::Transport);
        assert!(matches!(err.rollback, RollbackStatus::Incomplete(_)));
        assert!(err.completed_commands.is_empty());
    }

    #[test]
    fn test_command_text() {
        assert_eq!(Step::interface("x").command_text(), Some("interface x"));
        assert_eq!(Step::Exit.command_text(), None);
    }
}
