//! Per-caller session pool.
//!
//! The pool maps each caller id to one [`CliSession`]. Registry bookkeeping
//! (`last_used_at`, connect attempts, last error) lives in a `DashMap`; the
//! session itself sits behind a per-session `tokio::sync::Mutex` so two
//! requests for the same caller id can never interleave on one channel.
//!
//! # Lifecycle
//!
//! - [`ConnectionPool::get_or_create`] registers a caller without touching the
//!   network.
//! - [`PooledSession::lock`] takes the session mutex and connects lazily,
//!   retrying transient failures with exponential backoff. Attempts are
//!   counted per caller; once the cap is reached the stored error is returned
//!   without another network attempt until the entry is reaped or
//!   disconnected.
//! - The reaper ([`ConnectionPool::start`]) runs [`ConnectionPool::reap_once`]
//!   on a fixed interval. Entries idle beyond `max_idle`, or idle beyond
//!   `dead_grace` with a channel that fails the liveness probe, are closed and
//!   removed. A session whose mutex is held is busy, hence not idle, and is
//!   skipped for that cycle.
//!
//! Registry references are never held across an `.await`.

use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::olt::channel::{ChannelConnector, ConnectParams};
use crate::olt::cli::{CliContext, CliDialect, CliSession};
use crate::olt::clock::{Clock, elapsed_between};
use crate::olt::config::{MAX_RETRY_DELAY, OltConfig, escalated_connect_timeout};
use crate::olt::error::{OltError, is_retryable_error};

/// How many times `lock` re-registers when the entry vanished while waiting.
const MAX_LOCK_RETRIES: usize = 3;

/// Registry metadata for one caller.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub caller_id: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub connect_attempts: u32,
    pub last_error: Option<String>,
}

struct Slot {
    handle: SessionHandle,
    session: Arc<Mutex<CliSession>>,
}

/// Diagnostic view of a pooled session.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SessionInfo {
    pub caller_id: String,
    pub created_at: String,
    pub last_used_at: String,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub idle_secs: u64,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub connect_attempts: u32,
    pub last_error: Option<String>,
    /// `None` while a command holds the session.
    pub context: Option<CliContext>,
    pub connected: Option<bool>,
    pub busy: bool,
}

struct Reaper {
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ConnectionPool {
    config: OltConfig,
    dialect: CliDialect,
    connector: Arc<dyn ChannelConnector>,
    clock: Arc<dyn Clock>,
    sessions: DashMap<String, Slot>,
    reaper: StdMutex<Option<Reaper>>,
}

impl ConnectionPool {
    pub fn new(
        config: OltConfig,
        connector: Arc<dyn ChannelConnector>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        info!("Connection pool for {}", config.device);
        Arc::new(Self {
            dialect: config.device.vendor.dialect(),
            config,
            connector,
            clock,
            sessions: DashMap::new(),
            reaper: StdMutex::new(None),
        })
    }

    pub fn config(&self) -> &OltConfig {
        &self.config
    }

    /// Returns the caller's session, registering it if needed.
    ///
    /// Registration never connects. Fails with `Transport` when the caller has
    /// exhausted its connect attempts, and with `Validation` for an empty id or
    /// a full registry.
    pub fn get_or_create(self: &Arc<Self>, caller_id: &str) -> Result<PooledSession, OltError> {
        self.register(caller_id)?;
        Ok(PooledSession {
            caller_id: caller_id.to_string(),
            pool: Arc::clone(self),
        })
    }

    /// Registers or refreshes `caller_id`; returns its session and how long it
    /// had been idle.
    fn register(&self, caller_id: &str) -> Result<(Arc<Mutex<CliSession>>, Duration), OltError> {
        if caller_id.trim().is_empty() {
            return Err(OltError::validation(caller_id, "caller id must not be empty"));
        }
        let now = self.clock.now();
        let cap = self.config.pool.max_connect_attempts;

        if let Some(mut slot) = self.sessions.get_mut(caller_id) {
            let idle = elapsed_between(slot.handle.last_used_at, now);
            slot.handle.last_used_at = now;
            if slot.handle.connect_attempts >= cap
                && let Some(last_error) = &slot.handle.last_error
            {
                return Err(OltError::transport(
                    caller_id,
                    format!(
                        "giving up after {} failed connect attempts: {}",
                        slot.handle.connect_attempts, last_error
                    ),
                ));
            }
            return Ok((Arc::clone(&slot.session), idle));
        }

        let max = self.config.pool.max_connections;
        if self.sessions.len() >= max {
            warn!("Rejecting caller {}: registry full ({} sessions)", caller_id, max);
            return Err(OltError::validation(
                caller_id,
                format!("session limit reached ({} active sessions)", max),
            ));
        }

        let cli = CliSession::new(
            caller_id,
            self.dialect.clone(),
            self.config.device.command_timeout,
            self.config.pool.poll_interval,
        )?;
        let slot = self.sessions.entry(caller_id.to_string()).or_insert_with(|| {
            info!("Registered session for caller {}", caller_id);
            Slot {
                handle: SessionHandle {
                    caller_id: caller_id.to_string(),
                    created_at: now,
                    last_used_at: now,
                    connect_attempts: 0,
                    last_error: None,
                },
                session: Arc::new(Mutex::new(cli)),
            }
        });
        Ok((Arc::clone(&slot.session), Duration::ZERO))
    }

    fn is_current(&self, caller_id: &str, session: &Arc<Mutex<CliSession>>) -> bool {
        self.sessions
            .get(caller_id)
            .is_some_and(|slot| Arc::ptr_eq(&slot.session, session))
    }

    fn touch(&self, caller_id: &str) {
        if let Some(mut slot) = self.sessions.get_mut(caller_id) {
            slot.handle.last_used_at = self.clock.now();
        }
    }

    fn record_attempt(&self, caller_id: &str) -> u32 {
        self.sessions
            .get_mut(caller_id)
            .map(|mut slot| {
                slot.handle.connect_attempts += 1;
                slot.handle.connect_attempts
            })
            .unwrap_or(1)
    }

    fn record_outcome(&self, caller_id: &str, error: Option<&str>) {
        if let Some(mut slot) = self.sessions.get_mut(caller_id) {
            match error {
                Some(e) => slot.handle.last_error = Some(e.to_string()),
                None => {
                    slot.handle.connect_attempts = 0;
                    slot.handle.last_error = None;
                }
            }
        }
    }

    fn connect_params(&self, timeout: Duration) -> ConnectParams {
        let device = &self.config.device;
        ConnectParams {
            address: device.address(),
            username: device.username.clone(),
            password: device.password.clone(),
            key_path: device.key_path.clone(),
            timeout,
        }
    }

    /// Establishes the session's channel within the caller's remaining attempts.
    async fn connect(&self, cli: &mut CliSession) -> Result<(), OltError> {
        let caller_id = cli.caller_id().to_string();
        let cap = self.config.pool.max_connect_attempts;
        let (attempts, last_error) = self
            .sessions
            .get(&caller_id)
            .map(|slot| (slot.handle.connect_attempts, slot.handle.last_error.clone()))
            .unwrap_or((0, None));

        if attempts >= cap {
            let reason = last_error.unwrap_or_else(|| "no successful connect".to_string());
            return Err(OltError::transport(
                &caller_id,
                format!("giving up after {} failed connect attempts: {}", attempts, reason),
            ));
        }

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.pool.retry_delay)
            .with_max_delay(MAX_RETRY_DELAY)
            .with_max_times((cap - attempts - 1) as usize)
            .with_jitter();

        let session: &CliSession = cli;
        let result = (|| async {
            let attempt = self.record_attempt(&caller_id);
            let timeout = escalated_connect_timeout(self.config.device.connect_timeout, attempt);
            if attempt > 1 {
                info!(
                    "Connect attempt {} for caller {} with timeout {}s",
                    attempt,
                    caller_id,
                    timeout.as_secs()
                );
            }
            session
                .establish(self.connector.as_ref(), &self.connect_params(timeout))
                .await
        })
        .retry(backoff)
        .when(|e: &OltError| {
            let retryable = is_retryable_error(e.message());
            if !retryable {
                warn!(
                    "Connect for caller {} failed with non-retryable error: {}",
                    caller_id,
                    e.message()
                );
            }
            retryable
        })
        .notify(|err: &OltError, dur: Duration| {
            warn!("Connect failed: {}. Retrying in {:?}", err, dur);
        })
        .await;

        match result {
            Ok(channel) => {
                cli.attach(channel);
                self.record_outcome(&caller_id, None);
                Ok(())
            }
            Err(e) => {
                error!("Connect for caller {} failed: {}", caller_id, e);
                self.record_outcome(&caller_id, Some(e.message()));
                Err(e)
            }
        }
    }

    /// Closes and removes the caller's session. Returns false when absent.
    ///
    /// Waits for any in-flight command on that session to finish first.
    pub async fn disconnect(&self, caller_id: &str) -> bool {
        let Some((_, slot)) = self.sessions.remove(caller_id) else {
            return false;
        };
        slot.session.lock().await.close().await;
        info!("Disconnected session for caller {}", caller_id);
        true
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_info(&self, caller_id: &str) -> Option<SessionInfo> {
        let (handle, session) = {
            let slot = self.sessions.get(caller_id)?;
            (slot.handle.clone(), Arc::clone(&slot.session))
        };
        let (context, connected, busy) = match session.try_lock() {
            Ok(cli) => (Some(cli.context().clone()), Some(cli.is_connected()), false),
            Err(_) => (None, None, true),
        };

        Some(SessionInfo {
            idle_secs: elapsed_between(handle.last_used_at, self.clock.now()).as_secs(),
            created_at: handle.created_at.to_rfc3339(),
            last_used_at: handle.last_used_at.to_rfc3339(),
            caller_id: handle.caller_id,
            connect_attempts: handle.connect_attempts,
            last_error: handle.last_error,
            context,
            connected,
            busy,
        })
    }

    /// One reaper cycle; returns the caller ids that were removed.
    pub async fn reap_once(&self) -> Vec<String> {
        let now = self.clock.now();
        let max_idle = self.config.pool.max_idle;
        let dead_grace = self.config.pool.dead_grace;

        let snapshot: Vec<(String, DateTime<Utc>, Arc<Mutex<CliSession>>)> = self
            .sessions
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.handle.last_used_at,
                    Arc::clone(&entry.session),
                )
            })
            .collect();

        let mut reaped = Vec::new();
        for (caller_id, last_used, session) in snapshot {
            let idle = elapsed_between(last_used, now);
            let expired = idle > max_idle;
            if !expired && idle <= dead_grace {
                continue;
            }

            let Ok(mut cli) = Arc::clone(&session).try_lock_owned() else {
                debug!("Skipping busy session {}", caller_id);
                continue;
            };
            let reason = if expired {
                "idle"
            } else if !cli.liveness_probe().await {
                "dead channel"
            } else {
                continue;
            };

            let removed = self
                .sessions
                .remove_if(&caller_id, |_, slot| {
                    Arc::ptr_eq(&slot.session, &session) && slot.handle.last_used_at == last_used
                })
                .is_some();
            if !removed {
                continue;
            }

            cli.close().await;
            info!(
                "Reaped session {} ({}, idle {}s)",
                caller_id,
                reason,
                idle.as_secs()
            );
            reaped.push(caller_id);
        }
        reaped
    }

    /// Starts the background reaper. No-op when already running.
    pub fn start(self: &Arc<Self>) {
        let mut reaper = self.reaper.lock().unwrap_or_else(PoisonError::into_inner);
        if reaper.is_some() {
            return;
        }

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let pool: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.pool.reap_interval;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let Some(pool) = pool.upgrade() else {
                            break;
                        };
                        let reaped = pool.reap_once().await;
                        if !reaped.is_empty() {
                            info!("Reaper removed {} session(s), {} active", reaped.len(), pool.active_count());
                        }
                    }
                }
            }
            debug!("Reaper stopped");
        });

        info!("Reaper started with interval {}s", interval.as_secs());
        *reaper = Some(Reaper { cancel_token, task });
    }

    /// Stops the background reaper and waits for it to exit.
    pub async fn stop(&self) {
        let reaper = self
            .reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reaper) = reaper {
            reaper.cancel_token.cancel();
            if let Err(e) = reaper.task.await {
                warn!("Reaper task ended abnormally: {}", e);
            }
        }
    }

    /// Stops the reaper and disconnects every registered session.
    pub async fn shutdown(&self) {
        self.stop().await;
        let caller_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let count = caller_ids.len();
        futures::future::join_all(caller_ids.iter().map(|id| self.disconnect(id))).await;
        info!("Connection pool shut down, {} session(s) closed", count);
    }
}

/// A caller's handle on its pooled session.
#[derive(Clone)]
pub struct PooledSession {
    caller_id: String,
    pool: Arc<ConnectionPool>,
}

impl PooledSession {
    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    /// Takes exclusive use of the session, connecting if necessary.
    ///
    /// A connected session idle for longer than the dead-channel grace period
    /// is probed first and reconnected if the probe fails.
    pub async fn lock(&self) -> Result<SessionGuard<'_>, OltError> {
        for _ in 0..MAX_LOCK_RETRIES {
            let (session, idle) = self.pool.register(&self.caller_id)?;
            let mut cli = session.clone().lock_owned().await;
            if !self.pool.is_current(&self.caller_id, &session) {
                debug!("Session {} was replaced while waiting, retrying", self.caller_id);
                continue;
            }
            self.pool.touch(&self.caller_id);

            if cli.is_connected()
                && idle > self.pool.config.pool.dead_grace
                && !cli.liveness_probe().await
            {
                info!("Session {} failed liveness probe, reconnecting", self.caller_id);
            }
            if !cli.is_connected() {
                self.pool.connect(&mut cli).await?;
            }
            return Ok(SessionGuard { cli, session: self });
        }
        Err(OltError::transport(
            &self.caller_id,
            "session was removed repeatedly while waiting for it",
        ))
    }

    pub async fn execute(&self, command: &str, timeout: Option<Duration>) -> Result<String, OltError> {
        self.lock().await?.execute(command, timeout).await
    }

    pub async fn execute_expect(
        &self,
        command: &str,
        prompt_pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<String, OltError> {
        self.lock()
            .await?
            .execute_expect(command, prompt_pattern, timeout)
            .await
    }

    pub async fn enter_interface(&self, name: &str) -> Result<(), OltError> {
        self.lock().await?.enter_interface(name).await
    }

    pub async fn exit_interface(&self) -> Result<(), OltError> {
        self.lock().await?.exit_interface().await
    }

    pub async fn ensure_global(&self) -> Result<(), OltError> {
        self.lock().await?.ensure_global().await
    }

    /// Current context, or `Disconnected` for an unknown caller.
    pub async fn context(&self) -> CliContext {
        match self.pool.sessions.get(&self.caller_id).map(|s| Arc::clone(&s.session)) {
            Some(session) => session.lock().await.context().clone(),
            None => CliContext::Disconnected,
        }
    }

    pub async fn liveness_probe(&self) -> bool {
        match self.pool.sessions.get(&self.caller_id).map(|s| Arc::clone(&s.session)) {
            Some(session) => session.lock().await.liveness_probe().await,
            None => false,
        }
    }
}

/// Exclusive access to a connected session.
///
/// Multi-step operations hold one guard for their whole sequence so no other
/// request for the same caller can change the context in between.
pub struct SessionGuard<'a> {
    cli: OwnedMutexGuard<CliSession>,
    session: &'a PooledSession,
}

impl SessionGuard<'_> {
    fn touch(&self) {
        self.session.pool.touch(&self.session.caller_id);
    }

    pub fn caller_id(&self) -> &str {
        &self.session.caller_id
    }

    pub fn context(&self) -> &CliContext {
        self.cli.context()
    }

    pub fn is_connected(&self) -> bool {
        self.cli.is_connected()
    }

    pub async fn execute(&mut self, command: &str, timeout: Option<Duration>) -> Result<String, OltError> {
        let result = self.cli.execute(command, timeout).await;
        self.touch();
        result
    }

    pub async fn execute_expect(
        &mut self,
        command: &str,
        prompt_pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<String, OltError> {
        let result = self.cli.execute_expect(command, prompt_pattern, timeout).await;
        self.touch();
        result
    }

    pub async fn execute_privileged(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, OltError> {
        let result = self.cli.execute_privileged(command, timeout).await;
        self.touch();
        result
    }

    pub async fn enter_interface(&mut self, name: &str) -> Result<(), OltError> {
        let result = self.cli.enter_interface(name).await;
        self.touch();
        result
    }

    pub async fn enter_context(&mut self, name: &str, entry_command: &str) -> Result<(), OltError> {
        let result = self.cli.enter_context(name, entry_command).await;
        self.touch();
        result
    }

    pub async fn exit_interface(&mut self) -> Result<(), OltError> {
        let result = self.cli.exit_interface().await;
        self.touch();
        result
    }

    pub async fn ensure_global(&mut self) -> Result<(), OltError> {
        let result = self.cli.ensure_global().await;
        self.touch();
        result
    }

    pub async fn liveness_probe(&mut self) -> bool {
        self.cli.liveness_probe().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::olt::channel::mock::MockDevice;
    use crate::olt::clock::ManualClock;
    use crate::olt::config::{DeviceConfig, PoolConfig};
    use crate::olt::error::ErrorKind;
    use crate::olt::vendor::Vendor;

    pub(crate) fn test_config() -> OltConfig {
        OltConfig {
            device: DeviceConfig {
                host: "olt".to_string(),
                port: 22,
                username: "zte".to_string(),
                password: Some("zte".to_string()),
                key_path: None,
                vendor: Vendor::Zte,
                connect_timeout: Duration::from_secs(2),
                command_timeout: Duration::from_millis(200),
            },
            pool: PoolConfig {
                max_idle: Duration::from_secs(300),
                dead_grace: Duration::from_secs(60),
                reap_interval: Duration::from_secs(30),
                max_connect_attempts: 3,
                retry_delay: Duration::from_millis(1),
                max_connections: 50,
                poll_interval: Duration::from_millis(1),
            },
            settle_delay: Duration::ZERO,
        }
    }

    pub(crate) fn pool_for(device: &MockDevice, config: OltConfig) -> (Arc<ConnectionPool>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let pool = ConnectionPool::new(config, Arc::new(device.connector()), clock.clone());
        (pool, clock)
    }

    mod registry {
        use super::*;

        #[tokio::test]
        async fn test_get_or_create_is_lazy() {
            let device = MockDevice::new();
            let (pool, _) = pool_for(&device, test_config());
            let session = pool.get_or_create("caller-1").unwrap();
            assert_eq!(session.caller_id(), "caller-1");
            assert_eq!(pool.active_count(), 1);
            assert_eq!(device.connect_count(), 0);
        }

        #[tokio::test]
        async fn test_same_caller_reuses_entry_and_channel() {
            let device = MockDevice::new().reply("show clock", "10:00");
            let (pool, _) = pool_for(&device, test_config());

            let first = pool.get_or_create("caller-1").unwrap();
            assert_eq!(first.execute("show clock", None).await.unwrap(), "10:00");
            let second = pool.get_or_create("caller-1").unwrap();
            assert_eq!(second.execute("show clock", None).await.unwrap(), "10:00");

            assert_eq!(pool.active_count(), 1);
            assert_eq!(device.connect_count(), 1);
        }

        #[tokio::test]
        async fn test_empty_caller_id_rejected() {
            let device = MockDevice::new();
            let (pool, _) = pool_for(&device, test_config());
            let err = pool.get_or_create("  ").err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        #[tokio::test]
        async fn test_max_connections() {
            let device = MockDevice::new();
            let mut config = test_config();
            config.pool.max_connections = 2;
            let (pool, _) = pool_for(&device, config);

            pool.get_or_create("a").unwrap();
            pool.get_or_create("b").unwrap();
            let err = pool.get_or_create("c").err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert_eq!(err.caller_id(), "c");
            assert!(pool.get_or_create("a").is_ok());
            assert_eq!(pool.active_count(), 2);
        }

        #[tokio::test]
        async fn test_disconnect() {
            let device = MockDevice::new();
            let (pool, _) = pool_for(&device, test_config());
            let session = pool.get_or_create("caller-1").unwrap();
            session.ensure_global().await.unwrap();

            assert!(pool.disconnect("caller-1").await);
            assert_eq!(pool.active_count(), 0);
            assert_eq!(device.history().last().map(String::as_str), Some("exit"));
            assert!(!pool.disconnect("caller-1").await);
        }

        #[tokio::test]
        async fn test_session_info() {
            let device = MockDevice::new();
            let (pool, clock) = pool_for(&device, test_config());
            let session = pool.get_or_create("caller-1").unwrap();
            session.ensure_global().await.unwrap();
            clock.advance(Duration::from_secs(12));

            let info = pool.session_info("caller-1").unwrap();
            assert_eq!(info.context, Some(CliContext::ConfigGlobal));
            assert_eq!(info.connected, Some(true));
            assert_eq!(info.idle_secs, 12);
            assert!(!info.busy);
            assert!(pool.session_info("nobody").is_none());
        }

        #[tokio::test]
        async fn test_session_info_while_busy() {
            let device = MockDevice::new();
            let (pool, _) = pool_for(&device, test_config());
            let session = pool.get_or_create("caller-1").unwrap();
            let _guard = session.lock().await.unwrap();
            let info = pool.session_info("caller-1").unwrap();
            assert!(info.busy);
            assert_eq!(info.context, None);
        }
    }

    mod connecting {
        use super::*;

        #[tokio::test]
        async fn test_connect_attempt_cap() {
            let device = MockDevice::new().fail_connects(10, "Connection refused");
            let (pool, _) = pool_for(&device, test_config());
            let session = pool.get_or_create("caller-1").unwrap();

            let err = session.lock().await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Transport);
            assert_eq!(device.connect_count(), 3);

            let err = pool.get_or_create("caller-1").err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Transport);
            assert!(err.message().contains("Connection refused"));
            assert_eq!(device.connect_count(), 3);

            let info = pool.session_info("caller-1").unwrap();
            assert_eq!(info.connect_attempts, 3);
        }

        #[tokio::test]
        async fn test_transient_failure_recovers() {
            let device = MockDevice::new().fail_connects(2, "Connection reset by peer");
            let (pool, _) = pool_for(&device, test_config());
            let session = pool.get_or_create("caller-1").unwrap();

            let guard = session.lock().await.unwrap();
            assert_eq!(guard.context(), &CliContext::ConfigGlobal);
            drop(guard);
            assert_eq!(device.connect_count(), 3);

            let info = pool.session_info("caller-1").unwrap();
            assert_eq!(info.connect_attempts, 0);
            assert_eq!(info.last_error, None);
        }

        #[tokio::test]
        async fn test_auth_failure_not_retried() {
            let device = MockDevice::new().fail_connects(10, "Authentication failed");
            let (pool, _) = pool_for(&device, test_config());
            let session = pool.get_or_create("caller-1").unwrap();

            assert!(session.lock().await.is_err());
            assert_eq!(device.connect_count(), 1);
        }

        #[tokio::test]
        async fn test_reconnects_after_channel_loss() {
            let device = MockDevice::new();
            let (pool, _) = pool_for(&device, test_config());
            let session = pool.get_or_create("caller-1").unwrap();
            session.ensure_global().await.unwrap();

            device.kill();
            let err = session.execute("show clock", None).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Transport);
            assert_eq!(session.context().await, CliContext::Disconnected);

            session.execute("show clock", None).await.unwrap();
            assert_eq!(device.connect_count(), 2);
        }
    }

    mod reaping {
        use super::*;

        #[tokio::test]
        async fn test_idle_session_reaped() {
            let device = MockDevice::new();
            let (pool, clock) = pool_for(&device, test_config());
            pool.get_or_create("caller-1").unwrap().ensure_global().await.unwrap();

            clock.advance(Duration::from_secs(301));
            assert_eq!(pool.reap_once().await, vec!["caller-1".to_string()]);
            assert_eq!(pool.active_count(), 0);
        }

        #[tokio::test]
        async fn test_recent_session_kept() {
            let device = MockDevice::new();
            let (pool, clock) = pool_for(&device, test_config());
            pool.get_or_create("caller-1").unwrap().ensure_global().await.unwrap();

            clock.advance(Duration::from_secs(30));
            assert!(pool.reap_once().await.is_empty());
            clock.advance(Duration::from_secs(40));
            assert!(pool.reap_once().await.is_empty());
            assert_eq!(pool.active_count(), 1);
        }

        #[tokio::test]
        async fn test_dead_channel_reaped_after_grace() {
            let device = MockDevice::new();
            let (pool, clock) = pool_for(&device, test_config());
            pool.get_or_create("caller-1").unwrap().ensure_global().await.unwrap();

            device.kill();
            clock.advance(Duration::from_secs(30));
            assert!(pool.reap_once().await.is_empty());
            clock.advance(Duration::from_secs(31));
            assert_eq!(pool.reap_once().await.len(), 1);
        }

        #[tokio::test]
        async fn test_never_connected_session_reaped_after_grace() {
            let device = MockDevice::new().fail_connects(10, "Connection refused");
            let (pool, clock) = pool_for(&device, test_config());
            let session = pool.get_or_create("caller-1").unwrap();
            assert!(session.lock().await.is_err());

            clock.advance(Duration::from_secs(61));
            assert_eq!(pool.reap_once().await.len(), 1);
            assert!(pool.get_or_create("caller-1").is_ok());
        }

        #[tokio::test]
        async fn test_busy_session_skipped() {
            let device = MockDevice::new();
            let (pool, clock) = pool_for(&device, test_config());
            let session = pool.get_or_create("caller-1").unwrap();
            let guard = session.lock().await.unwrap();

            clock.advance(Duration::from_secs(301));
            assert!(pool.reap_once().await.is_empty());
            assert_eq!(pool.active_count(), 1);
            drop(guard);
        }

        #[tokio::test]
        async fn test_start_stop_and_shutdown() {
            let device = MockDevice::new();
            let (pool, _) = pool_for(&device, test_config());
            pool.start();
            pool.start();
            pool.get_or_create("a").unwrap().ensure_global().await.unwrap();
            pool.get_or_create("b").unwrap();

            pool.shutdown().await;
            assert_eq!(pool.active_count(), 0);
        }
    }
}
