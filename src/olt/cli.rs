//! Context-tracked CLI session over one shell channel.
//!
//! OLT command lines are modal: the same text means different things (or is
//! rejected) depending on whether the device is at the privileged prompt, in
//! configuration mode, or inside an interface. [`CliSession`] owns one
//! physical channel and tracks that mode as a [`CliContext`]:
//!
//! ```text
//! Disconnected --connect--> ConfigGlobal --enter_interface(X)--> Interface(X)
//!                               ^  |                                  |
//!                               |  +--leave_config--> Global          |
//!                               +-----exit_interface / ensure_global--+
//! ```
//!
//! Every command is written, then the channel is polled until its echo and,
//! after it, the expected prompt pattern show up or the timeout elapses.
//! The returned text has the echoed command and the trailing prompt removed.
//!
//! A rejected interface entry or a timed-out command leaves the session
//! flagged for re-synchronisation: every command fails with a protocol error until
//! [`CliSession::ensure_global`] has walked the device back to the
//! configuration prompt.

use std::fmt;
use std::time::Duration;

use regex_lite::Regex;
use schemars::JsonSchema;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::olt::channel::{ChannelConnector, ConnectParams, ShellChannel};
use crate::olt::error::OltError;

/// Upper bound on exit/config commands issued while re-synchronising.
const MAX_UNWIND_STEPS: usize = 4;

/// Timeout for each command issued during a graceful close.
const CLOSE_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum characters of raw device output written to debug logs.
const LOG_PREVIEW_CHARS: usize = 500;

/// Substrings in a reply that mean the device refused the command.
const ERROR_MARKERS: &[&str] = &["error", "invalid", "unknown command", "unrecognized command"];

/// Current navigation mode of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "mode", content = "name", rename_all = "snake_case")]
pub enum CliContext {
    Disconnected,
    Global,
    ConfigGlobal,
    Interface(String),
}

impl fmt::Display for CliContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliContext::Disconnected => write!(f, "disconnected"),
            CliContext::Global => write!(f, "global"),
            CliContext::ConfigGlobal => write!(f, "config"),
            CliContext::Interface(name) => write!(f, "interface {}", name),
        }
    }
}

/// Vendor conventions the session needs to navigate modes.
#[derive(Debug, Clone)]
pub struct CliDialect {
    /// Commands sent right after login; the last one must land in configuration mode.
    pub handshake: &'static [&'static str],
    /// Enters configuration mode from the privileged prompt.
    pub config_command: &'static str,
    /// Leaves the current mode.
    pub exit_command: &'static str,
    /// Matches any prompt line.
    pub prompt_pattern: &'static str,
    /// Matches the configuration-mode prompt and nothing deeper.
    pub config_prompt_pattern: &'static str,
}

/// Returns the first refusal marker found in a device reply, case-insensitively.
pub(crate) fn find_error_marker(output: &str) -> Option<&'static str> {
    let lower = output.to_lowercase();
    ERROR_MARKERS.iter().copied().find(|m| lower.contains(m))
}

pub(crate) fn preview(output: &str) -> &str {
    match output.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((idx, _)) => &output[..idx],
        None => output,
    }
}

/// Result of one write-then-wait round trip.
struct Exchange {
    output: String,
    prompt_line: String,
}

enum ReadFailure {
    Channel(String),
    Timeout,
}

fn last_line(buffer: &str) -> &str {
    buffer
        .rsplit('\n')
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| c == '\r' || c.is_whitespace())
}

/// Strips the echoed command (first line) and the prompt (last line).
fn clean_output(raw: &str, command: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "");
    let mut lines: Vec<&str> = normalized.split('\n').collect();
    lines.pop();

    let command = command.trim();
    if !command.is_empty()
        && let Some(first) = lines.first()
        && first.trim_end().ends_with(command)
    {
        lines.remove(0);
    }

    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }

    lines.join("\n").trim_end().to_string()
}

/// Byte offset where the reply to `command` starts: the first complete line
/// ending with the echoed command. Anything before it is stale output.
fn reply_start(text: &str, command: &str) -> Option<usize> {
    let command = command.trim();
    if command.is_empty() {
        return Some(0);
    }
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.ends_with('\n') && line.trim_end().ends_with(command) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Polls until the echo of `command` and then a prompt have arrived.
///
/// Bytes are decoded only once whole, so multi-byte characters split
/// across reads survive. An empty `command` accepts the first prompt.
async fn read_until_prompt(
    channel: &mut dyn ShellChannel,
    prompt: &Regex,
    command: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<String, ReadFailure> {
    let deadline = Instant::now() + timeout;
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let chunk = channel
            .read_available()
            .await
            .map_err(ReadFailure::Channel)?;
        if !chunk.is_empty() {
            buffer.extend_from_slice(&chunk);
            let text = String::from_utf8_lossy(&buffer);
            if let Some(start) = reply_start(&text, command) {
                let reply = &text[start..];
                if prompt.is_match(last_line(reply)) {
                    if start > 0 {
                        debug!("Skipped {} stale bytes before echo of '{}'", start, command);
                    }
                    return Ok(reply.to_string());
                }
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ReadFailure::Timeout);
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

async fn exchange(
    channel: &mut dyn ShellChannel,
    command: &str,
    prompt: &Regex,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Exchange, ReadFailure> {
    let stale = channel
        .read_available()
        .await
        .map_err(ReadFailure::Channel)?;
    if !stale.is_empty() {
        debug!("Discarded {} stale bytes before '{}'", stale.len(), command);
    }

    channel
        .write(format!("{}\n", command).as_bytes())
        .await
        .map_err(ReadFailure::Channel)?;

    let raw = read_until_prompt(channel, prompt, command, timeout, poll_interval).await?;
    Ok(Exchange {
        prompt_line: last_line(&raw).to_string(),
        output: clean_output(&raw, command),
    })
}

/// One caller's logical command-line session.
pub struct CliSession {
    caller_id: String,
    dialect: CliDialect,
    prompt: Regex,
    config_prompt: Regex,
    channel: Option<Box<dyn ShellChannel>>,
    context: CliContext,
    needs_resync: bool,
    command_timeout: Duration,
    poll_interval: Duration,
}

impl fmt::Debug for CliSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliSession")
            .field("caller_id", &self.caller_id)
            .field("context", &self.context)
            .field("connected", &self.channel.is_some())
            .field("needs_resync", &self.needs_resync)
            .finish()
    }
}

impl CliSession {
    pub fn new(
        caller_id: &str,
        dialect: CliDialect,
        command_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, OltError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                OltError::protocol(caller_id, format!("invalid prompt pattern '{}': {}", pattern, e))
            })
        };
        Ok(Self {
            caller_id: caller_id.to_string(),
            prompt: compile(dialect.prompt_pattern)?,
            config_prompt: compile(dialect.config_prompt_pattern)?,
            dialect,
            channel: None,
            context: CliContext::Disconnected,
            needs_resync: false,
            command_timeout,
            poll_interval,
        })
    }

    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    pub fn context(&self) -> &CliContext {
        &self.context
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    fn transport(&self, message: impl Into<String>) -> OltError {
        OltError::transport(&self.caller_id, message)
    }

    fn protocol(&self, message: impl Into<String>) -> OltError {
        OltError::protocol(&self.caller_id, message)
    }

    /// Opens a channel and runs the login handshake without touching `self`.
    ///
    /// The returned channel sits at the configuration prompt. Hand it to
    /// [`attach`](Self::attach) to make it this session's channel.
    pub(crate) async fn establish(
        &self,
        connector: &dyn ChannelConnector,
        params: &ConnectParams,
    ) -> Result<Box<dyn ShellChannel>, OltError> {
        let mut channel = tokio::time::timeout(params.timeout, connector.connect(params))
            .await
            .map_err(|_| {
                self.transport(format!(
                    "connection to {} timed out after {}s",
                    params.address,
                    params.timeout.as_secs()
                ))
            })?
            .map_err(|e| self.transport(e))?;

        if let Err(e) = self.handshake(channel.as_mut(), params.timeout).await {
            channel.disconnect().await;
            return Err(e);
        }
        Ok(channel)
    }

    async fn handshake(&self, channel: &mut dyn ShellChannel, timeout: Duration) -> Result<(), OltError> {
        let banner = read_until_prompt(channel, &self.prompt, "", timeout, self.poll_interval).await;
        let mut prompt_line = match banner {
            Ok(raw) => last_line(&raw).to_string(),
            Err(ReadFailure::Timeout) => {
                return Err(self.protocol("handshake failed: no login prompt"));
            }
            Err(ReadFailure::Channel(e)) => {
                return Err(self.transport(format!("handshake failed: {}", e)));
            }
        };

        for command in self.dialect.handshake {
            match exchange(channel, command, &self.prompt, timeout, self.poll_interval).await {
                Ok(ex) => prompt_line = ex.prompt_line,
                Err(ReadFailure::Timeout) => {
                    return Err(self.protocol(format!("handshake failed: '{}' timed out", command)));
                }
                Err(ReadFailure::Channel(e)) => {
                    return Err(self.transport(format!("handshake failed: {}", e)));
                }
            }
        }

        if !self.config_prompt.is_match(&prompt_line) {
            return Err(self.protocol(format!(
                "handshake failed: expected configuration prompt, got '{}'",
                prompt_line
            )));
        }
        Ok(())
    }

    /// Adopts an established channel; the session is now in configuration mode.
    pub(crate) fn attach(&mut self, channel: Box<dyn ShellChannel>) {
        self.channel = Some(channel);
        self.context = CliContext::ConfigGlobal;
        self.needs_resync = false;
        info!("CLI session {} connected, context {}", self.caller_id, self.context);
    }

    /// One-shot connect: establishes and attaches if there is no channel yet.
    pub async fn connect(
        &mut self,
        connector: &dyn ChannelConnector,
        params: &ConnectParams,
    ) -> Result<(), OltError> {
        if self.channel.is_some() {
            return Ok(());
        }
        let channel = self.establish(connector, params).await?;
        self.attach(channel);
        Ok(())
    }

    fn drop_channel(&mut self) {
        self.channel = None;
        self.context = CliContext::Disconnected;
        self.needs_resync = false;
    }

    /// Raw round trip with no resync check; maps failures onto the taxonomy.
    async fn round_trip(
        &mut self,
        command: &str,
        expected: Option<&Regex>,
        timeout: Duration,
    ) -> Result<Exchange, OltError> {
        let Some(channel) = self.channel.as_deref_mut() else {
            return Err(OltError::transport(&self.caller_id, "session is not connected"));
        };
        let prompt = expected.unwrap_or(&self.prompt);

        match exchange(channel, command, prompt, timeout, self.poll_interval).await {
            Ok(ex) => {
                debug!(
                    "[{}] '{}' -> {}",
                    self.caller_id,
                    command,
                    preview(&ex.output)
                );
                Ok(ex)
            }
            Err(ReadFailure::Timeout) => {
                // A late reply may still move the device to another mode.
                self.needs_resync = true;
                warn!(
                    "[{}] '{}' timed out after {:?} waiting for prompt",
                    self.caller_id, command, timeout
                );
                Err(self.transport(format!(
                    "command '{}' timed out after {}s waiting for prompt",
                    command,
                    timeout.as_secs_f32()
                )))
            }
            Err(ReadFailure::Channel(e)) => {
                warn!("[{}] channel failed during '{}': {}", self.caller_id, command, e);
                self.drop_channel();
                Err(self.transport(format!("channel failed during '{}': {}", command, e)))
            }
        }
    }

    fn check_synchronised(&self) -> Result<(), OltError> {
        if self.needs_resync {
            return Err(self.protocol(
                "session context is unknown after a rejected or timed-out command; call ensure_global first",
            ));
        }
        Ok(())
    }

    /// Runs a command in the current context and waits for any prompt.
    pub async fn execute(&mut self, command: &str, timeout: Option<Duration>) -> Result<String, OltError> {
        self.check_synchronised()?;
        let timeout = timeout.unwrap_or(self.command_timeout);
        Ok(self.round_trip(command, None, timeout).await?.output)
    }

    /// Runs a command and waits for a prompt matching `prompt_pattern`.
    pub async fn execute_expect(
        &mut self,
        command: &str,
        prompt_pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<String, OltError> {
        self.check_synchronised()?;
        let expected = Regex::new(prompt_pattern).map_err(|e| {
            OltError::validation(&self.caller_id, format!("invalid prompt pattern: {}", e))
        })?;
        let timeout = timeout.unwrap_or(self.command_timeout);
        Ok(self.round_trip(command, Some(&expected), timeout).await?.output)
    }

    /// `interface <name>`.
    pub async fn enter_interface(&mut self, name: &str) -> Result<(), OltError> {
        self.enter_context(name, &format!("interface {}", name)).await
    }

    /// Enters a named sub-mode using an arbitrary entry command.
    pub async fn enter_context(&mut self, name: &str, entry_command: &str) -> Result<(), OltError> {
        self.check_synchronised()?;

        match self.context.clone() {
            CliContext::Interface(current) if current == name => return Ok(()),
            CliContext::Interface(_) => self.exit_interface().await?,
            CliContext::Global => self.enter_config().await?,
            CliContext::Disconnected => {
                return Err(self.transport("session is not connected"));
            }
            CliContext::ConfigGlobal => {}
        }

        let ex = self.round_trip(entry_command, None, self.command_timeout).await?;
        let rejected = find_error_marker(&ex.output);
        if rejected.is_some() || self.config_prompt.is_match(&ex.prompt_line) {
            self.needs_resync = true;
            warn!(
                "[{}] '{}' rejected, prompt '{}': {}",
                self.caller_id,
                entry_command,
                ex.prompt_line,
                preview(&ex.output)
            );
            return Err(self.protocol(format!(
                "failed to enter '{}': {}",
                name,
                if ex.output.is_empty() { "prompt did not change" } else { ex.output.as_str() }
            )));
        }

        self.context = CliContext::Interface(name.to_string());
        debug!("[{}] context {}", self.caller_id, self.context);
        Ok(())
    }

    /// Leaves the current interface back to configuration mode.
    pub async fn exit_interface(&mut self) -> Result<(), OltError> {
        self.check_synchronised()?;
        if !matches!(self.context, CliContext::Interface(_)) {
            return Err(self.protocol(format!("exit_interface called in context {}", self.context)));
        }

        let ex = self
            .round_trip(self.dialect.exit_command, None, self.command_timeout)
            .await?;
        if !self.config_prompt.is_match(&ex.prompt_line) {
            self.needs_resync = true;
            return Err(self.protocol(format!(
                "exit did not return to configuration mode, prompt '{}'",
                ex.prompt_line
            )));
        }

        self.context = CliContext::ConfigGlobal;
        Ok(())
    }

    /// Brings the session to configuration mode from wherever it is.
    ///
    /// Idempotent. Also clears the re-synchronisation flag by probing the
    /// real prompt and issuing exit/config commands until it matches.
    pub async fn ensure_global(&mut self) -> Result<(), OltError> {
        if self.channel.is_none() {
            return Ok(());
        }
        if self.needs_resync {
            return self.resync().await;
        }
        match self.context {
            CliContext::Interface(_) => self.exit_interface().await,
            CliContext::Global => self.enter_config().await,
            CliContext::ConfigGlobal | CliContext::Disconnected => Ok(()),
        }
    }

    async fn resync(&mut self) -> Result<(), OltError> {
        let mut prompt_line = self.round_trip("", None, self.command_timeout).await?.prompt_line;

        for _ in 0..MAX_UNWIND_STEPS {
            if self.config_prompt.is_match(&prompt_line) {
                self.context = CliContext::ConfigGlobal;
                self.needs_resync = false;
                info!("[{}] re-synchronised to configuration mode", self.caller_id);
                return Ok(());
            }
            let command = if prompt_line.contains('(') {
                self.dialect.exit_command
            } else {
                self.dialect.config_command
            };
            prompt_line = self.round_trip(command, None, self.command_timeout).await?.prompt_line;
        }

        Err(self.protocol(format!(
            "could not return to configuration mode, prompt '{}'",
            prompt_line
        )))
    }

    async fn enter_config(&mut self) -> Result<(), OltError> {
        let ex = self
            .round_trip(self.dialect.config_command, None, self.command_timeout)
            .await?;
        if !self.config_prompt.is_match(&ex.prompt_line) {
            self.needs_resync = true;
            return Err(self.protocol(format!(
                "'{}' did not reach configuration mode, prompt '{}'",
                self.dialect.config_command, ex.prompt_line
            )));
        }
        self.context = CliContext::ConfigGlobal;
        Ok(())
    }

    async fn leave_config(&mut self) -> Result<(), OltError> {
        let ex = self
            .round_trip(self.dialect.exit_command, None, self.command_timeout)
            .await?;
        if self.config_prompt.is_match(&ex.prompt_line) || ex.prompt_line.contains('(') {
            self.needs_resync = true;
            return Err(self.protocol(format!(
                "could not leave configuration mode, prompt '{}'",
                ex.prompt_line
            )));
        }
        self.context = CliContext::Global;
        Ok(())
    }

    /// Runs a command at the privileged prompt, then returns to configuration mode.
    ///
    /// Used for commands such as `write` that the device only accepts outside
    /// configuration mode.
    pub async fn execute_privileged(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, OltError> {
        self.ensure_global().await?;
        self.leave_config().await?;
        let result = self.execute(command, timeout).await;
        if self.channel.is_some() {
            self.enter_config().await?;
        }
        result
    }

    /// Writes a bare newline and waits for the prompt it produces.
    ///
    /// The prompt is consumed here so it cannot be read as the reply to the
    /// next command. A channel that errors or stays silent for the command
    /// timeout is closed.
    pub async fn liveness_probe(&mut self) -> bool {
        let (timeout, poll_interval) = (self.command_timeout, self.poll_interval);
        let Some(channel) = self.channel.as_deref_mut() else {
            return false;
        };
        let alive = match channel.write(b"\n").await {
            Ok(()) => read_until_prompt(channel, &self.prompt, "", timeout, poll_interval)
                .await
                .map_err(|e| match e {
                    ReadFailure::Channel(message) => message,
                    ReadFailure::Timeout => "no prompt".to_string(),
                }),
            Err(e) => Err(e),
        };
        match alive {
            Ok(_) => true,
            Err(e) => {
                debug!("[{}] liveness probe failed: {}", self.caller_id, e);
                if let Some(mut channel) = self.channel.take() {
                    channel.disconnect().await;
                }
                self.drop_channel();
                false
            }
        }
    }

    /// Unwinds to the privileged prompt best-effort, then closes the channel.
    pub async fn close(&mut self) {
        if self.channel.is_none() {
            self.context = CliContext::Disconnected;
            return;
        }

        let mut exits = match self.context {
            CliContext::Interface(_) => 2,
            CliContext::ConfigGlobal => 1,
            _ => 0,
        };
        if self.needs_resync {
            exits = 2;
        }
        for _ in 0..exits {
            if let Err(e) = self
                .round_trip(self.dialect.exit_command, None, CLOSE_STEP_TIMEOUT)
                .await
            {
                debug!("[{}] unwind during close failed: {}", self.caller_id, e);
                break;
            }
        }

        if let Some(mut channel) = self.channel.take() {
            channel.disconnect().await;
        }
        self.drop_channel();
        info!("CLI session {} closed", self.caller_id);
    }
}
