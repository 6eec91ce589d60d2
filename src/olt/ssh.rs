//! SSH implementation of the shell channel primitive.
//!
//! [`SshConnector`] opens a TCP connection with `russh`, authenticates
//! (password first, then private key), requests a PTY and an interactive
//! shell, and hands back an [`SshShell`].
//!
//! # Reading
//!
//! A background task owns the read half of the channel and appends every
//! `Data`/`ExtendedData` message to a shared buffer. `read_available` drains
//! that buffer without waiting, which is what the prompt-polling loop in
//! [`crate::olt::cli`] expects. Once the server sends EOF/close (or the
//! reader is cancelled) the channel is marked closed and every further call
//! errors.
//!
//! # Host keys
//!
//! All server keys are accepted, like `StrictHostKeyChecking=no`. OLTs are
//! typically reached over a management network with self-generated keys.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use russh::{ChannelMsg, ChannelWriteHalf, client, keys};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::olt::channel::{ChannelConnector, ConnectParams, ShellChannel};

/// Terminal geometry requested for the PTY. Wide enough that tables don't wrap.
const PTY_COLUMNS: u32 = 512;
const PTY_ROWS: u32 = 100;
const PTY_TERM: &str = "vt100";

/// russh handler that accepts every host key.
pub struct OltSshHandler;

impl client::Handler for OltSshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Client configuration: no inactivity timeout (the pool reaps idle
/// sessions itself), keepalives every 30 seconds.
pub(crate) fn build_client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// Splits `host:port`, defaulting to port 22.
pub(crate) fn parse_address(address: &str) -> Result<(String, u16), String> {
    if let Some((host, port_str)) = address.rsplit_once(':') {
        let port = port_str
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {}", e))?;
        Ok((host.to_string(), port))
    } else {
        Ok((address.to_string(), 22))
    }
}

async fn authenticate_password(
    handle: &mut client::Handle<OltSshHandler>,
    username: &str,
    password: &str,
) -> Result<bool, String> {
    let result = handle
        .authenticate_password(username, password)
        .await
        .map_err(|e| format!("Password authentication failed: {}", e))?;
    Ok(result.success())
}

async fn authenticate_key(
    handle: &mut client::Handle<OltSshHandler>,
    username: &str,
    key_path: &str,
) -> Result<bool, String> {
    let key_pair = keys::load_secret_key(Path::new(key_path), None)
        .map_err(|e| format!("Failed to load private key from {}: {}", key_path, e))?;

    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .ok()
        .flatten()
        .flatten();
    debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

    let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);
    let result = handle
        .authenticate_publickey(username, key_with_hash)
        .await
        .map_err(|e| format!("Key authentication failed: {}", e))?;
    Ok(result.success())
}

/// Tries the configured credentials in order: password, then key.
async fn authenticate(
    handle: &mut client::Handle<OltSshHandler>,
    params: &ConnectParams,
) -> Result<(), String> {
    let mut last_error = None;

    if let Some(password) = params.password.as_deref() {
        match authenticate_password(handle, &params.username, password).await {
            Ok(true) => return Ok(()),
            Ok(false) => debug!("Password rejected for {}", params.username),
            Err(e) => last_error = Some(e),
        }
    }

    if let Some(key_path) = params.key_path.as_deref() {
        match authenticate_key(handle, &params.username, key_path).await {
            Ok(true) => return Ok(()),
            Ok(false) => debug!("Key rejected for {}", params.username),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        "Authentication failed: no authentication methods succeeded".to_string()
    }))
}

/// Opens SSH shells against the configured device.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshConnector;

#[async_trait]
impl ChannelConnector for SshConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn ShellChannel>, String> {
        let (host, port) = parse_address(&params.address)?;
        let connect_future = client::connect(build_client_config(), (host.as_str(), port), OltSshHandler);

        let mut handle = tokio::time::timeout(params.timeout, connect_future)
            .await
            .map_err(|_| format!("Connection timed out after {:?}", params.timeout))?
            .map_err(|e| format!("Failed to connect: {}", e))?;

        authenticate(&mut handle, params).await?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| format!("Failed to open session channel: {}", e))?;
        channel
            .request_pty(true, PTY_TERM, PTY_COLUMNS, PTY_ROWS, 0, 0, &[])
            .await
            .map_err(|e| format!("Failed to request PTY: {}", e))?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| format!("Failed to request shell: {}", e))?;

        info!("SSH shell opened to {}@{}", params.username, params.address);
        Ok(Box::new(SshShell::spawn(handle, channel)))
    }
}

/// Interactive PTY shell backed by a russh channel.
pub struct SshShell {
    // Keeps the connection alive for as long as the shell exists.
    handle: client::Handle<OltSshHandler>,
    writer: ChannelWriteHalf<client::Msg>,
    output: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
    cancel_token: CancellationToken,
}

impl SshShell {
    fn spawn(handle: client::Handle<OltSshHandler>, channel: russh::Channel<client::Msg>) -> Self {
        let (mut read_half, writer) = channel.split();
        let output = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let cancel_token = CancellationToken::new();

        let task_output = output.clone();
        let task_closed = closed.clone();
        let task_token = cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    msg = read_half.wait() => match msg {
                        Some(ChannelMsg::Data { data }) => {
                            task_output.lock().await.extend_from_slice(&data);
                        }
                        Some(ChannelMsg::ExtendedData { data, .. }) => {
                            task_output.lock().await.extend_from_slice(&data);
                        }
                        Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                        Some(_) => {}
                    }
                }
            }
            task_closed.store(true, Ordering::SeqCst);
            debug!("SSH shell reader stopped");
        });

        Self {
            handle,
            writer,
            output,
            closed,
            cancel_token,
        }
    }
}

#[async_trait]
impl ShellChannel for SshShell {
    async fn write(&mut self, data: &[u8]) -> Result<(), String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("Channel closed".to_string());
        }
        self.writer
            .data(data)
            .await
            .map_err(|e| format!("Failed to write to shell: {}", e))
    }

    async fn read_available(&mut self) -> Result<Vec<u8>, String> {
        let mut output = self.output.lock().await;
        if output.is_empty() && self.closed.load(Ordering::SeqCst) {
            return Err("Channel closed".to_string());
        }
        Ok(std::mem::take(&mut *output))
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.writer.close().await {
            debug!("Failed to close shell channel: {}", e);
        }
        self.cancel_token.cancel();
        self.closed.store(true, Ordering::SeqCst);
        if let Err(e) = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
        {
            warn!("SSH disconnect failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod address_parsing {
        use super::*;

        #[test]
        fn test_host_and_port() {
            let (host, port) = parse_address("10.0.0.62:2222").unwrap();
            assert_eq!(host, "10.0.0.62");
            assert_eq!(port, 2222);
        }

        #[test]
        fn test_default_port() {
            let (host, port) = parse_address("olt.example.net").unwrap();
            assert_eq!(host, "olt.example.net");
            assert_eq!(port, 22);
        }

        #[test]
        fn test_invalid_port() {
            let err = parse_address("10.0.0.62:ssh").unwrap_err();
            assert!(err.contains("Invalid port number"));
        }
    }

    mod client_config {
        use super::*;

        #[test]
        fn test_no_inactivity_timeout() {
            let config = build_client_config();
            assert_eq!(config.inactivity_timeout, None);
        }

        #[test]
        fn test_keepalive_settings() {
            let config = build_client_config();
            assert_eq!(config.keepalive_interval, Some(Duration::from_secs(30)));
            assert_eq!(config.keepalive_max, 3);
        }
    }
}
