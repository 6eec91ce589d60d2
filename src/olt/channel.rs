//! Remote-shell channel primitive.
//!
//! The core never speaks the wire protocol itself. It drives an interactive
//! shell through two small traits:
//!
//! - [`ChannelConnector`]: establishes an authenticated channel from
//!   [`ConnectParams`].
//! - [`ShellChannel`]: raw text in, raw text out, plus disconnect.
//!
//! The production implementation lives in [`crate::olt::ssh`]; tests use the
//! scripted device in [`mock`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Everything a connector needs to open one channel.
#[derive(Clone)]
pub struct ConnectParams {
    pub address: String,
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_path", &self.key_path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// An interactive shell on the device.
///
/// `read_available` must never block waiting for data: it returns whatever
/// has arrived since the previous call, possibly nothing. An `Err` from any
/// method means the channel is no longer usable.
#[async_trait]
pub trait ShellChannel: Send {
    async fn write(&mut self, data: &[u8]) -> Result<(), String>;

    async fn read_available(&mut self) -> Result<Vec<u8>, String>;

    async fn disconnect(&mut self);
}

/// Factory for [`ShellChannel`]s.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn ShellChannel>, String>;
}
