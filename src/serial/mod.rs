pub mod feed;
pub mod interface;
pub mod link;
pub mod protocol;
pub mod scripted;
pub mod simulator;

pub use interface::SerialInterface;
pub use link::{ChannelGuard, SerialLink};
pub use protocol::ConfigProtocol;
pub use scripted::{ScriptHandle, ScriptedTransport};
pub use simulator::SimulatedGun;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialDeviceInfo {
    pub port_name: String,
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    /// Friendly name from the known-device table
    pub display_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Permission denied opening {0}")]
    PermissionDenied(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Protocol desync: {0}")]
    ProtocolDesync(String),

    #[error("Device rejected {command}: {reply}")]
    CommandRejected { command: String, reply: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// Upper bound on lines discarded by one drain
const MAX_DRAIN_LINES: usize = 512;

/// Line-oriented byte channel to a light gun.
///
/// Implemented by [`SerialInterface`] for real hardware and by
/// [`ScriptedTransport`] for the in-process simulator.
#[async_trait]
pub trait LineTransport: Send {
    /// Write one command; the newline terminator is added here.
    ///
    /// The transport enforces `timeout_ms` itself and reports a stalled write
    /// as [`SerialError::Timeout`].
    async fn write_line(&mut self, line: &str, timeout_ms: u64) -> Result<()>;

    /// Next non-empty line with surrounding whitespace trimmed, or `None`
    /// once `timeout_ms` passes without a complete line.
    async fn read_line(&mut self, timeout_ms: u64) -> Result<Option<String>>;

    /// Discard everything already buffered, returning the number of lines dropped.
    async fn drain(&mut self, quiet_ms: u64) -> Result<usize> {
        let mut dropped = 0;
        while dropped < MAX_DRAIN_LINES {
            match self.read_line(quiet_ms).await? {
                Some(line) => log::debug!("Drained stale line: {}", line),
                None => break,
            }
            dropped += 1;
        }
        Ok(dropped)
    }

    fn close(&mut self);

    fn is_open(&self) -> bool;
}
