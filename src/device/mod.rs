pub mod manager;
pub mod models;
pub mod policy;

pub use manager::DeviceManager;
pub use models::*;

use crate::config::SettingsError;
use crate::serial::SerialError;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device not found")]
    NotFound,

    #[error("Device already connected")]
    AlreadyConnected,

    #[error("Device not connected")]
    NotConnected,

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Protocol desync: {0}")]
    ProtocolDesync(String),

    #[error("Permission denied opening {0}")]
    PermissionDenied(String),

    #[error("Running as root is not allowed")]
    RootPrivilegeDisallowed,

    #[error("Invalid edit: {0}")]
    InvalidEdit(#[from] SettingsError),

    #[error("Not available while test mode is active")]
    TestModeActive,

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<SerialError> for DeviceError {
    fn from(e: SerialError) -> Self {
        match e {
            SerialError::PortNotFound(port) => DeviceError::TransportUnavailable(format!("port {} not found", port)),
            SerialError::ConnectionFailed(msg) => DeviceError::TransportUnavailable(msg),
            SerialError::PermissionDenied(port) => DeviceError::PermissionDenied(port),
            SerialError::NotConnected => DeviceError::NotConnected,
            SerialError::Timeout(what) => DeviceError::Timeout(what),
            SerialError::ProtocolDesync(what) => DeviceError::ProtocolDesync(what),
            SerialError::CommandRejected { command, reply } => {
                DeviceError::CommitFailed(format!("{} answered {:?}", command, reply))
            }
            SerialError::IoError(e) => DeviceError::TransportUnavailable(e.to_string()),
            SerialError::SerialportError(e) => DeviceError::TransportUnavailable(e.to_string()),
        }
    }
}

impl DeviceError {
    /// Errors that end the session or the process rather than a single sequence
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::PermissionDenied(_) | DeviceError::RootPrivilegeDisallowed)
    }

    /// What the operator can do about it
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            DeviceError::PermissionDenied(_) => Some(
                "Add your user to the dialout group with `sudo usermod -aG dialout $USER`, then log out and back in.",
            ),
            DeviceError::RootPrivilegeDisallowed => {
                Some("Run as a regular user; serial access is granted through the dialout group.")
            }
            DeviceError::TransportUnavailable(_) => {
                Some("Check the cable and that the gun is running P.I.G.S firmware, then retry.")
            }
            DeviceError::Timeout(_) | DeviceError::ProtocolDesync(_) => {
                Some("Reconnect to reload the settings from the gun.")
            }
            DeviceError::CommitFailed(_) => Some("Nothing was marked as saved; commit again to retry."),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
