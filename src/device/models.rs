use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DiffReport, SettingsDocument};
use crate::serial::SerialDeviceInfo;

// Re-export serial protocol models
pub use crate::serial::feed::{Point, StatusEvent, TestPoints};
pub use crate::serial::protocol::{BoardIdentity, BoardType, CommitProgress, LoadStage};

/// Device connection state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

/// Session lifecycle, from first probe to synced and back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Probing,
    Identified,
    LoadingBooleans,
    LoadingPins,
    LoadingTunables,
    LoadingProfiles,
    Synced,
    Editing,
    Committing,
    TestMode,
}

impl From<LoadStage> for SessionState {
    fn from(stage: LoadStage) -> Self {
        match stage {
            LoadStage::Probing => SessionState::Probing,
            LoadStage::Identified => SessionState::Identified,
            LoadStage::Booleans => SessionState::LoadingBooleans,
            LoadStage::Pins => SessionState::LoadingPins,
            LoadStage::Tunables => SessionState::LoadingTunables,
            LoadStage::Profiles => SessionState::LoadingProfiles,
        }
    }
}

/// A discovered light gun
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub port_name: String,
    pub display_name: Option<String>,
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub connection_state: ConnectionState,
    pub board: Option<BoardIdentity>,
    pub last_seen: DateTime<Utc>,
}

impl Device {
    pub fn from_serial_info(info: &SerialDeviceInfo) -> Self {
        Self {
            id: Uuid::new_v4(),
            port_name: info.port_name.clone(),
            display_name: info.display_name.clone(),
            vid: info.vid,
            pid: info.pid,
            serial_number: info.serial_number.clone(),
            manufacturer: info.manufacturer.clone(),
            product: info.product.clone(),
            connection_state: ConnectionState::Disconnected,
            board: None,
            last_seen: Utc::now(),
        }
    }

    pub fn serial_info(&self) -> SerialDeviceInfo {
        SerialDeviceInfo {
            port_name: self.port_name.clone(),
            vid: self.vid,
            pid: self.pid,
            serial_number: self.serial_number.clone(),
            manufacturer: self.manufacturer.clone(),
            product: self.product.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state, ConnectionState::Connected)
    }

    pub fn update_connection_state(&mut self, state: ConnectionState) {
        self.connection_state = state;
        self.last_seen = Utc::now();
    }

    pub fn update_board(&mut self, board: BoardIdentity) {
        self.board = Some(board);
        self.last_seen = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOutcome {
    Committed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PulseKind {
    Rumble,
    Solenoid,
}

/// Point-in-time view of the open session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub port_name: String,
    pub state: SessionState,
    pub board: BoardIdentity,
    pub board_name: &'static str,
    pub document: SettingsDocument,
    pub diff: DiffReport,
}
