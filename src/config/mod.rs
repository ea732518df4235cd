pub mod app;
pub mod diff;
pub mod pins;
pub mod settings;

pub use app::{AppSettings, KnownDevice, Timeouts};
pub use diff::{compute_diff_count, diff_report, Change, DiffReport};
pub use pins::{LogicalInput, PinMap, INPUTS_COUNT, PIN_COUNT};
pub use settings::{
    BoolSetting, BoolSettings, Calibration, DeviceSettings, IrSensitivity, ProfileRecord, RunMode,
    SettingsDocument, Tunable, TunableSettings, UsbIdentity, BOOL_SLOTS, PROFILE_COUNT,
    TUNABLE_SLOTS,
};

/// Rejected edits and malformed settings values.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Pin {0} is out of range (0-29)")]
    PinOutOfRange(u8),

    #[error("Profile {0} is out of range (0-3)")]
    ProfileOutOfRange(u8),

    #[error("Too many pin assignments ({0}), expected at most 25")]
    TooManyAssignments(usize),

    #[error("Unknown name: {0}")]
    UnknownName(String),

    #[error("Value {value} is out of range for {field}")]
    ValueOutOfRange { field: &'static str, value: i64 },

    #[error("Identity string {0:?} contains characters that cannot be sent to the device")]
    InvalidIdentity(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}
