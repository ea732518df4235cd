use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::diff::{self, DiffReport};
use super::pins::{normalize, LogicalInput, PinMap};
use super::SettingsError;

pub const BOOL_SLOTS: usize = 8;
pub const TUNABLE_SLOTS: usize = 8;
pub const PROFILE_COUNT: usize = 4;

/// Named boolean slots.
///
/// Slot 0 mirrors the custom-pins flag, which travels with the pin group
/// (`Xlp` / `Xm.1.0`) rather than with the boolean block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BoolSetting {
    CustomPins = 0,
    Rumble,
    Solenoid,
    Autofire,
    SimplePause,
    HoldToPause,
    CommonAnode,
    Nunchuck,
}

impl BoolSetting {
    pub const ALL: [BoolSetting; BOOL_SLOTS] = [
        BoolSetting::CustomPins,
        BoolSetting::Rumble,
        BoolSetting::Solenoid,
        BoolSetting::Autofire,
        BoolSetting::SimplePause,
        BoolSetting::HoldToPause,
        BoolSetting::CommonAnode,
        BoolSetting::Nunchuck,
    ];

    /// Slots carried by the boolean block on the wire, in order
    pub fn wire_slots() -> impl Iterator<Item = BoolSetting> {
        Self::ALL.into_iter().skip(1)
    }

    pub fn slot(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            BoolSetting::CustomPins => "custom-pins",
            BoolSetting::Rumble => "rumble",
            BoolSetting::Solenoid => "solenoid",
            BoolSetting::Autofire => "autofire",
            BoolSetting::SimplePause => "simple-pause",
            BoolSetting::HoldToPause => "hold-to-pause",
            BoolSetting::CommonAnode => "common-anode",
            BoolSetting::Nunchuck => "nunchuck",
        }
    }
}

impl fmt::Display for BoolSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BoolSetting {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|b| normalize(b.name()) == wanted)
            .ok_or_else(|| SettingsError::UnknownName(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tunable {
    RumbleStrength = 0,
    RumbleInterval,
    SolenoidNormalInterval,
    SolenoidFastInterval,
    SolenoidHoldLength,
    CustomLedCount,
    AutofireWaitFactor,
    HoldToPauseLength,
}

impl Tunable {
    pub const ALL: [Tunable; TUNABLE_SLOTS] = [
        Tunable::RumbleStrength,
        Tunable::RumbleInterval,
        Tunable::SolenoidNormalInterval,
        Tunable::SolenoidFastInterval,
        Tunable::SolenoidHoldLength,
        Tunable::CustomLedCount,
        Tunable::AutofireWaitFactor,
        Tunable::HoldToPauseLength,
    ];

    pub fn slot(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Tunable::RumbleStrength => "rumble-strength",
            Tunable::RumbleInterval => "rumble-interval",
            Tunable::SolenoidNormalInterval => "solenoid-normal-interval",
            Tunable::SolenoidFastInterval => "solenoid-fast-interval",
            Tunable::SolenoidHoldLength => "solenoid-hold-length",
            Tunable::CustomLedCount => "custom-led-count",
            Tunable::AutofireWaitFactor => "autofire-wait-factor",
            Tunable::HoldToPauseLength => "hold-to-pause-length",
        }
    }
}

impl fmt::Display for Tunable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tunable {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|t| normalize(t.name()) == wanted)
            .ok_or_else(|| SettingsError::UnknownName(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoolSettings([bool; BOOL_SLOTS]);

impl BoolSettings {
    pub fn get(&self, setting: BoolSetting) -> bool {
        self.0[setting.slot()]
    }

    pub fn set(&mut self, setting: BoolSetting, value: bool) {
        self.0[setting.slot()] = value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TunableSettings([u16; TUNABLE_SLOTS]);

impl TunableSettings {
    pub fn get(&self, tunable: Tunable) -> u16 {
        self.0[tunable.slot()]
    }

    pub fn set(&mut self, tunable: Tunable, value: u16) {
        self.0[tunable.slot()] = value;
    }

    pub fn from_slots(slots: [u16; TUNABLE_SLOTS]) -> Self {
        Self(slots)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum IrSensitivity {
    #[default]
    Default = 0,
    Higher,
    Highest,
}

impl IrSensitivity {
    pub fn from_wire(value: i64) -> Result<Self, SettingsError> {
        match value {
            0 => Ok(IrSensitivity::Default),
            1 => Ok(IrSensitivity::Higher),
            2 => Ok(IrSensitivity::Highest),
            _ => Err(SettingsError::ValueOutOfRange { field: "ir sensitivity", value }),
        }
    }

    pub fn wire(self) -> u8 {
        self as u8
    }
}

impl FromStr for IrSensitivity {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "default" | "0" => Ok(IrSensitivity::Default),
            "higher" | "1" => Ok(IrSensitivity::Higher),
            "highest" | "2" => Ok(IrSensitivity::Highest),
            _ => Err(SettingsError::UnknownName(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum RunMode {
    #[default]
    Normal = 0,
    FrameAverage1,
    FrameAverage2,
}

impl RunMode {
    pub fn from_wire(value: i64) -> Result<Self, SettingsError> {
        match value {
            0 => Ok(RunMode::Normal),
            1 => Ok(RunMode::FrameAverage1),
            2 => Ok(RunMode::FrameAverage2),
            _ => Err(SettingsError::ValueOutOfRange { field: "run mode", value }),
        }
    }

    pub fn wire(self) -> u8 {
        self as u8
    }
}

impl FromStr for RunMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "normal" | "0" => Ok(RunMode::Normal),
            "frameaverage1" | "average1" | "1" => Ok(RunMode::FrameAverage1),
            "frameaverage2" | "average2" | "2" => Ok(RunMode::FrameAverage2),
            _ => Err(SettingsError::UnknownName(s.to_string())),
        }
    }
}

/// Calibration produced on the device; never edited from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Calibration {
    pub x_scale: i32,
    pub y_scale: i32,
    pub x_center: i32,
    pub y_center: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub calibration: Calibration,
    pub ir_sensitivity: IrSensitivity,
    pub run_mode: RunMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsbIdentity {
    pub id: String,
    pub name: String,
}

/// One full copy of the device's editable state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub booleans: BoolSettings,
    pub pins: PinMap,
    pub tunables: TunableSettings,
    pub usb: UsbIdentity,
    pub selected_profile: u8,
    pub profiles: [ProfileRecord; PROFILE_COUNT],
}

impl DeviceSettings {
    pub fn custom_pins(&self) -> bool {
        self.booleans.get(BoolSetting::CustomPins)
    }

    pub fn profile(&self, profile: u8) -> Result<&ProfileRecord, SettingsError> {
        self.profiles
            .get(profile as usize)
            .ok_or(SettingsError::ProfileOutOfRange(profile))
    }

    fn profile_mut(&mut self, profile: u8) -> Result<&mut ProfileRecord, SettingsError> {
        self.profiles
            .get_mut(profile as usize)
            .ok_or(SettingsError::ProfileOutOfRange(profile))
    }
}

/// Working copy plus last-synced copy of the device settings.
///
/// Every edit goes to the working copy. The synced copy only changes when a load
/// installs fresh device state or a commit has been confirmed by the device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettingsDocument {
    working: DeviceSettings,
    synced: DeviceSettings,
}

impl SettingsDocument {
    /// Document freshly loaded from a device: both copies equal
    pub fn from_loaded(settings: DeviceSettings) -> Self {
        Self {
            working: settings.clone(),
            synced: settings,
        }
    }

    pub fn working(&self) -> &DeviceSettings {
        &self.working
    }

    pub fn synced(&self) -> &DeviceSettings {
        &self.synced
    }

    pub fn set_bool(&mut self, setting: BoolSetting, value: bool) {
        self.working.booleans.set(setting, value);
    }

    pub fn set_tunable(&mut self, tunable: Tunable, value: u16) {
        self.working.tunables.set(tunable, value);
    }

    pub fn assign_pin(&mut self, pin: u8, input: Option<LogicalInput>) -> Result<(), SettingsError> {
        self.working.pins.assign(pin, input)
    }

    pub fn set_ir_sensitivity(&mut self, profile: u8, value: IrSensitivity) -> Result<(), SettingsError> {
        self.working.profile_mut(profile)?.ir_sensitivity = value;
        Ok(())
    }

    pub fn set_run_mode(&mut self, profile: u8, value: RunMode) -> Result<(), SettingsError> {
        self.working.profile_mut(profile)?.run_mode = value;
        Ok(())
    }

    pub fn set_usb_id(&mut self, id: &str) -> Result<(), SettingsError> {
        self.working.usb.id = validate_identity(id)?;
        Ok(())
    }

    pub fn set_usb_name(&mut self, name: &str) -> Result<(), SettingsError> {
        self.working.usb.name = validate_identity(name)?;
        Ok(())
    }

    pub fn select_profile(&mut self, profile: u8) -> Result<(), SettingsError> {
        if profile as usize >= PROFILE_COUNT {
            return Err(SettingsError::ProfileOutOfRange(profile));
        }
        self.working.selected_profile = profile;
        Ok(())
    }

    /// Calibration reported by the device for `profile`
    pub fn apply_calibration(&mut self, profile: u8, calibration: Calibration) -> Result<(), SettingsError> {
        self.working.profile_mut(profile)?.calibration = calibration;
        Ok(())
    }

    /// Drop all pending edits
    pub fn revert(&mut self) {
        self.working = self.synced.clone();
    }

    /// Reconcile the synced copy after the device confirmed a save.
    pub fn mark_committed(&mut self) {
        self.synced = self.working.clone();
        // With custom pins off the device forgets the map.
        if !self.synced.custom_pins() {
            self.synced.pins.clear();
        }
    }

    pub fn diff_count(&self) -> usize {
        diff::compute_diff_count(&self.working, &self.synced)
    }

    pub fn diff_report(&self) -> DiffReport {
        diff::diff_report(&self.working, &self.synced)
    }

    pub fn has_changes(&self) -> bool {
        self.diff_count() > 0
    }
}

fn validate_identity(value: &str) -> Result<String, SettingsError> {
    if value.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        Ok(value.to_string())
    } else {
        Err(SettingsError::InvalidIdentity(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn loaded() -> SettingsDocument {
        let mut settings = DeviceSettings::default();
        settings.booleans.set(BoolSetting::Rumble, true);
        settings.tunables.set(Tunable::RumbleStrength, 255);
        settings.usb.id = "1".into();
        settings.usb.name = "Piggie".into();
        SettingsDocument::from_loaded(settings)
    }

    #[test]
    fn loaded_document_has_no_changes() {
        let doc = loaded();
        assert_eq!(doc.working(), doc.synced());
        assert_eq!(doc.diff_count(), 0);
    }

    #[test]
    fn every_boolean_edit_counts_and_reverts() {
        for setting in BoolSetting::wire_slots() {
            let mut doc = loaded();
            let before = doc.working().booleans.get(setting);
            doc.set_bool(setting, !before);
            assert!(doc.diff_count() >= 1, "{setting} edit not counted");
            doc.set_bool(setting, before);
            assert_eq!(doc.diff_count(), 0, "{setting} revert still counted");
        }
    }

    #[test]
    fn custom_pins_toggle_alone_is_not_a_change() {
        let mut doc = loaded();
        doc.set_bool(BoolSetting::CustomPins, true);
        assert_eq!(doc.diff_count(), 0);

        doc.assign_pin(5, Some(LogicalInput::Trigger)).unwrap();
        assert_eq!(doc.diff_count(), 1);
        doc.assign_pin(7, Some(LogicalInput::ButtonA)).unwrap();
        assert_eq!(doc.diff_count(), 1, "pin map counts as one unit");
    }

    #[test]
    fn commit_reconciles_synced_copy() {
        let mut doc = loaded();
        doc.set_bool(BoolSetting::Rumble, false);
        doc.set_tunable(Tunable::HoldToPauseLength, 3000);
        assert_eq!(doc.diff_count(), 2);

        doc.mark_committed();
        assert_eq!(doc.diff_count(), 0);
        assert!(!doc.synced().booleans.get(BoolSetting::Rumble));
    }

    #[test]
    fn commit_without_custom_pins_forgets_map() {
        let mut doc = loaded();
        doc.assign_pin(2, Some(LogicalInput::Start)).unwrap();
        doc.mark_committed();
        assert_eq!(doc.synced().pins, PinMap::unmapped());
        assert_eq!(doc.diff_count(), 0);
    }

    #[test]
    fn calibration_from_device_is_not_a_change() {
        let mut doc = loaded();
        let calibration = Calibration { x_scale: 10, y_scale: 20, x_center: 512, y_center: 384 };
        doc.apply_calibration(2, calibration).unwrap();
        assert_eq!(doc.working().profiles[2].calibration, calibration);
        assert_eq!(doc.diff_count(), 0);
    }

    #[test]
    fn out_of_range_profile_is_rejected() {
        let mut doc = loaded();
        assert!(doc.select_profile(4).is_err());
        assert!(doc.set_run_mode(9, RunMode::Normal).is_err());
        assert_eq!(doc.diff_count(), 0);
    }

    #[test]
    fn identity_strings_must_be_printable_ascii() {
        let mut doc = loaded();
        assert!(doc.set_usb_name("Player One").is_ok());
        assert!(doc.set_usb_name("bad\nname").is_err());
        assert_eq!(doc.working().usb.name, "Player One");
    }

    #[test]
    fn revert_discards_edits() {
        let mut doc = loaded();
        doc.set_usb_id("42").unwrap();
        doc.select_profile(3).unwrap();
        doc.revert();
        assert_eq!(doc.diff_count(), 0);
    }

    #[test]
    fn setting_names_parse() {
        assert_eq!("hold_to_pause".parse::<BoolSetting>().unwrap(), BoolSetting::HoldToPause);
        assert_eq!("Rumble-Strength".parse::<Tunable>().unwrap(), Tunable::RumbleStrength);
        assert_eq!("highest".parse::<IrSensitivity>().unwrap(), IrSensitivity::Highest);
        assert_eq!("2".parse::<RunMode>().unwrap(), RunMode::FrameAverage2);
    }
}
