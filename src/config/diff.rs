//! Working vs. synced comparison.
//!
//! Pure functions over two [`DeviceSettings`] copies; nothing here caches state.

use serde::Serialize;
use std::fmt;

use super::settings::{BoolSetting, DeviceSettings, IrSensitivity, RunMode, Tunable, PROFILE_COUNT};

/// A single counted difference between the working and synced copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Change {
    Boolean { setting: BoolSetting, from: bool, to: bool },
    PinMap,
    Tunable { tunable: Tunable, from: u16, to: u16 },
    UsbId { from: String, to: String },
    UsbName { from: String, to: String },
    SelectedProfile { from: u8, to: u8 },
    IrSensitivity { profile: u8, from: IrSensitivity, to: IrSensitivity },
    RunMode { profile: u8, from: RunMode, to: RunMode },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Boolean { setting, from, to } => write!(f, "{setting}: {from} -> {to}"),
            Change::PinMap => write!(f, "custom pin map changed"),
            Change::Tunable { tunable, from, to } => write!(f, "{tunable}: {from} -> {to}"),
            Change::UsbId { from, to } => write!(f, "usb id: {from:?} -> {to:?}"),
            Change::UsbName { from, to } => write!(f, "usb name: {from:?} -> {to:?}"),
            Change::SelectedProfile { from, to } => write!(f, "selected profile: {from} -> {to}"),
            Change::IrSensitivity { profile, from, to } => {
                write!(f, "profile {profile} ir sensitivity: {from:?} -> {to:?}")
            }
            Change::RunMode { profile, from, to } => {
                write!(f, "profile {profile} run mode: {from:?} -> {to:?}")
            }
        }
    }
}

/// Itemised changes, in commit order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub changes: Vec<Change>,
}

impl DiffReport {
    pub fn count(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes.is_empty() {
            return write!(f, "no pending changes");
        }
        writeln!(f, "{} pending change(s):", self.changes.len())?;
        for change in &self.changes {
            writeln!(f, "  - {change}")?;
        }
        Ok(())
    }
}

/// Number of differing fields. Zero means there is nothing to commit.
pub fn compute_diff_count(working: &DeviceSettings, synced: &DeviceSettings) -> usize {
    diff_report(working, synced).count()
}

pub fn diff_report(working: &DeviceSettings, synced: &DeviceSettings) -> DiffReport {
    let mut changes = Vec::new();

    // The custom-pins flag itself is never counted.
    for setting in BoolSetting::wire_slots() {
        let (to, from) = (working.booleans.get(setting), synced.booleans.get(setting));
        if to != from {
            changes.push(Change::Boolean { setting, from, to });
        }
    }

    if working.custom_pins() && working.pins.assignments() != synced.pins.assignments() {
        changes.push(Change::PinMap);
    }

    for tunable in Tunable::ALL {
        let (to, from) = (working.tunables.get(tunable), synced.tunables.get(tunable));
        if to != from {
            changes.push(Change::Tunable { tunable, from, to });
        }
    }

    if working.usb.id != synced.usb.id {
        changes.push(Change::UsbId { from: synced.usb.id.clone(), to: working.usb.id.clone() });
    }
    if working.usb.name != synced.usb.name {
        changes.push(Change::UsbName { from: synced.usb.name.clone(), to: working.usb.name.clone() });
    }

    if working.selected_profile != synced.selected_profile {
        changes.push(Change::SelectedProfile {
            from: synced.selected_profile,
            to: working.selected_profile,
        });
    }

    for profile in 0..PROFILE_COUNT {
        let (to, from) = (&working.profiles[profile], &synced.profiles[profile]);
        let profile = profile as u8;
        if to.ir_sensitivity != from.ir_sensitivity {
            changes.push(Change::IrSensitivity { profile, from: from.ir_sensitivity, to: to.ir_sensitivity });
        }
        if to.run_mode != from.run_mode {
            changes.push(Change::RunMode { profile, from: from.run_mode, to: to.run_mode });
        }
    }

    DiffReport { changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogicalInput;
    use pretty_assertions::assert_eq;

    #[test]
    fn identical_copies_have_no_diff() {
        let settings = DeviceSettings::default();
        assert_eq!(compute_diff_count(&settings, &settings), 0);
    }

    #[test]
    fn counts_every_field_without_short_circuit() {
        let synced = DeviceSettings::default();
        let mut working = synced.clone();
        working.booleans.set(BoolSetting::Rumble, true);
        working.booleans.set(BoolSetting::Nunchuck, true);
        working.tunables.set(Tunable::CustomLedCount, 4);
        working.usb.id = "7".into();
        working.usb.name = "P1".into();
        working.selected_profile = 2;
        working.profiles[1].ir_sensitivity = IrSensitivity::Highest;
        working.profiles[3].run_mode = RunMode::FrameAverage1;

        assert_eq!(compute_diff_count(&working, &synced), 8);
    }

    #[test]
    fn calibration_fields_are_excluded() {
        let synced = DeviceSettings::default();
        let mut working = synced.clone();
        working.profiles[0].calibration.x_center = 500;
        working.profiles[0].calibration.y_scale = -3;
        assert_eq!(compute_diff_count(&working, &synced), 0);
    }

    #[test]
    fn pin_map_ignored_when_custom_pins_off() {
        let synced = DeviceSettings::default();
        let mut working = synced.clone();
        working.pins.assign(3, Some(LogicalInput::Home)).unwrap();
        assert_eq!(compute_diff_count(&working, &synced), 0);

        working.booleans.set(BoolSetting::CustomPins, true);
        assert_eq!(compute_diff_count(&working, &synced), 1);
    }

    #[test]
    fn report_lists_old_and_new_values() {
        let synced = DeviceSettings::default();
        let mut working = synced.clone();
        working.tunables.set(Tunable::RumbleStrength, 200);

        let report = diff_report(&working, &synced);
        assert_eq!(
            report.changes,
            vec![Change::Tunable { tunable: Tunable::RumbleStrength, from: 0, to: 200 }]
        );
        assert!(report.to_string().contains("rumble-strength: 0 -> 200"));
    }
}
