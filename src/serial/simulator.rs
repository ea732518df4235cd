use std::sync::{Arc, Mutex, MutexGuard};

use super::protocol::{
    BoardIdentity, BoardType, IDENTITY_READ_ERROR, PIN_SENTINEL, SAVE_STARTED, STORAGE_CLEARED,
    TEST_MODE_ENTERED,
};
use super::ScriptedTransport;
use crate::config::{
    BoolSetting, Calibration, DeviceSettings, IrSensitivity, LogicalInput, RunMode, Tunable,
    PIN_COUNT, PROFILE_COUNT, TUNABLE_SLOTS,
};

#[derive(Debug)]
struct GunState {
    board: BoardIdentity,
    settings: DeviceSettings,
    saves: usize,
    sets_acked: usize,
    silent_after_sets: Option<usize>,
    silent: bool,
    omit_sentinel: bool,
    test_mode: bool,
}

/// Firmware stand-in answering the configuration command set.
///
/// Cloning shares the same device, so a test can keep a handle while the
/// transport owns another.
#[derive(Debug, Clone)]
pub struct SimulatedGun {
    state: Arc<Mutex<GunState>>,
}

impl SimulatedGun {
    pub fn new() -> Self {
        Self::with_settings(demo_settings())
    }

    pub fn with_settings(settings: DeviceSettings) -> Self {
        let board = BoardIdentity {
            firmware_version: 2.0,
            codename: "Sunrise".to_string(),
            board_type: BoardType::RpiPico,
        };
        Self {
            state: Arc::new(Mutex::new(GunState {
                board,
                settings,
                saves: 0,
                sets_acked: 0,
                silent_after_sets: None,
                silent: false,
                omit_sentinel: false,
                test_mode: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Transport wired to this gun
    pub fn transport(&self) -> (ScriptedTransport, super::ScriptHandle) {
        let gun = self.clone();
        ScriptedTransport::new(move |line| gun.respond(line))
    }

    /// Current device-side settings
    pub fn settings(&self) -> DeviceSettings {
        self.lock().settings.clone()
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    pub fn in_test_mode(&self) -> bool {
        self.lock().test_mode
    }

    /// Stop answering after `count` acknowledged set commands
    pub fn go_silent_after_sets(&self, count: usize) {
        self.lock().silent_after_sets = Some(count);
    }

    /// Leave the `-127` terminator off the pin block
    pub fn omit_pin_sentinel(&self, omit: bool) {
        self.lock().omit_sentinel = omit;
    }

    pub fn respond(&self, line: &str) -> Vec<String> {
        let mut state = self.lock();
        if state.silent {
            return Vec::new();
        }
        match line {
            "XP" => vec![
                "P.I.G.S Light Gun".to_string(),
                format!("{:.1}", state.board.firmware_version),
                state.board.codename.clone(),
                state.board.board_type.token().to_string(),
                state.settings.selected_profile.to_string(),
            ],
            "Xln" => vec![identity_reply(&state.settings.usb.name)],
            "Xli" => vec![identity_reply(&state.settings.usb.id)],
            "Xlb" => BoolSetting::wire_slots()
                .map(|b| u8::from(state.settings.booleans.get(b)).to_string())
                .collect(),
            "Xlp" => pin_block(&state),
            "Xls" => Tunable::ALL.iter().map(|t| state.settings.tunables.get(*t).to_string()).collect(),
            "Xm" | "." | "Xtr" | "Xts" => Vec::new(),
            "XS" => {
                state.saves += 1;
                vec![SAVE_STARTED.to_string(), "Settings saved to flash.".to_string()]
            }
            "XT" => {
                state.test_mode = true;
                vec![TEST_MODE_ENTERED.to_string()]
            }
            "XE" => {
                state.test_mode = false;
                Vec::new()
            }
            "Xc" => {
                state.settings = DeviceSettings::default();
                vec![STORAGE_CLEARED.to_string()]
            }
            "XC1C" => calibrate(&mut state),
            _ => {
                if let Some(rest) = line.strip_prefix("XlP") {
                    profile_block(&state, rest)
                } else if let Some(rest) = line.strip_prefix("Xm.") {
                    apply_set(&mut state, rest)
                } else if let Some(rest) = line.strip_prefix("XC") {
                    match rest.parse::<u8>() {
                        Ok(n) if (1..=PROFILE_COUNT as u8).contains(&n) => {
                            state.settings.selected_profile = n - 1;
                            Vec::new()
                        }
                        _ => vec![format!("NOENT: {}", line)],
                    }
                } else {
                    vec![format!("NOENT: {}", line)]
                }
            }
        }
    }
}

impl Default for SimulatedGun {
    fn default() -> Self {
        Self::new()
    }
}

/// A plausible freshly configured gun
pub fn demo_settings() -> DeviceSettings {
    let mut settings = DeviceSettings::default();
    settings.booleans.set(BoolSetting::Rumble, true);
    settings.booleans.set(BoolSetting::Solenoid, true);
    settings.booleans.set(BoolSetting::HoldToPause, true);
    let tunables: [u16; TUNABLE_SLOTS] = [255, 150, 45, 30, 500, 1, 3, 2500];
    for (tunable, value) in Tunable::ALL.into_iter().zip(tunables) {
        settings.tunables.set(tunable, value);
    }
    settings.usb.id = "1".to_string();
    settings.usb.name = "P.I.G.S Gun".to_string();
    for (n, profile) in settings.profiles.iter_mut().enumerate() {
        profile.calibration = Calibration { x_scale: 0, y_scale: 0, x_center: 512, y_center: 384 };
        profile.ir_sensitivity = if n == 3 { IrSensitivity::Higher } else { IrSensitivity::Default };
    }
    settings
}

fn identity_reply(value: &str) -> String {
    if value.is_empty() {
        IDENTITY_READ_ERROR.to_string()
    } else {
        value.to_string()
    }
}

fn pin_block(state: &GunState) -> Vec<String> {
    let settings = &state.settings;
    let mut lines = vec![u8::from(settings.custom_pins()).to_string()];
    lines.extend(LogicalInput::ALL.iter().map(|input| settings.pins.wire_value(*input).to_string()));
    if !state.omit_sentinel {
        lines.push(PIN_SENTINEL.to_string());
    }
    lines
}

fn profile_block(state: &GunState, index: &str) -> Vec<String> {
    let Some(profile) = index.parse::<usize>().ok().and_then(|n| state.settings.profiles.get(n)) else {
        return vec![format!("NOENT: XlP{}", index)];
    };
    let c = profile.calibration;
    [c.x_scale, c.y_scale, c.x_center, c.y_center, profile.ir_sensitivity.wire() as i32, profile.run_mode.wire() as i32]
        .iter()
        .map(i32::to_string)
        .collect()
}

fn calibrate(state: &mut GunState) -> Vec<String> {
    let profile = state.settings.selected_profile;
    let Some(record) = state.settings.profiles.get_mut(profile as usize) else {
        return Vec::new();
    };
    record.calibration = Calibration { x_scale: 1000, y_scale: 750, x_center: 520, y_center: 390 };
    let c = record.calibration;
    vec![
        format!("UpdatedProf: {}", profile),
        c.x_scale.to_string(),
        c.y_scale.to_string(),
        c.x_center.to_string(),
        c.y_center.to_string(),
    ]
}

/// Handle `Xm.<group>.<...>`; `rest` is everything after the `Xm.` prefix
fn apply_set(state: &mut GunState, rest: &str) -> Vec<String> {
    if let Some(limit) = state.silent_after_sets {
        if state.sets_acked >= limit {
            state.silent = true;
            return Vec::new();
        }
    }

    let applied = match rest.split_once('.') {
        Some(("0", args)) => set_bool(&mut state.settings, args),
        Some(("1", args)) => set_pin(&mut state.settings, args),
        Some(("2", args)) => set_tunable(&mut state.settings, args),
        Some(("3", args)) => set_identity(&mut state.settings, args),
        Some(("P", args)) => set_profile(&mut state.settings, args),
        _ => None,
    };

    match applied {
        Some(()) => {
            state.sets_acked += 1;
            vec![format!("OK: Xm.{}", rest)]
        }
        None => vec![format!("NOENT: Xm.{}", rest)],
    }
}

fn index_and_value(args: &str) -> Option<(usize, i64)> {
    let (index, value) = args.split_once('.')?;
    Some((index.parse().ok()?, value.parse().ok()?))
}

fn set_bool(settings: &mut DeviceSettings, args: &str) -> Option<()> {
    let (index, value) = index_and_value(args)?;
    let setting = *BoolSetting::ALL.get(index + 1)?;
    settings.booleans.set(setting, value != 0);
    Some(())
}

fn set_pin(settings: &mut DeviceSettings, args: &str) -> Option<()> {
    let (index, value) = index_and_value(args)?;
    if index == 0 {
        settings.booleans.set(BoolSetting::CustomPins, value != 0);
        return Some(());
    }
    let input = LogicalInput::from_id(u8::try_from(index - 1).ok()?)?;
    let pin = match value {
        -1 => None,
        p if (0..PIN_COUNT as i64).contains(&p) => Some(p as u8),
        _ => return None,
    };
    match pin {
        Some(pin) => settings.pins.assign(pin, Some(input)).ok(),
        None => {
            if let Some(old) = settings.pins.pin_for(input) {
                settings.pins.assign(old, None).ok()?;
            }
            Some(())
        }
    }
}

fn set_tunable(settings: &mut DeviceSettings, args: &str) -> Option<()> {
    let (index, value) = index_and_value(args)?;
    let tunable = *Tunable::ALL.get(index)?;
    settings.tunables.set(tunable, u16::try_from(value).ok()?);
    Some(())
}

fn set_identity(settings: &mut DeviceSettings, args: &str) -> Option<()> {
    let (field, value) = args.split_once('.')?;
    match field {
        "0" => settings.usb.id = value.to_string(),
        "1" => settings.usb.name = value.to_string(),
        _ => return None,
    }
    Some(())
}

fn set_profile(settings: &mut DeviceSettings, args: &str) -> Option<()> {
    let (field, rest) = args.split_once('.')?;
    let (profile, value) = index_and_value(rest)?;
    let record = settings.profiles.get_mut(profile)?;
    match field {
        "i" => record.ir_sensitivity = IrSensitivity::from_wire(value).ok()?,
        "r" => record.run_mode = RunMode::from_wire(value).ok()?,
        _ => return None,
    }
    Some(())
}
