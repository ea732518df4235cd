use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::SettingsError;

/// Number of remappable gun functions.
pub const INPUTS_COUNT: usize = 25;
/// Number of GPIO pins exposed by the RP2040 boards.
pub const PIN_COUNT: usize = 30;

/// A gun function that can be bound to a physical pin.
///
/// The discriminant is the logical input id used on the wire (`Xm.1.<id + 1>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogicalInput {
    Trigger = 0,
    ButtonA,
    ButtonB,
    ButtonC,
    Start,
    Select,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    ExternalPedal,
    Home,
    PumpAction,
    RumbleSignal,
    SolenoidSignal,
    TempSensor,
    RumbleSwitch,
    SolenoidSwitch,
    AutofireSwitch,
    LedRed,
    LedGreen,
    LedBlue,
    ExternalNeoPixel,
    AnalogX,
    AnalogY,
}

impl LogicalInput {
    pub const ALL: [LogicalInput; INPUTS_COUNT] = [
        LogicalInput::Trigger,
        LogicalInput::ButtonA,
        LogicalInput::ButtonB,
        LogicalInput::ButtonC,
        LogicalInput::Start,
        LogicalInput::Select,
        LogicalInput::DpadUp,
        LogicalInput::DpadDown,
        LogicalInput::DpadLeft,
        LogicalInput::DpadRight,
        LogicalInput::ExternalPedal,
        LogicalInput::Home,
        LogicalInput::PumpAction,
        LogicalInput::RumbleSignal,
        LogicalInput::SolenoidSignal,
        LogicalInput::TempSensor,
        LogicalInput::RumbleSwitch,
        LogicalInput::SolenoidSwitch,
        LogicalInput::AutofireSwitch,
        LogicalInput::LedRed,
        LogicalInput::LedGreen,
        LogicalInput::LedBlue,
        LogicalInput::ExternalNeoPixel,
        LogicalInput::AnalogX,
        LogicalInput::AnalogY,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Display name, as shown by the firmware's own tooling
    pub fn name(self) -> &'static str {
        match self {
            LogicalInput::Trigger => "Trigger",
            LogicalInput::ButtonA => "Button A",
            LogicalInput::ButtonB => "Button B",
            LogicalInput::ButtonC => "Button C",
            LogicalInput::Start => "Start",
            LogicalInput::Select => "Select",
            LogicalInput::DpadUp => "D-Pad Up",
            LogicalInput::DpadDown => "D-Pad Down",
            LogicalInput::DpadLeft => "D-Pad Left",
            LogicalInput::DpadRight => "D-Pad Right",
            LogicalInput::ExternalPedal => "External Pedal",
            LogicalInput::Home => "Home Button",
            LogicalInput::PumpAction => "Pump Action",
            LogicalInput::RumbleSignal => "Rumble Signal",
            LogicalInput::SolenoidSignal => "Solenoid Signal",
            LogicalInput::TempSensor => "Temp Sensor",
            LogicalInput::RumbleSwitch => "Rumble Switch",
            LogicalInput::SolenoidSwitch => "Solenoid Switch",
            LogicalInput::AutofireSwitch => "Autofire Switch",
            LogicalInput::LedRed => "RGB LED Red",
            LogicalInput::LedGreen => "RGB LED Green",
            LogicalInput::LedBlue => "RGB LED Blue",
            LogicalInput::ExternalNeoPixel => "External NeoPixel",
            LogicalInput::AnalogX => "Analog Pin X",
            LogicalInput::AnalogY => "Analog Pin Y",
        }
    }
}

impl fmt::Display for LogicalInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogicalInput {
    type Err = SettingsError;

    /// Accepts the display name in any case, with spaces, dashes or underscores
    /// treated alike ("button-a", "Button A", "dpad_up" all work).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        INPUTS_BY_NAME
            .get(&normalize(s))
            .copied()
            .ok_or_else(|| SettingsError::UnknownName(s.to_string()))
    }
}

/// Normalized display and variant names
static INPUTS_BY_NAME: Lazy<HashMap<String, LogicalInput>> = Lazy::new(|| {
    LogicalInput::ALL
        .iter()
        .flat_map(|input| [(normalize(input.name()), *input), (normalize(&format!("{:?}", input)), *input)])
        .collect()
});

pub(crate) fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Pin assignment map with its inverse view kept in lockstep.
///
/// `inputs[i]` is the pin hosting logical input `i` (PinAssignmentMap),
/// `pins[p]` is the logical input living on pin `p` (CurrentPins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMap {
    inputs: [Option<u8>; INPUTS_COUNT],
    pins: [Option<LogicalInput>; PIN_COUNT],
}

impl PinMap {
    /// Map with every input unmapped
    pub fn unmapped() -> Self {
        Self {
            inputs: [None; INPUTS_COUNT],
            pins: [None; PIN_COUNT],
        }
    }

    /// Build a map from per-input pin numbers, in logical input order.
    ///
    /// Entries are applied through [`PinMap::assign`], so a device that reports
    /// the same pin twice ends up with only the later input bound to it.
    pub fn from_assignments<I>(assignments: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = Option<u8>>,
    {
        let mut map = Self::unmapped();
        for (id, pin) in assignments.into_iter().enumerate() {
            let input = LogicalInput::from_id(id as u8)
                .ok_or(SettingsError::TooManyAssignments(id + 1))?;
            if let Some(pin) = pin {
                if map.input_on(pin).is_some() {
                    log::warn!("Pin {} reported for more than one input, keeping {}", pin, input);
                }
                map.assign(pin, Some(input))?;
            }
        }
        Ok(map)
    }

    /// Route `requested` onto `pin`, or unmap the pin when `requested` is `None`.
    ///
    /// A function lives on at most one pin and a pin hosts at most one function:
    /// whatever was previously bound to either side is cleared first. Calling this
    /// twice with the same arguments leaves the map unchanged.
    pub fn assign(&mut self, pin: u8, requested: Option<LogicalInput>) -> Result<(), SettingsError> {
        let slot = pin as usize;
        if slot >= PIN_COUNT {
            return Err(SettingsError::PinOutOfRange(pin));
        }

        let Some(input) = requested else {
            if let Some(previous) = self.pins[slot].take() {
                self.inputs[previous as usize] = None;
            }
            return Ok(());
        };

        // The function can only live on one pin.
        if let Some(old_pin) = self.inputs[input as usize].take() {
            self.pins[old_pin as usize] = None;
        }

        // This pin drops whatever it hosted before.
        if let Some(previous) = self.pins[slot].take() {
            self.inputs[previous as usize] = None;
        }

        for other in self.pins.iter_mut() {
            if *other == Some(input) {
                *other = None;
            }
        }

        self.pins[slot] = Some(input);
        self.inputs[input as usize] = Some(pin);
        Ok(())
    }

    /// Pin currently hosting `input`
    pub fn pin_for(&self, input: LogicalInput) -> Option<u8> {
        self.inputs[input as usize]
    }

    /// Function currently living on `pin`
    pub fn input_on(&self, pin: u8) -> Option<LogicalInput> {
        self.pins.get(pin as usize).copied().flatten()
    }

    /// Per-input pin numbers in logical input order
    pub fn assignments(&self) -> &[Option<u8>; INPUTS_COUNT] {
        &self.inputs
    }

    /// Per-pin functions in pin order
    pub fn current_pins(&self) -> &[Option<LogicalInput>; PIN_COUNT] {
        &self.pins
    }

    /// Wire value for `input`: the pin number, or -1 when unmapped
    pub fn wire_value(&self, input: LogicalInput) -> i8 {
        self.pin_for(input).map(|p| p as i8).unwrap_or(-1)
    }

    pub fn clear(&mut self) {
        *self = Self::unmapped();
    }

    /// True when both views describe the same bindings
    pub fn is_consistent(&self) -> bool {
        let forward = self.inputs.iter().enumerate().all(|(id, pin)| match pin {
            Some(pin) => self.pins.get(*pin as usize).copied().flatten().map(|i| i.id()) == Some(id as u8),
            None => true,
        });
        let backward = self.pins.iter().enumerate().all(|(pin, input)| match input {
            Some(input) => self.inputs[*input as usize] == Some(pin as u8),
            None => true,
        });
        forward && backward
    }
}

impl Default for PinMap {
    fn default() -> Self {
        Self::unmapped()
    }
}
