use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{LineTransport, Result, SerialError};
use crate::config::{
    AppSettings, BoolSetting, BoolSettings, Calibration, DeviceSettings, IrSensitivity, LogicalInput,
    PinMap, ProfileRecord, RunMode, Timeouts, Tunable, TunableSettings, UsbIdentity, INPUTS_COUNT,
    PIN_COUNT, PROFILE_COUNT,
};

/// Terminates the pin block of `Xlp`
pub const PIN_SENTINEL: &str = "-127";
pub const ACK_OK: &str = "OK:";
pub const ACK_NOT_FOUND: &str = "NOENT:";
pub const SAVE_STARTED: &str = "Saving preferences...";
pub const SAVE_CONFIRMED: &str = "Settings saved to";
/// Reply to `Xln`/`Xli` when the stored string is unreadable
pub const IDENTITY_READ_ERROR: &str = "SERIALREADERR01";
pub const TEST_MODE_ENTERED: &str = "Entering Test Mode...";
pub const STORAGE_CLEARED: &str = "Cleared! Please reset the board.";
pub const IDENTITY_BANNER: &str = "P.I.G.S";

/// Microcontroller board reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardType {
    RpiPico,
    ItsyRp2040,
    Kb2040,
    NanoRp2040,
    Generic,
}

impl BoardType {
    /// Exact-match board token; anything unrecognised is a generic board
    pub fn from_token(token: &str) -> Self {
        match token {
            "rpipico" => BoardType::RpiPico,
            "adafruitItsyRP2040" => BoardType::ItsyRp2040,
            "adafruitKB2040" => BoardType::Kb2040,
            "arduinoNanoRP2040" => BoardType::NanoRp2040,
            _ => BoardType::Generic,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            BoardType::RpiPico => "rpipico",
            BoardType::ItsyRp2040 => "adafruitItsyRP2040",
            BoardType::Kb2040 => "adafruitKB2040",
            BoardType::NanoRp2040 => "arduinoNanoRP2040",
            BoardType::Generic => "generic",
        }
    }

    pub fn pretty_name(self) -> &'static str {
        match self {
            BoardType::RpiPico => "Raspberry Pi Pico",
            BoardType::ItsyRp2040 => "Adafruit ItsyBitsy RP2040",
            BoardType::Kb2040 => "Adafruit KB2040",
            BoardType::NanoRp2040 => "Arduino Nano RP2040 Connect",
            BoardType::Generic => "LG2040",
        }
    }
}

impl fmt::Display for BoardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pretty_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardIdentity {
    pub firmware_version: f32,
    pub codename: String,
    pub board_type: BoardType,
}

/// Stages of the load sequence, reported as they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStage {
    Probing,
    Identified,
    Booleans,
    Pins,
    Tunables,
    Profiles,
}

/// Everything a successful handshake and load produced
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDevice {
    pub board: BoardIdentity,
    pub settings: DeviceSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitProgress {
    pub completed: usize,
    pub total: usize,
}

/// Host-to-device commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Probe,
    ReadUsbName,
    ReadUsbId,
    LoadBooleans,
    LoadPins,
    LoadTunables,
    LoadProfile(u8),
    KeepAlive,
    PauseOutputs,
    SetBoolean { setting: BoolSetting, value: bool },
    SetCustomPins(bool),
    SetPin { input: LogicalInput, pin: Option<u8> },
    SetTunable { tunable: Tunable, value: u16 },
    SetUsbId(String),
    SetUsbName(String),
    SetIrSensitivity { profile: u8, value: IrSensitivity },
    SetRunMode { profile: u8, value: RunMode },
    Save,
    SelectProfile(u8),
    Calibrate,
    EnterTestMode,
    /// Leaves test mode; also undocks the gun
    Exit,
    RumblePulse,
    SolenoidPulse,
    ClearStorage,
}

impl Command {
    pub fn encode(&self) -> String {
        match self {
            Command::Probe => "XP".into(),
            Command::ReadUsbName => "Xln".into(),
            Command::ReadUsbId => "Xli".into(),
            Command::LoadBooleans => "Xlb".into(),
            Command::LoadPins => "Xlp".into(),
            Command::LoadTunables => "Xls".into(),
            Command::LoadProfile(n) => format!("XlP{}", n),
            Command::KeepAlive => ".".into(),
            Command::PauseOutputs => "Xm".into(),
            // Boolean slot 0 is carried by the pin group, so the wire index is shifted.
            Command::SetBoolean { setting, value } => {
                format!("Xm.0.{}.{}", setting.slot().saturating_sub(1), u8::from(*value))
            }
            Command::SetCustomPins(on) => format!("Xm.1.0.{}", u8::from(*on)),
            Command::SetPin { input, pin } => {
                format!("Xm.1.{}.{}", input.id() + 1, pin.map(i16::from).unwrap_or(-1))
            }
            Command::SetTunable { tunable, value } => format!("Xm.2.{}.{}", tunable.slot(), value),
            Command::SetUsbId(id) => format!("Xm.3.0.{}", id),
            Command::SetUsbName(name) => format!("Xm.3.1.{}", name),
            Command::SetIrSensitivity { profile, value } => format!("Xm.P.i.{}.{}", profile, value.wire()),
            Command::SetRunMode { profile, value } => format!("Xm.P.r.{}.{}", profile, value.wire()),
            Command::Save => "XS".into(),
            Command::SelectProfile(n) => format!("XC{}", n + 1),
            Command::Calibrate => "XC1C".into(),
            Command::EnterTestMode => "XT".into(),
            Command::Exit => "XE".into(),
            Command::RumblePulse => "Xtr".into(),
            Command::SolenoidPulse => "Xts".into(),
            Command::ClearStorage => "Xc".into(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Ordered write-back queue for `settings`, always terminated by [`Command::Save`].
pub fn build_commit_queue(settings: &DeviceSettings) -> Vec<Command> {
    let mut queue = Vec::new();

    for setting in BoolSetting::wire_slots() {
        queue.push(Command::SetBoolean { setting, value: settings.booleans.get(setting) });
    }

    if settings.custom_pins() {
        queue.push(Command::SetCustomPins(true));
        for input in LogicalInput::ALL {
            queue.push(Command::SetPin { input, pin: settings.pins.pin_for(input) });
        }
    } else {
        queue.push(Command::SetCustomPins(false));
    }

    for tunable in Tunable::ALL {
        queue.push(Command::SetTunable { tunable, value: settings.tunables.get(tunable) });
    }

    queue.push(Command::SetUsbId(settings.usb.id.clone()));
    if !settings.usb.name.is_empty() {
        queue.push(Command::SetUsbName(settings.usb.name.clone()));
    }

    for (n, record) in settings.profiles.iter().enumerate() {
        let profile = n as u8;
        queue.push(Command::SetIrSensitivity { profile, value: record.ir_sensitivity });
        queue.push(Command::SetRunMode { profile, value: record.run_mode });
    }

    queue.push(Command::Save);
    queue
}

/// Generic acknowledgement of a staged set command
pub fn is_ack(reply: &str) -> bool {
    reply.contains(ACK_OK) || reply.contains(ACK_NOT_FOUND)
}

fn parse_value<T: FromStr>(line: &str, what: &str) -> Result<T> {
    line.trim()
        .parse()
        .map_err(|_| SerialError::ProtocolDesync(format!("expected {} but got {:?}", what, line)))
}

/// P.I.G.S configuration protocol over a borrowed transport.
///
/// Every call is a strict request-then-wait exchange; callers hold the channel
/// exclusively for the lifetime of this value.
pub struct ConfigProtocol<'a> {
    io: &'a mut dyn LineTransport,
    timeouts: Timeouts,
    keepalive_every: usize,
}

impl<'a> ConfigProtocol<'a> {
    pub fn new(io: &'a mut dyn LineTransport, settings: &AppSettings) -> Self {
        Self {
            io,
            timeouts: settings.timeouts.clone(),
            keepalive_every: settings.keepalive_every,
        }
    }

    async fn send(&mut self, command: &Command) -> Result<()> {
        let line = command.encode();
        log::debug!("Sending {}", line);
        self.io.write_line(&line, self.timeouts.commit_ms).await
    }

    async fn expect_line(&mut self, timeout_ms: u64, what: &str) -> Result<String> {
        self.io
            .read_line(timeout_ms)
            .await?
            .ok_or_else(|| SerialError::Timeout(what.to_string()))
    }

    async fn expect_value<T: FromStr>(&mut self, timeout_ms: u64, what: &str) -> Result<T> {
        let line = self.expect_line(timeout_ms, what).await?;
        parse_value(&line, what)
    }

    /// Keep-alive after every `keepalive_every` streamed lines
    async fn stream_tick(&mut self, lines_read: usize) -> Result<()> {
        if self.keepalive_every > 0 && lines_read % self.keepalive_every == 0 {
            self.send(&Command::KeepAlive).await?;
        }
        Ok(())
    }

    /// Identity probe plus the two identity-string round trips.
    ///
    /// Returns the board, the currently selected profile and the USB identity.
    pub async fn handshake(&mut self) -> Result<(BoardIdentity, u8, UsbIdentity)> {
        let wait = self.timeouts.probe_ms;
        self.send(&Command::Probe).await?;

        let banner = self.expect_line(wait, "identity banner").await?;
        if !banner.contains(IDENTITY_BANNER) {
            log::warn!("Unexpected identity banner: {}", banner);
        }
        let firmware_version: f32 = self.expect_value(wait, "firmware version").await?;
        let codename = self.expect_line(wait, "version codename").await?;
        let board_type = BoardType::from_token(&self.expect_line(wait, "board type").await?);
        let selected_profile: u8 = self.expect_value(wait, "selected profile").await?;
        if selected_profile as usize >= PROFILE_COUNT {
            return Err(SerialError::ProtocolDesync(format!(
                "selected profile {} out of range",
                selected_profile
            )));
        }

        let name = self.identity_string(Command::ReadUsbName).await?;
        let id = self.identity_string(Command::ReadUsbId).await?;

        let board = BoardIdentity { firmware_version, codename, board_type };
        log::info!(
            "Identified {} firmware v{} \"{}\"",
            board.board_type,
            board.firmware_version,
            board.codename
        );
        Ok((board, selected_profile, UsbIdentity { id, name }))
    }

    /// A missing or unreadable identity string is empty, not an error.
    async fn identity_string(&mut self, command: Command) -> Result<String> {
        self.send(&command).await?;
        match self.io.read_line(self.timeouts.identity_ms).await? {
            Some(line) if line == IDENTITY_READ_ERROR => Ok(String::new()),
            Some(line) => Ok(line),
            None => {
                log::warn!("No reply to {}, treating as empty", command);
                Ok(String::new())
            }
        }
    }

    pub async fn load_booleans(&mut self) -> Result<BoolSettings> {
        self.send(&Command::LoadBooleans).await?;
        let mut booleans = BoolSettings::default();
        for setting in BoolSetting::wire_slots() {
            let value: i64 = self.expect_value(self.timeouts.load_ms, setting.name()).await?;
            booleans.set(setting, value != 0);
        }
        Ok(booleans)
    }

    /// Pin block: custom-pins flag, one line per logical input, then the sentinel.
    pub async fn load_pins(&mut self) -> Result<(bool, PinMap)> {
        self.send(&Command::LoadPins).await?;
        let flag: i64 = self.expect_value(self.timeouts.load_ms, "custom pins flag").await?;
        let custom = flag != 0;

        let mut assignments = Vec::with_capacity(INPUTS_COUNT);
        for (index, input) in LogicalInput::ALL.into_iter().enumerate() {
            let line = self.expect_line(self.timeouts.pin_line_ms, input.name()).await?;
            self.stream_tick(index + 1).await?;
            if !custom {
                continue;
            }
            let pin: i64 = parse_value(&line, input.name())?;
            assignments.push(match pin {
                -1 => None,
                p if (0..PIN_COUNT as i64).contains(&p) => Some(p as u8),
                p => {
                    return Err(SerialError::ProtocolDesync(format!("pin {} for {} out of range", p, input)));
                }
            });
        }

        match self.io.read_line(self.timeouts.load_ms).await? {
            Some(line) if line == PIN_SENTINEL => {}
            Some(line) => {
                log::error!("Pin block not terminated, got {:?}", line);
                return Err(SerialError::ProtocolDesync(format!(
                    "expected pin sentinel {} but got {:?}",
                    PIN_SENTINEL, line
                )));
            }
            None => {
                log::error!("Pin sentinel missing");
                return Err(SerialError::ProtocolDesync("pin sentinel missing".into()));
            }
        }

        let pins = if custom {
            PinMap::from_assignments(assignments).map_err(|e| SerialError::ProtocolDesync(e.to_string()))?
        } else {
            PinMap::unmapped()
        };
        Ok((custom, pins))
    }

    pub async fn load_tunables(&mut self) -> Result<TunableSettings> {
        self.send(&Command::LoadTunables).await?;
        let mut tunables = TunableSettings::default();
        for tunable in Tunable::ALL {
            let value: u16 = self.expect_value(self.timeouts.load_ms, tunable.name()).await?;
            tunables.set(tunable, value);
        }
        Ok(tunables)
    }

    pub async fn load_profile(&mut self, profile: u8) -> Result<ProfileRecord> {
        self.send(&Command::LoadProfile(profile)).await?;
        let wait = self.timeouts.load_ms;
        let calibration = Calibration {
            x_scale: self.expect_value(wait, "x scale").await?,
            y_scale: self.expect_value(wait, "y scale").await?,
            x_center: self.expect_value(wait, "x center").await?,
            y_center: self.expect_value(wait, "y center").await?,
        };
        let ir: i64 = self.expect_value(wait, "ir sensitivity").await?;
        let mode: i64 = self.expect_value(wait, "run mode").await?;
        Ok(ProfileRecord {
            calibration,
            ir_sensitivity: IrSensitivity::from_wire(ir).map_err(|e| SerialError::ProtocolDesync(e.to_string()))?,
            run_mode: RunMode::from_wire(mode).map_err(|e| SerialError::ProtocolDesync(e.to_string()))?,
        })
    }

    /// Full handshake and load.
    ///
    /// Results are staged and only returned once every block arrived, so a
    /// failure part way leaves nothing half-populated.
    pub async fn load_all<F>(&mut self, mut on_stage: F) -> Result<LoadedDevice>
    where
        F: FnMut(LoadStage),
    {
        on_stage(LoadStage::Probing);
        let (board, selected_profile, usb) = self.handshake().await?;
        on_stage(LoadStage::Identified);

        on_stage(LoadStage::Booleans);
        let mut booleans = self.load_booleans().await?;

        on_stage(LoadStage::Pins);
        let (custom, pins) = self.load_pins().await?;
        booleans.set(BoolSetting::CustomPins, custom);

        on_stage(LoadStage::Tunables);
        let tunables = self.load_tunables().await?;

        on_stage(LoadStage::Profiles);
        let mut profiles = [ProfileRecord::default(); PROFILE_COUNT];
        for (n, slot) in profiles.iter_mut().enumerate() {
            *slot = self.load_profile(n as u8).await?;
        }

        Ok(LoadedDevice {
            board,
            settings: DeviceSettings { booleans, pins, tunables, usb, selected_profile, profiles },
        })
    }

    /// Write every setting back and save.
    ///
    /// Any timeout or unexpected reply aborts the rest of the queue.
    pub async fn commit<F>(&mut self, settings: &DeviceSettings, mut on_progress: F) -> Result<()>
    where
        F: FnMut(CommitProgress),
    {
        if let Err(e) = self.send(&Command::PauseOutputs).await {
            log::warn!("Failed to pause device outputs: {}", e);
        }
        let flushed = self.io.drain(self.timeouts.drain_ms).await?;
        if flushed > 0 {
            log::debug!("Flushed {} buffered line(s) before commit", flushed);
        }

        let queue = build_commit_queue(settings);
        let total = queue.len();
        log::info!("Committing {} command(s)", total);

        for (index, command) in queue.iter().enumerate() {
            self.send(command).await?;
            let reply = self
                .expect_line(self.timeouts.commit_ms, &format!("reply to {}", command))
                .await?;

            if *command == Command::Save {
                self.confirm_save(&reply).await?;
            } else if !is_ack(&reply) {
                log::error!("{} rejected: {}", command, reply);
                return Err(SerialError::CommandRejected { command: command.encode(), reply });
            }
            on_progress(CommitProgress { completed: index + 1, total });
        }

        let trailing = self.io.drain(self.timeouts.drain_ms).await?;
        if trailing > 0 {
            log::debug!("Drained {} trailing line(s) after save", trailing);
        }
        log::info!("Settings saved");
        Ok(())
    }

    async fn confirm_save(&mut self, reply: &str) -> Result<()> {
        if !reply.contains(SAVE_STARTED) {
            return Err(SerialError::CommandRejected {
                command: Command::Save.encode(),
                reply: reply.to_string(),
            });
        }
        match self.io.read_line(self.timeouts.commit_ms).await? {
            Some(line) if line.contains(SAVE_CONFIRMED) => Ok(()),
            Some(line) => {
                log::error!("Save started but not confirmed: {}", line);
                Err(SerialError::ProtocolDesync(format!("save not confirmed: {:?}", line)))
            }
            None => Err(SerialError::Timeout("save confirmation".into())),
        }
    }

    /// Send a command that has no reply
    pub async fn fire(&mut self, command: &Command) -> Result<()> {
        self.send(command).await
    }

    /// Returns whether the device confirmed test mode
    pub async fn enter_test_mode(&mut self) -> Result<bool> {
        self.io.drain(self.timeouts.drain_ms).await?;
        self.send(&Command::EnterTestMode).await?;
        match self.io.read_line(self.timeouts.probe_ms).await? {
            Some(line) if line == TEST_MODE_ENTERED => Ok(true),
            Some(line) => {
                log::warn!("Unexpected reply to {}: {}", Command::EnterTestMode, line);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Leave test mode or undock; the reply, if any, is discarded.
    pub async fn exit(&mut self) -> Result<()> {
        self.send(&Command::Exit).await?;
        self.io.drain(self.timeouts.drain_ms).await?;
        Ok(())
    }

    pub async fn clear_storage(&mut self) -> Result<()> {
        self.io.drain(self.timeouts.drain_ms).await?;
        self.send(&Command::ClearStorage).await?;
        let reply = self.expect_line(self.timeouts.clear_ms, "storage clear").await?;
        if reply != STORAGE_CLEARED {
            return Err(SerialError::CommandRejected { command: Command::ClearStorage.encode(), reply });
        }
        log::info!("Device storage cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::ScriptedTransport;
    use pretty_assertions::assert_eq;

    #[test]
    fn set_commands_encode_wire_indices() {
        assert_eq!(Command::SetBoolean { setting: BoolSetting::Rumble, value: true }.encode(), "Xm.0.0.1");
        assert_eq!(Command::SetBoolean { setting: BoolSetting::Nunchuck, value: false }.encode(), "Xm.0.6.0");
        assert_eq!(Command::SetPin { input: LogicalInput::Trigger, pin: Some(6) }.encode(), "Xm.1.1.6");
        assert_eq!(Command::SetPin { input: LogicalInput::AnalogY, pin: None }.encode(), "Xm.1.25.-1");
        assert_eq!(Command::SetTunable { tunable: Tunable::HoldToPauseLength, value: 2500 }.encode(), "Xm.2.7.2500");
        assert_eq!(Command::SetRunMode { profile: 3, value: RunMode::FrameAverage2 }.encode(), "Xm.P.r.3.2");
        assert_eq!(Command::SelectProfile(0).encode(), "XC1");
        assert_eq!(Command::LoadProfile(2).encode(), "XlP2");
    }

    #[test]
    fn queue_without_custom_pins() {
        let mut settings = DeviceSettings::default();
        settings.usb.id = "1".into();
        let queue = build_commit_queue(&settings);

        // 7 booleans, 1 pin flag, 8 tunables, usb id, 8 profile fields, save
        assert_eq!(queue.len(), 7 + 1 + 8 + 1 + 8 + 1);
        assert_eq!(queue[7], Command::SetCustomPins(false));
        assert!(!queue.iter().any(|c| matches!(c, Command::SetUsbName(_))));
        assert_eq!(queue.last(), Some(&Command::Save));
    }

    #[test]
    fn queue_with_custom_pins_lists_every_input() {
        let mut settings = DeviceSettings::default();
        settings.booleans.set(BoolSetting::CustomPins, true);
        settings.pins.assign(6, Some(LogicalInput::Trigger)).unwrap();
        settings.usb.name = "Gun".into();
        let queue = build_commit_queue(&settings);

        let pins: Vec<_> = queue.iter().filter(|c| matches!(c, Command::SetPin { .. })).collect();
        assert_eq!(pins.len(), INPUTS_COUNT);
        assert_eq!(pins[0].encode(), "Xm.1.1.6");
        assert!(queue.contains(&Command::SetUsbName("Gun".into())));

        // Profile groups come after everything else, save is last.
        let first_profile = queue.iter().position(|c| matches!(c, Command::SetIrSensitivity { .. })).unwrap();
        let last_identity = queue.iter().rposition(|c| matches!(c, Command::SetUsbName(_))).unwrap();
        assert!(last_identity < first_profile);
        assert_eq!(queue.last(), Some(&Command::Save));
    }

    #[test]
    fn board_tokens_map_exactly() {
        assert_eq!(BoardType::from_token("adafruitKB2040"), BoardType::Kb2040);
        assert_eq!(BoardType::from_token("ADAFRUITKB2040"), BoardType::Generic);
        assert_eq!(BoardType::Generic.pretty_name(), "LG2040");
    }

    #[test]
    fn ack_tokens() {
        assert!(is_ack("OK: Set bool 0 to 1"));
        assert!(is_ack("NOENT: no such setting"));
        assert!(!is_ack("ERR: nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn pin_keepalive_after_fifteen_lines() {
        let mut lines = vec!["1".to_string()];
        lines.extend((0..INPUTS_COUNT).map(|_| "-1".to_string()));
        lines.push(PIN_SENTINEL.to_string());
        let mut reply = Some(lines);
        let (mut transport, handle) = ScriptedTransport::new(move |cmd| {
            if cmd == "Xlp" {
                reply.take().unwrap_or_default()
            } else {
                Vec::new()
            }
        });

        let settings = AppSettings::default();
        let mut protocol = ConfigProtocol::new(&mut transport, &settings);
        let (custom, pins) = protocol.load_pins().await.unwrap();

        assert!(custom);
        assert_eq!(pins, PinMap::unmapped());
        assert_eq!(handle.written(), vec!["Xlp".to_string(), ".".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_identity_string_is_empty() {
        let (mut transport, _handle) = ScriptedTransport::new(|cmd| match cmd {
            "XP" => ["P.I.G.S", "2.1", "Sunrise", "someOtherBoard", "1"].map(String::from).to_vec(),
            "Xln" => vec![IDENTITY_READ_ERROR.to_string()],
            _ => Vec::new(),
        });

        let settings = AppSettings::default();
        let mut protocol = ConfigProtocol::new(&mut transport, &settings);
        let (board, selected, usb) = protocol.handshake().await.unwrap();

        assert_eq!(board.board_type, BoardType::Generic);
        assert_eq!(board.codename, "Sunrise");
        assert_eq!(selected, 1);
        assert_eq!(usb, UsbIdentity::default());
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_boolean_is_desync() {
        let (mut transport, _handle) = ScriptedTransport::new(|cmd| match cmd {
            "Xlb" => vec!["1".to_string(), "Pressed: 3".to_string()],
            _ => Vec::new(),
        });

        let settings = AppSettings::default();
        let mut protocol = ConfigProtocol::new(&mut transport, &settings);
        assert!(matches!(protocol.load_booleans().await, Err(SerialError::ProtocolDesync(_))));
    }
}
