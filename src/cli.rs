use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::{BoolSetting, IrSensitivity, LogicalInput, RunMode, Tunable, PROFILE_COUNT};
use crate::device::PulseKind;

/// Settings tool for P.I.G.S light guns
///
/// Loads the gun's current settings over its serial port, applies edits and
/// writes back the result with a confirm-then-save handshake. Use `--simulate`
/// to try every command against a built-in simulated gun.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// JSON settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Serial port of the gun; defaults to the first one detected
    #[arg(short, long, global = true)]
    pub port: Option<String>,
    /// Talk to a simulated gun instead of hardware
    #[arg(long, global = true, conflicts_with = "port")]
    pub simulate: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List detected light guns
    List,
    /// Print the gun's identity and settings as JSON
    Show,
    /// Edit settings and save them to the gun
    Set(SetArgs),
    /// Switch to a profile (0-3) and save the selection
    Profile {
        #[arg(value_parser = clap::value_parser!(u8).range(0..PROFILE_COUNT as i64))]
        profile: u8,
        /// Save without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Run on-device calibration for the selected profile
    Calibrate {
        /// Switch to this profile first
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..PROFILE_COUNT as i64))]
        profile: Option<u8>,
        /// How long to wait for the gun to report results
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
        /// Save without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Fire a feedback test pulse
    Pulse {
        #[arg(value_enum)]
        kind: PulseArg,
    },
    /// Print live status events until interrupted
    Monitor,
    /// Stream IR camera points until interrupted
    TestMode,
    /// Erase every setting stored on the gun
    Clear {
        /// Erase without asking
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PulseArg {
    Rumble,
    Solenoid,
}

impl From<PulseArg> for PulseKind {
    fn from(arg: PulseArg) -> Self {
        match arg {
            PulseArg::Rumble => PulseKind::Rumble,
            PulseArg::Solenoid => PulseKind::Solenoid,
        }
    }
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Toggle a feature, e.g. `rumble=off`
    #[arg(long = "bool", value_name = "NAME=on|off")]
    pub booleans: Vec<BoolEdit>,
    /// Change a numeric setting, e.g. `rumble-strength=200`
    #[arg(long = "tunable", value_name = "NAME=VALUE")]
    pub tunables: Vec<TunableEdit>,
    /// Route a function to a pin, e.g. `6=trigger`, or `6=none` to free it
    #[arg(long = "pin", value_name = "PIN=INPUT")]
    pub pins: Vec<PinEdit>,
    /// IR sensitivity of a profile, e.g. `0=higher`
    #[arg(long = "ir", value_name = "PROFILE=LEVEL")]
    pub ir: Vec<IrEdit>,
    /// Run mode of a profile, e.g. `1=average1`
    #[arg(long = "run-mode", value_name = "PROFILE=MODE")]
    pub run_modes: Vec<RunModeEdit>,
    /// USB identifier
    #[arg(long)]
    pub usb_id: Option<String>,
    /// USB display name
    #[arg(long)]
    pub usb_name: Option<String>,
    /// Save without asking
    #[arg(short, long)]
    pub yes: bool,
}

fn split_pair(s: &str) -> Result<(&str, &str), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))
}

fn parse_profile(s: &str) -> Result<u8, String> {
    s.parse::<u8>()
        .ok()
        .filter(|p| (*p as usize) < PROFILE_COUNT)
        .ok_or_else(|| format!("profile must be 0-{}, got `{}`", PROFILE_COUNT - 1, s))
}

#[derive(Debug, Clone)]
pub struct BoolEdit {
    pub setting: BoolSetting,
    pub value: bool,
}

impl FromStr for BoolEdit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = split_pair(s)?;
        let setting = name.parse().map_err(|e: crate::config::SettingsError| e.to_string())?;
        let value = match value.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" | "yes" => true,
            "off" | "false" | "0" | "no" => false,
            other => return Err(format!("expected on or off, got `{}`", other)),
        };
        Ok(Self { setting, value })
    }
}

#[derive(Debug, Clone)]
pub struct TunableEdit {
    pub tunable: Tunable,
    pub value: u16,
}

impl FromStr for TunableEdit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = split_pair(s)?;
        let tunable = name.parse().map_err(|e: crate::config::SettingsError| e.to_string())?;
        let value = value.parse().map_err(|_| format!("expected 0-65535, got `{}`", value))?;
        Ok(Self { tunable, value })
    }
}

#[derive(Debug, Clone)]
pub struct PinEdit {
    pub pin: u8,
    pub input: Option<LogicalInput>,
}

impl FromStr for PinEdit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pin, input) = split_pair(s)?;
        let pin = pin.parse().map_err(|_| format!("expected a pin number, got `{}`", pin))?;
        let input = match input.to_ascii_lowercase().as_str() {
            "none" | "unmapped" | "-" => None,
            _ => Some(input.parse().map_err(|e: crate::config::SettingsError| e.to_string())?),
        };
        Ok(Self { pin, input })
    }
}

#[derive(Debug, Clone)]
pub struct IrEdit {
    pub profile: u8,
    pub value: IrSensitivity,
}

impl FromStr for IrEdit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (profile, value) = split_pair(s)?;
        Ok(Self {
            profile: parse_profile(profile)?,
            value: value.parse().map_err(|e: crate::config::SettingsError| e.to_string())?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunModeEdit {
    pub profile: u8,
    pub value: RunMode,
}

impl FromStr for RunModeEdit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (profile, value) = split_pair(s)?;
        Ok(Self {
            profile: parse_profile(profile)?,
            value: value.parse().map_err(|e: crate::config::SettingsError| e.to_string())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn check_cli_debug_asserts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_set_edits() {
        let cli = Cli::try_parse_from([
            "pigs-link", "--simulate", "set", "--bool", "rumble=off", "--pin", "6=trigger", "--pin", "5=none",
            "--tunable", "rumble-strength=200", "--ir", "0=higher", "--yes",
        ])
        .unwrap();

        let Commands::Set(args) = cli.command else {
            panic!("expected set");
        };
        assert!(cli.simulate);
        assert_eq!(args.booleans[0].setting, BoolSetting::Rumble);
        assert!(!args.booleans[0].value);
        assert_eq!(args.pins[0].input, Some(LogicalInput::Trigger));
        assert_eq!(args.pins[1].input, None);
        assert_eq!(args.tunables[0].value, 200);
        assert_eq!(args.ir[0].value, IrSensitivity::Higher);
        assert!(args.yes);
    }

    #[test]
    fn rejects_bad_edits() {
        assert!("rumble=maybe".parse::<BoolEdit>().is_err());
        assert!("7=laser".parse::<PinEdit>().is_err());
        assert!("4=higher".parse::<IrEdit>().is_err());
        assert!(Cli::try_parse_from(["pigs-link", "profile", "4"]).is_err());
    }
}
