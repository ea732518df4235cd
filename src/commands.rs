use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::time::Duration;

use crate::cli::{Cli, Commands, SetArgs};
use crate::config::AppSettings;
use crate::device::{CommitOutcome, DeviceManager, StatusEvent};
use crate::serial::SimulatedGun;

/// Run one CLI command against a fresh session
pub async fn dispatch(cli: Cli, settings: AppSettings) -> Result<()> {
    let manager = DeviceManager::new(settings);

    if let Commands::List = cli.command {
        return list_devices(&manager).await;
    }

    connect(&manager, &cli).await?;
    let result = run_session_command(&manager, cli.command).await;

    if manager.is_connected().await {
        if let Err(e) = manager.disconnect_device().await {
            log::warn!("Failed to disconnect cleanly: {}", e);
        }
    }
    result
}

async fn connect(manager: &DeviceManager, cli: &Cli) -> Result<()> {
    let connected = if cli.simulate {
        let (transport, _handle) = SimulatedGun::new().transport();
        manager.connect_transport("simulated", Box::new(transport)).await
    } else if let Some(port) = &cli.port {
        manager.connect_port(port).await
    } else {
        manager.connect_first_available().await
    };
    let board = connected.context("Failed to connect to light gun")?;

    eprintln!(
        "Connected: {} (firmware v{:.1} \"{}\")",
        board.board_type, board.firmware_version, board.codename
    );
    Ok(())
}

async fn run_session_command(manager: &DeviceManager, command: Commands) -> Result<()> {
    match command {
        Commands::List => Ok(()),
        Commands::Show => show(manager).await,
        Commands::Set(args) => set(manager, args).await,
        Commands::Profile { profile, yes } => {
            manager
                .select_profile(profile)
                .await
                .context("Failed to select profile")?;
            commit_with_prompt(manager, yes).await
        }
        Commands::Calibrate { profile, timeout_secs, yes } => calibrate(manager, profile, timeout_secs, yes).await,
        Commands::Pulse { kind } => manager.pulse(kind.into()).await.context("Failed to fire test pulse"),
        Commands::Monitor => monitor(manager).await,
        Commands::TestMode => test_mode(manager).await,
        Commands::Clear { yes } => clear(manager, yes).await,
    }
}

async fn list_devices(manager: &DeviceManager) -> Result<()> {
    let devices = manager
        .discover_devices()
        .await
        .context("Failed to discover devices")?;
    if devices.is_empty() {
        println!("No P.I.G.S light guns detected");
    }
    for device in devices {
        println!(
            "{}\t{:04X}:{:04X}\t{}",
            device.port_name,
            device.vid,
            device.pid,
            device.display_name.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

async fn show(manager: &DeviceManager) -> Result<()> {
    let snapshot = manager.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn set(manager: &DeviceManager, args: SetArgs) -> Result<()> {
    for edit in args.booleans {
        manager.set_bool(edit.setting, edit.value).await?;
    }
    for edit in args.tunables {
        manager.set_tunable(edit.tunable, edit.value).await?;
    }
    for edit in args.pins {
        manager.assign_pin(edit.pin, edit.input).await?;
    }
    for edit in args.ir {
        manager.set_ir_sensitivity(edit.profile, edit.value).await?;
    }
    for edit in args.run_modes {
        manager.set_run_mode(edit.profile, edit.value).await?;
    }
    if let Some(id) = &args.usb_id {
        manager.set_usb_id(id).await?;
    }
    if let Some(name) = &args.usb_name {
        manager.set_usb_name(name).await?;
    }
    commit_with_prompt(manager, args.yes).await
}

fn confirm(question: &str) -> bool {
    eprint!("{} [y/N] ", question);
    if std::io::stderr().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

async fn commit_with_prompt(manager: &DeviceManager, yes: bool) -> Result<()> {
    let outcome = manager
        .commit(
            |report| {
                eprint!("{}", report);
                if report.is_empty() {
                    eprintln!();
                }
                yes || confirm("Send settings to the gun and save?")
            },
            |progress| eprint!("\rSaving {}/{}", progress.completed, progress.total),
        )
        .await;
    eprintln!();

    match outcome.context("Failed to save settings")? {
        CommitOutcome::Committed => eprintln!("Settings saved."),
        CommitOutcome::Cancelled => eprintln!("Save cancelled."),
    }
    Ok(())
}

async fn calibrate(manager: &DeviceManager, profile: Option<u8>, timeout_secs: u64, yes: bool) -> Result<()> {
    if let Some(profile) = profile {
        manager.select_profile(profile).await.context("Failed to select profile")?;
    }
    manager.calibrate().await.context("Failed to start calibration")?;
    eprintln!("Calibration started, follow the prompts on the gun.");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            anyhow::bail!("No calibration result within {}s", timeout_secs);
        }
        for event in manager.wait_events(remaining).await? {
            if let StatusEvent::ProfileUpdated { profile, calibration } = event {
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                    "profile": profile,
                    "calibration": calibration,
                }))?);
                return commit_with_prompt(manager, yes).await;
            }
        }
    }
}

/// Print events as JSON lines until Ctrl-C
async fn stream_events(manager: &DeviceManager) -> Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            events = manager.wait_events(Duration::from_secs(1)) => {
                for event in events? {
                    println!("{}", serde_json::to_string(&event)?);
                }
            }
        }
    }
}

async fn monitor(manager: &DeviceManager) -> Result<()> {
    eprintln!("Listening for status events, Ctrl-C to stop.");
    stream_events(manager).await
}

async fn test_mode(manager: &DeviceManager) -> Result<()> {
    manager.enter_test_mode().await.context("Failed to enter test mode")?;
    eprintln!("Test mode active, Ctrl-C to stop.");
    let streamed = stream_events(manager).await;
    manager.exit_test_mode().await.context("Failed to leave test mode")?;
    streamed
}

async fn clear(manager: &DeviceManager, yes: bool) -> Result<()> {
    if !yes && !confirm("Erase every setting stored on the gun?") {
        eprintln!("Clear cancelled.");
        return Ok(());
    }
    manager.clear_storage().await.context("Failed to clear storage")?;
    eprintln!("Storage cleared. Unplug the gun and plug it back in.");
    Ok(())
}
