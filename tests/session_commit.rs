use pigs_link_lib::config::{AppSettings, BoolSetting, Change, LogicalInput, Tunable};
use pigs_link_lib::device::{CommitOutcome, DeviceError, DeviceManager, SessionState};
use pigs_link_lib::serial::simulator::demo_settings;
use pigs_link_lib::serial::protocol::SAVE_STARTED;
use pigs_link_lib::serial::{ScriptHandle, ScriptedTransport, SimulatedGun};
use pretty_assertions::assert_eq;

async fn connected(gun: &SimulatedGun) -> (DeviceManager, ScriptHandle) {
    let (transport, handle) = gun.transport();
    let manager = DeviceManager::new(AppSettings::default());
    manager.connect_transport("sim", Box::new(transport)).await.unwrap();
    (manager, handle)
}

#[tokio::test(start_paused = true)]
async fn commit_without_edits_still_saves() {
    let gun = SimulatedGun::new();
    let (manager, handle) = connected(&gun).await;
    handle.clear_written();

    let mut seen = None;
    let outcome = manager
        .commit(
            |report| {
                seen = Some(report.count());
                true
            },
            |_| {},
        )
        .await
        .unwrap();

    assert_eq!(outcome, CommitOutcome::Committed);
    assert_eq!(seen, Some(0));
    assert_eq!(gun.save_count(), 1);
    assert!(handle.written().iter().any(|l| l == "XS"));
    assert_eq!(manager.diff_count().await.unwrap(), 0);
    manager.disconnect_device().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn boolean_edit_round_trip() {
    let gun = SimulatedGun::new();
    let (manager, _handle) = connected(&gun).await;

    manager.set_bool(BoolSetting::Rumble, false).await.unwrap();
    assert_eq!(manager.diff_count().await.unwrap(), 1);
    assert_eq!(manager.state(), SessionState::Editing);
    assert!(manager.commit_enabled().await);

    let mut last_progress = None;
    let outcome = manager
        .commit(|_| true, |progress| last_progress = Some(progress))
        .await
        .unwrap();
    assert_eq!(outcome, CommitOutcome::Committed);

    let progress = last_progress.unwrap();
    assert_eq!(progress.completed, progress.total);

    let doc = manager.document().await.unwrap();
    assert!(!doc.synced().booleans.get(BoolSetting::Rumble));
    assert_eq!(manager.diff_count().await.unwrap(), 0);
    assert_eq!(manager.state(), SessionState::Synced);
    assert!(!gun.settings().booleans.get(BoolSetting::Rumble));
    manager.disconnect_device().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn pin_reassignment_moves_function() {
    let mut settings = demo_settings();
    settings.booleans.set(BoolSetting::CustomPins, true);
    settings.pins.assign(5, Some(LogicalInput::Trigger)).unwrap();
    let gun = SimulatedGun::with_settings(settings);
    let (manager, _handle) = connected(&gun).await;

    manager.assign_pin(6, Some(LogicalInput::Trigger)).await.unwrap();
    let doc = manager.document().await.unwrap();
    assert_eq!(doc.working().pins.pin_for(LogicalInput::Trigger), Some(6));
    assert_eq!(doc.working().pins.input_on(5), None);
    assert_eq!(manager.diff_report().await.unwrap().changes, vec![Change::PinMap]);

    manager.commit(|_| true, |_| {}).await.unwrap();
    let device = gun.settings();
    assert_eq!(device.pins.pin_for(LogicalInput::Trigger), Some(6));
    assert_eq!(device.pins.input_on(5), None);
    assert_eq!(manager.diff_count().await.unwrap(), 0);
    manager.disconnect_device().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancelled_commit_sends_nothing() {
    let gun = SimulatedGun::new();
    let (manager, handle) = connected(&gun).await;
    manager.set_tunable(Tunable::RumbleStrength, 200).await.unwrap();
    handle.clear_written();

    let outcome = manager.commit(|_| false, |_| {}).await.unwrap();
    assert_eq!(outcome, CommitOutcome::Cancelled);
    assert!(handle.written().is_empty());
    assert_eq!(gun.save_count(), 0);
    assert_eq!(manager.diff_count().await.unwrap(), 1);
    manager.disconnect_device().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn timeout_mid_queue_keeps_edits() {
    let gun = SimulatedGun::new();
    let (manager, handle) = connected(&gun).await;
    manager.set_bool(BoolSetting::Autofire, true).await.unwrap();
    let before = manager.document().await.unwrap();

    gun.go_silent_after_sets(4);
    handle.clear_written();
    let err = manager.commit(|_| true, |_| {}).await.unwrap_err();
    assert!(matches!(err, DeviceError::Timeout(_)), "got {:?}", err);

    let written = handle.written();
    assert_eq!(written.first().map(String::as_str), Some("Xm"));
    assert_eq!(written.iter().filter(|l| l.starts_with("Xm.")).count(), 5);
    assert!(!written.iter().any(|l| l == "XS"));
    assert_eq!(gun.save_count(), 0);

    assert_eq!(manager.document().await.unwrap(), before);
    assert_eq!(manager.diff_count().await.unwrap(), 1);
    assert_eq!(manager.state(), SessionState::Editing);
    manager.disconnect_device().await.unwrap();
}

/// Session over `gun` where `overrides` can replace the reply to any line
async fn connected_with<F>(gun: &SimulatedGun, mut overrides: F) -> (DeviceManager, ScriptHandle)
where
    F: FnMut(&str) -> Option<Vec<String>> + Send + 'static,
{
    let device = gun.clone();
    let (transport, handle) =
        ScriptedTransport::new(move |line| overrides(line).unwrap_or_else(|| device.respond(line)));
    let manager = DeviceManager::new(AppSettings::default());
    manager.connect_transport("sim", Box::new(transport)).await.unwrap();
    (manager, handle)
}

#[tokio::test(start_paused = true)]
async fn rejected_set_stops_the_queue() {
    let gun = SimulatedGun::new();
    let (manager, handle) = connected_with(&gun, |line| {
        (line == "Xm.0.2.0").then(|| vec!["ERR: nope".to_string()])
    })
    .await;
    manager.set_bool(BoolSetting::Rumble, false).await.unwrap();
    let before = manager.document().await.unwrap();
    handle.clear_written();

    let err = manager.commit(|_| true, |_| {}).await.unwrap_err();
    assert!(matches!(err, DeviceError::CommitFailed(_)), "got {:?}", err);

    let written = handle.written();
    assert_eq!(written.last().map(String::as_str), Some("Xm.0.2.0"));
    assert_eq!(written.iter().filter(|l| l.starts_with("Xm.")).count(), 3);
    assert!(!written.iter().any(|l| l == "XS"));
    assert_eq!(gun.save_count(), 0);

    let after = manager.document().await.unwrap();
    assert_eq!(after.synced(), before.synced());
    assert_eq!(after, before);
    assert_eq!(manager.diff_count().await.unwrap(), 1);
    manager.disconnect_device().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_save_fails_commit() {
    let gun = SimulatedGun::new();
    let (manager, handle) = connected_with(&gun, |line| {
        (line == "XS").then(|| vec![SAVE_STARTED.to_string(), "Write failed".to_string()])
    })
    .await;
    manager.set_bool(BoolSetting::Rumble, false).await.unwrap();
    let before = manager.document().await.unwrap();
    handle.clear_written();

    let err = manager.commit(|_| true, |_| {}).await.unwrap_err();
    assert!(matches!(err, DeviceError::ProtocolDesync(_)), "got {:?}", err);

    // Every set command went through, then nothing after the save.
    let written = handle.written();
    assert_eq!(written.last().map(String::as_str), Some("XS"));
    assert_eq!(written.iter().filter(|l| *l == "XS").count(), 1);
    assert!(!gun.settings().booleans.get(BoolSetting::Rumble));

    let after = manager.document().await.unwrap();
    assert_eq!(after.synced(), before.synced());
    assert!(after.synced().booleans.get(BoolSetting::Rumble));
    assert_eq!(manager.diff_count().await.unwrap(), 1);
    assert_eq!(manager.state(), SessionState::Editing);
    manager.disconnect_device().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stalled_write_times_out() {
    let gun = SimulatedGun::new();
    let (manager, handle) = connected(&gun).await;
    manager.set_bool(BoolSetting::Rumble, false).await.unwrap();
    handle.clear_written();
    handle.stall_writes(true);

    let started = tokio::time::Instant::now();
    let err = manager.commit(|_| true, |_| {}).await.unwrap_err();
    assert!(matches!(err, DeviceError::Timeout(_)), "got {:?}", err);
    assert!(started.elapsed() >= std::time::Duration::from_millis(AppSettings::default().timeouts.commit_ms));

    assert!(handle.written().is_empty());
    assert_eq!(gun.save_count(), 0);
    assert_eq!(manager.diff_count().await.unwrap(), 1);

    handle.stall_writes(false);
    manager.disconnect_device().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn invalid_edits_leave_working_copy_alone() {
    let gun = SimulatedGun::new();
    let (manager, _handle) = connected(&gun).await;

    let err = manager.assign_pin(40, Some(LogicalInput::Trigger)).await.unwrap_err();
    assert!(matches!(err, DeviceError::InvalidEdit(_)));
    assert!(manager.set_usb_name("bad\nname").await.is_err());
    assert!(manager.select_profile(4).await.is_err());
    assert_eq!(manager.diff_count().await.unwrap(), 0);
    manager.disconnect_device().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn profile_switch_is_sent_immediately() {
    let gun = SimulatedGun::new();
    let (manager, handle) = connected(&gun).await;

    manager.select_profile(2).await.unwrap();
    assert!(handle.written().iter().any(|l| l == "XC3"));
    assert_eq!(gun.settings().selected_profile, 2);
    assert_eq!(manager.diff_count().await.unwrap(), 1);

    manager.commit(|_| true, |_| {}).await.unwrap();
    assert_eq!(manager.document().await.unwrap().synced().selected_profile, 2);
    manager.disconnect_device().await.unwrap();
}
