use pigs_link_lib::config::{AppSettings, BoolSetting};
use pigs_link_lib::device::{BoardType, DeviceError, DeviceManager, SessionState};
use pigs_link_lib::serial::SimulatedGun;
use pretty_assertions::assert_eq;

#[tokio::test(start_paused = true)]
async fn load_populates_both_copies() {
    let gun = SimulatedGun::new();
    let (transport, handle) = gun.transport();
    let manager = DeviceManager::new(AppSettings::default());

    let board = manager.connect_transport("sim", Box::new(transport)).await.unwrap();
    assert_eq!(board.board_type, BoardType::RpiPico);
    assert_eq!(board.codename, "Sunrise");
    assert_eq!(manager.state(), SessionState::Synced);

    let doc = manager.document().await.unwrap();
    assert_eq!(doc.working(), doc.synced());
    assert_eq!(*doc.synced(), gun.settings());
    assert_eq!(manager.diff_count().await.unwrap(), 0);
    assert!(!manager.commit_enabled().await);

    let written = handle.written();
    let order: Vec<&str> = written
        .iter()
        .map(String::as_str)
        .filter(|l| *l != ".")
        .take(6)
        .collect();
    assert_eq!(order, vec!["XP", "Xln", "Xli", "Xlb", "Xlp", "Xls"]);

    manager.disconnect_device().await.unwrap();
    assert!(!handle.is_open());
    assert_eq!(manager.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn pin_block_keeps_alive_while_streaming() {
    let gun = SimulatedGun::new();
    let (transport, handle) = gun.transport();
    let manager = DeviceManager::new(AppSettings::default());
    manager.connect_transport("sim", Box::new(transport)).await.unwrap();

    // 25 pin lines with a keep-alive every 15th
    let keepalives = handle.written().iter().filter(|l| *l == ".").count();
    assert_eq!(keepalives, 1);
    manager.disconnect_device().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn missing_pin_sentinel_aborts_load() {
    let gun = SimulatedGun::new();
    gun.omit_pin_sentinel(true);
    let (transport, handle) = gun.transport();
    let manager = DeviceManager::new(AppSettings::default());

    let err = manager.connect_transport("sim", Box::new(transport)).await.unwrap_err();
    assert!(matches!(err, DeviceError::ProtocolDesync(_)), "got {:?}", err);
    assert_eq!(manager.state(), SessionState::Disconnected);
    assert!(!manager.is_connected().await);
    assert!(!handle.written().iter().any(|l| l == "Xls"));
    assert!(!handle.is_open());
    assert!(matches!(manager.document().await, Err(DeviceError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn one_session_at_a_time() {
    let manager = DeviceManager::new(AppSettings::default());
    let (first, _) = SimulatedGun::new().transport();
    let (second, _) = SimulatedGun::new().transport();

    manager.connect_transport("sim-a", Box::new(first)).await.unwrap();
    let err = manager.connect_transport("sim-b", Box::new(second)).await.unwrap_err();
    assert!(matches!(err, DeviceError::AlreadyConnected));
    manager.disconnect_device().await.unwrap();
    assert!(matches!(manager.disconnect_device().await, Err(DeviceError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn reload_discards_edits() {
    let gun = SimulatedGun::new();
    let (transport, _handle) = gun.transport();
    let manager = DeviceManager::new(AppSettings::default());
    manager.connect_transport("sim", Box::new(transport)).await.unwrap();

    manager.set_bool(BoolSetting::Autofire, true).await.unwrap();
    assert_eq!(manager.state(), SessionState::Editing);

    manager.reload().await.unwrap();
    assert_eq!(manager.diff_count().await.unwrap(), 0);
    assert_eq!(manager.state(), SessionState::Synced);
    manager.disconnect_device().await.unwrap();
}
