use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use super::{
    BoardIdentity, CommitOutcome, CommitProgress, ConnectionState, Device, DeviceError, PulseKind, Result,
    SessionSnapshot, SessionState, StatusEvent,
};
use crate::config::{
    AppSettings, BoolSetting, DiffReport, IrSensitivity, LogicalInput, RunMode, SettingsDocument,
    SettingsError, Tunable, PROFILE_COUNT,
};
use crate::serial::feed::{spawn_status_feed, FeedHandle, FeedMode};
use crate::serial::protocol::{Command, LoadedDevice};
use crate::serial::{ConfigProtocol, LineTransport, SerialInterface, SerialLink};

struct Session {
    device_id: Option<Uuid>,
    port_name: String,
    link: SerialLink,
    feed: Option<FeedHandle>,
    events: mpsc::Receiver<StatusEvent>,
    board: BoardIdentity,
    document: SettingsDocument,
    state: SessionState,
}

/// Session controller.
/// Owns discovery, the single open session, the settings document and every
/// exchange with the gun.
pub struct DeviceManager {
    settings: AppSettings,
    devices: Arc<RwLock<HashMap<Uuid, Device>>>,
    session: Arc<Mutex<Option<Session>>>,
    state_tx: watch::Sender<SessionState>,
}

impl DeviceManager {
    pub fn new(settings: AppSettings) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            settings,
            devices: Arc::new(RwLock::new(HashMap::new())),
            session: Arc::new(Mutex::new(None)),
            state_tx,
        }
    }

    pub fn app_settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Discover light guns on the known VID/PID list
    pub async fn discover_devices(&self) -> Result<Vec<Device>> {
        let serial_devices = SerialInterface::discover_devices(&self.settings.known_devices)?;

        let mut devices_guard = self.devices.write().await;
        let mut discovered_devices = Vec::new();

        for serial_info in serial_devices {
            let existing = devices_guard
                .values_mut()
                .find(|d| d.port_name == serial_info.port_name);

            match existing {
                Some(device) => {
                    // Keep the id and connection state, refresh the rest.
                    device.display_name = serial_info.display_name.clone();
                    device.serial_number = serial_info.serial_number.clone();
                    device.manufacturer = serial_info.manufacturer.clone();
                    device.product = serial_info.product.clone();
                    device.last_seen = chrono::Utc::now();
                    discovered_devices.push(device.clone());
                }
                None => {
                    let device = Device::from_serial_info(&serial_info);
                    devices_guard.insert(device.id, device.clone());
                    discovered_devices.push(device);
                }
            }
        }

        Ok(discovered_devices)
    }

    /// Get all known devices
    pub async fn get_devices(&self) -> Vec<Device> {
        let devices_guard = self.devices.read().await;
        devices_guard.values().cloned().collect()
    }

    /// Get a specific device by ID
    pub async fn get_device(&self, device_id: &Uuid) -> Option<Device> {
        let devices_guard = self.devices.read().await;
        devices_guard.get(device_id).cloned()
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        log::debug!("Session state: {:?}", state);
        self.state_tx.send_replace(state);
    }

    /// Open a discovered device, then identify it and load its settings
    pub async fn connect_device(&self, device_id: &Uuid) -> Result<BoardIdentity> {
        let mut session_guard = self.session.lock().await;
        if session_guard.is_some() {
            return Err(DeviceError::AlreadyConnected);
        }

        let device = self.get_device(device_id).await.ok_or(DeviceError::NotFound)?;
        self.update_device_connection_state(device_id, ConnectionState::Connecting).await;

        let mut interface = SerialInterface::new();
        log::info!("Attempting to connect to port: {}", device.port_name);
        if let Err(e) = interface.connect(&device.serial_info(), self.settings.baud_rate) {
            let err = DeviceError::from(e);
            self.update_device_connection_state(device_id, ConnectionState::Error(err.to_string())).await;
            return Err(err);
        }

        match self.open_session(Box::new(interface), &device.port_name, Some(*device_id)).await {
            Ok(session) => {
                let board = session.board.clone();
                *session_guard = Some(session);
                let mut devices_guard = self.devices.write().await;
                if let Some(device) = devices_guard.get_mut(device_id) {
                    device.update_board(board.clone());
                    device.update_connection_state(ConnectionState::Connected);
                }
                Ok(board)
            }
            Err(err) => {
                self.update_device_connection_state(device_id, ConnectionState::Error(err.to_string())).await;
                Err(err)
            }
        }
    }

    /// Connect to the first discovered light gun
    pub async fn connect_first_available(&self) -> Result<BoardIdentity> {
        let devices = self.discover_devices().await?;
        let device = devices
            .first()
            .ok_or_else(|| DeviceError::TransportUnavailable("no P.I.G.S light guns detected".into()))?;
        self.connect_device(&device.id).await
    }

    /// Connect to the light gun detected on `port_name`
    pub async fn connect_port(&self, port_name: &str) -> Result<BoardIdentity> {
        let devices = self.discover_devices().await?;
        let device = devices
            .iter()
            .find(|d| d.port_name == port_name)
            .ok_or_else(|| DeviceError::TransportUnavailable(format!("no P.I.G.S light gun on {}", port_name)))?;
        self.connect_device(&device.id).await
    }

    /// Run a session over an already open transport, such as the simulator
    pub async fn connect_transport(&self, port_name: &str, transport: Box<dyn LineTransport>) -> Result<BoardIdentity> {
        let mut session_guard = self.session.lock().await;
        if session_guard.is_some() {
            return Err(DeviceError::AlreadyConnected);
        }
        let session = self.open_session(transport, port_name, None).await?;
        let board = session.board.clone();
        *session_guard = Some(session);
        Ok(board)
    }

    async fn open_session(&self, transport: Box<dyn LineTransport>, port_name: &str, device_id: Option<Uuid>) -> Result<Session> {
        let link = SerialLink::new(transport);
        let loaded = match self.load(&link).await {
            Ok(loaded) => loaded,
            Err(e) => {
                log::error!("Load from {} failed: {}", port_name, e);
                link.acquire().await.close();
                self.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };

        let timeouts = &self.settings.timeouts;
        let (feed, events) = spawn_status_feed(link.clone(), timeouts.feed_poll_ms, timeouts.pin_line_ms);
        self.set_state(SessionState::Synced);
        log::info!("Connected to {} on {}", loaded.board.board_type, port_name);

        Ok(Session {
            device_id,
            port_name: port_name.to_string(),
            link,
            feed: Some(feed),
            events,
            board: loaded.board,
            document: SettingsDocument::from_loaded(loaded.settings),
            state: SessionState::Synced,
        })
    }

    async fn load(&self, link: &SerialLink) -> Result<LoadedDevice> {
        let mut channel = link.acquire().await;
        let mut protocol = ConfigProtocol::new(&mut *channel, &self.settings);
        let loaded = protocol
            .load_all(|stage| {
                log::info!("Load stage: {:?}", stage);
                self.set_state(stage.into());
            })
            .await?;
        Ok(loaded)
    }

    /// Discard pending edits and load everything from the gun again.
    ///
    /// A failed reload closes the session.
    pub async fn reload(&self) -> Result<()> {
        let mut session_guard = self.session.lock().await;
        let session = session_guard.as_mut().ok_or(DeviceError::NotConnected)?;
        if session.state == SessionState::TestMode {
            return Err(DeviceError::TestModeActive);
        }

        match self.load(&session.link).await {
            Ok(loaded) => {
                session.board = loaded.board;
                session.document = SettingsDocument::from_loaded(loaded.settings);
                session.state = SessionState::Synced;
                self.set_state(SessionState::Synced);
                Ok(())
            }
            Err(e) => {
                if let Some(session) = session_guard.take() {
                    self.teardown(session, false).await;
                }
                Err(e)
            }
        }
    }

    /// Undock the gun and close the session
    pub async fn disconnect_device(&self) -> Result<()> {
        let session = self.session.lock().await.take().ok_or(DeviceError::NotConnected)?;
        self.teardown(session, true).await;
        Ok(())
    }

    async fn teardown(&self, mut session: Session, undock: bool) {
        if let Some(feed) = session.feed.take() {
            feed.stop().await;
        }

        let mut channel = session.link.acquire().await;
        if undock && channel.is_open() {
            let mut protocol = ConfigProtocol::new(&mut *channel, &self.settings);
            if let Err(e) = protocol.exit().await {
                log::warn!("Failed to undock gun: {}", e);
            }
        }
        channel.close();
        drop(channel);

        if let Some(device_id) = session.device_id {
            self.update_device_connection_state(&device_id, ConnectionState::Disconnected).await;
        }
        self.set_state(SessionState::Disconnected);
        log::info!("Disconnected from {}", session.port_name);
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Apply an edit to the working copy
    pub async fn edit<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut SettingsDocument) -> std::result::Result<R, SettingsError>,
    {
        let mut session_guard = self.session.lock().await;
        let session = session_guard.as_mut().ok_or(DeviceError::NotConnected)?;
        if session.state == SessionState::TestMode {
            return Err(DeviceError::TestModeActive);
        }
        let out = f(&mut session.document)?;
        self.refresh_state(session);
        Ok(out)
    }

    pub async fn set_bool(&self, setting: BoolSetting, value: bool) -> Result<()> {
        self.edit(|doc| {
            doc.set_bool(setting, value);
            Ok(())
        })
        .await
    }

    pub async fn set_tunable(&self, tunable: Tunable, value: u16) -> Result<()> {
        self.edit(|doc| {
            doc.set_tunable(tunable, value);
            Ok(())
        })
        .await
    }

    pub async fn assign_pin(&self, pin: u8, input: Option<LogicalInput>) -> Result<()> {
        self.edit(|doc| doc.assign_pin(pin, input)).await
    }

    pub async fn set_ir_sensitivity(&self, profile: u8, value: IrSensitivity) -> Result<()> {
        self.edit(|doc| doc.set_ir_sensitivity(profile, value)).await
    }

    pub async fn set_run_mode(&self, profile: u8, value: RunMode) -> Result<()> {
        self.edit(|doc| doc.set_run_mode(profile, value)).await
    }

    pub async fn set_usb_id(&self, id: &str) -> Result<()> {
        self.edit(|doc| doc.set_usb_id(id)).await
    }

    pub async fn set_usb_name(&self, name: &str) -> Result<()> {
        self.edit(|doc| doc.set_usb_name(name)).await
    }

    pub async fn revert_edits(&self) -> Result<()> {
        self.edit(|doc| {
            doc.revert();
            Ok(())
        })
        .await
    }

    fn refresh_state(&self, session: &mut Session) {
        if matches!(session.state, SessionState::Synced | SessionState::Editing) {
            session.state = if session.document.has_changes() {
                SessionState::Editing
            } else {
                SessionState::Synced
            };
            self.set_state(session.state);
        }
    }

    pub async fn document(&self) -> Result<SettingsDocument> {
        let session_guard = self.session.lock().await;
        let session = session_guard.as_ref().ok_or(DeviceError::NotConnected)?;
        Ok(session.document.clone())
    }

    pub async fn board(&self) -> Result<BoardIdentity> {
        let session_guard = self.session.lock().await;
        let session = session_guard.as_ref().ok_or(DeviceError::NotConnected)?;
        Ok(session.board.clone())
    }

    pub async fn diff_count(&self) -> Result<usize> {
        Ok(self.document().await?.diff_count())
    }

    pub async fn diff_report(&self) -> Result<DiffReport> {
        Ok(self.document().await?.diff_report())
    }

    /// Whether there is anything to commit. Advisory: a commit with no
    /// changes still rewrites and saves every setting.
    pub async fn commit_enabled(&self) -> bool {
        self.diff_count().await.map(|n| n > 0).unwrap_or(false)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let session_guard = self.session.lock().await;
        let session = session_guard.as_ref().ok_or(DeviceError::NotConnected)?;
        Ok(SessionSnapshot {
            port_name: session.port_name.clone(),
            state: session.state,
            board: session.board.clone(),
            board_name: session.board.board_type.pretty_name(),
            document: session.document.clone(),
            diff: session.document.diff_report(),
        })
    }

    /// Write the working copy to the gun and save it.
    ///
    /// `confirm` sees the pending changes and may cancel. On failure nothing is
    /// reconciled, so the same edits can be committed again.
    pub async fn commit<C, P>(&self, confirm: C, on_progress: P) -> Result<CommitOutcome>
    where
        C: FnOnce(&DiffReport) -> bool,
        P: FnMut(CommitProgress),
    {
        let mut session_guard = self.session.lock().await;
        let session = session_guard.as_mut().ok_or(DeviceError::NotConnected)?;
        if session.state == SessionState::TestMode {
            return Err(DeviceError::TestModeActive);
        }

        let report = session.document.diff_report();
        if !confirm(&report) {
            log::info!("Commit cancelled by operator");
            return Ok(CommitOutcome::Cancelled);
        }

        let working = session.document.working().clone();
        session.state = SessionState::Committing;
        self.set_state(SessionState::Committing);

        let result = {
            let mut channel = session.link.acquire().await;
            if !channel.is_open() {
                Err(crate::serial::SerialError::NotConnected)
            } else {
                let mut protocol = ConfigProtocol::new(&mut *channel, &self.settings);
                protocol.commit(&working, on_progress).await
            }
        };

        session.state = SessionState::Synced;
        match result {
            Ok(()) => {
                session.document.mark_committed();
                self.refresh_state(session);
                log::info!("Commit complete, {} change(s) saved", report.count());
                Ok(CommitOutcome::Committed)
            }
            Err(e) => {
                self.refresh_state(session);
                log::error!("Commit failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Switch the gun to `profile` right away; the change stays pending until committed
    pub async fn select_profile(&self, profile: u8) -> Result<()> {
        if profile as usize >= PROFILE_COUNT {
            return Err(SettingsError::ProfileOutOfRange(profile).into());
        }
        let mut session_guard = self.session.lock().await;
        let session = session_guard.as_mut().ok_or(DeviceError::NotConnected)?;
        if session.state == SessionState::TestMode {
            return Err(DeviceError::TestModeActive);
        }

        {
            let mut channel = session.link.acquire().await;
            ConfigProtocol::new(&mut *channel, &self.settings)
                .fire(&Command::SelectProfile(profile))
                .await?;
        }
        session.document.select_profile(profile)?;
        self.refresh_state(session);
        Ok(())
    }

    /// Start on-device calibration of the selected profile.
    /// Results come back through the status feed.
    pub async fn calibrate(&self) -> Result<()> {
        self.fire(Command::Calibrate, false).await
    }

    pub async fn pulse(&self, kind: PulseKind) -> Result<()> {
        let command = match kind {
            PulseKind::Rumble => Command::RumblePulse,
            PulseKind::Solenoid => Command::SolenoidPulse,
        };
        self.fire(command, true).await
    }

    async fn fire(&self, command: Command, allowed_in_test_mode: bool) -> Result<()> {
        let session_guard = self.session.lock().await;
        let session = session_guard.as_ref().ok_or(DeviceError::NotConnected)?;
        if !allowed_in_test_mode && session.state == SessionState::TestMode {
            return Err(DeviceError::TestModeActive);
        }
        let mut channel = session.link.acquire().await;
        ConfigProtocol::new(&mut *channel, &self.settings).fire(&command).await?;
        Ok(())
    }

    pub async fn enter_test_mode(&self) -> Result<()> {
        let mut session_guard = self.session.lock().await;
        let session = session_guard.as_mut().ok_or(DeviceError::NotConnected)?;
        if session.state == SessionState::TestMode {
            return Ok(());
        }

        let entered = {
            let mut channel = session.link.acquire().await;
            ConfigProtocol::new(&mut *channel, &self.settings).enter_test_mode().await?
        };
        if !entered {
            return Err(DeviceError::ProtocolDesync("gun did not confirm test mode".into()));
        }

        session.link.set_feed_mode(FeedMode::Telemetry);
        session.state = SessionState::TestMode;
        self.set_state(SessionState::TestMode);
        log::info!("Test mode active");
        Ok(())
    }

    pub async fn exit_test_mode(&self) -> Result<()> {
        let mut session_guard = self.session.lock().await;
        let session = session_guard.as_mut().ok_or(DeviceError::NotConnected)?;
        if session.state != SessionState::TestMode {
            return Ok(());
        }

        {
            let mut channel = session.link.acquire().await;
            ConfigProtocol::new(&mut *channel, &self.settings).exit().await?;
        }
        session.link.set_feed_mode(FeedMode::Status);
        session.state = SessionState::Synced;
        self.refresh_state(session);
        log::info!("Test mode ended");
        Ok(())
    }

    /// Wipe the gun's saved settings. The session ends afterwards.
    pub async fn clear_storage(&self) -> Result<()> {
        let mut session_guard = self.session.lock().await;
        let session = session_guard.as_mut().ok_or(DeviceError::NotConnected)?;
        if session.state == SessionState::TestMode {
            return Err(DeviceError::TestModeActive);
        }

        {
            let mut channel = session.link.acquire().await;
            ConfigProtocol::new(&mut *channel, &self.settings).clear_storage().await?;
        }

        if let Some(session) = session_guard.take() {
            self.teardown(session, true).await;
        }
        Ok(())
    }

    /// Apply and return every event the feed has queued
    pub async fn poll_events(&self) -> Result<Vec<StatusEvent>> {
        let mut session_guard = self.session.lock().await;
        let session = session_guard.as_mut().ok_or(DeviceError::NotConnected)?;

        let mut events = Vec::new();
        loop {
            match session.events.try_recv() {
                Ok(event) => {
                    self.apply_event(session, &event);
                    events.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if events.is_empty() {
                        return Err(DeviceError::TransportUnavailable("status feed ended".into()));
                    }
                    break;
                }
            }
        }
        Ok(events)
    }

    /// Wait up to `timeout` for at least one feed event
    pub async fn wait_events(&self, timeout: Duration) -> Result<Vec<StatusEvent>> {
        let deadline = Instant::now() + timeout;
        loop {
            let events = self.poll_events().await?;
            if !events.is_empty() || Instant::now() >= deadline {
                return Ok(events);
            }
            tokio::time::sleep(Duration::from_millis(self.settings.timeouts.feed_poll_ms)).await;
        }
    }

    fn apply_event(&self, session: &mut Session, event: &StatusEvent) {
        let applied = match event {
            StatusEvent::ProfileChanged { profile } => session.document.select_profile(*profile),
            StatusEvent::ProfileUpdated { profile, calibration } => session
                .document
                .select_profile(*profile)
                .and_then(|_| session.document.apply_calibration(*profile, *calibration)),
            _ => Ok(()),
        };
        if let Err(e) = applied {
            log::warn!("Ignoring status event {:?}: {}", event, e);
        }
        self.refresh_state(session);
    }

    /// Helper method to update device connection state
    async fn update_device_connection_state(&self, device_id: &Uuid, state: ConnectionState) {
        let mut devices_guard = self.devices.write().await;
        if let Some(device) = devices_guard.get_mut(device_id) {
            device.update_connection_state(state);
        }
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new(AppSettings::default())
    }
}
