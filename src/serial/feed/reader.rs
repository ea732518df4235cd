use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::{FeedMode, Point, StatusEvent, TestPoints};
use crate::config::{Calibration, PROFILE_COUNT};
use crate::serial::{LineTransport, Result, SerialLink};

const EVENT_CAPACITY: usize = 256;

/// Recognised unsolicited status lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLine {
    Pressed(u8),
    Released(u8),
    Profile(u8),
    /// Followed by four calibration lines
    UpdatedProfile(u8),
}

fn value_after(line: &str, token: &str) -> Option<u8> {
    let (_, rest) = line.split_once(token)?;
    rest.trim().parse().ok()
}

fn profile_after(line: &str, token: &str) -> Option<u8> {
    value_after(line, token).filter(|p| (*p as usize) < PROFILE_COUNT)
}

pub fn parse_status_line(line: &str) -> Option<StatusLine> {
    if line.contains("UpdatedProf: ") {
        profile_after(line, "UpdatedProf: ").map(StatusLine::UpdatedProfile)
    } else if line.contains("Profile: ") {
        profile_after(line, "Profile: ").map(StatusLine::Profile)
    } else if line.contains("Pressed:") {
        value_after(line, "Pressed:").map(StatusLine::Pressed)
    } else if line.contains("Released:") {
        value_after(line, "Released:").map(StatusLine::Released)
    } else {
        None
    }
}

/// Test-mode frame: exactly 12 comma-separated integers
pub fn parse_telemetry_line(line: &str) -> Option<TestPoints> {
    let values: Vec<i32> = line.split(',').map(|v| v.trim().parse().ok()).collect::<Option<_>>()?;
    if values.len() != 12 {
        return None;
    }
    let point = |i: usize| Point { x: values[i * 2], y: values[i * 2 + 1] };
    Some(TestPoints {
        top_left: point(0),
        top_right: point(1),
        bottom_left: point(2),
        bottom_right: point(3),
        median: point(4),
        aim: point(5),
    })
}

/// Interpret one idle line, reading the inline calibration payload if it has one
async fn interpret(line: String, io: &mut dyn LineTransport, payload_ms: u64) -> Result<StatusEvent> {
    let event = match parse_status_line(&line) {
        Some(StatusLine::Pressed(button)) => StatusEvent::ButtonPressed { button },
        Some(StatusLine::Released(button)) => StatusEvent::ButtonReleased { button },
        Some(StatusLine::Profile(profile)) => StatusEvent::ProfileChanged { profile },
        Some(StatusLine::UpdatedProfile(profile)) => {
            let mut values = [0i32; 4];
            for slot in values.iter_mut() {
                match io.read_line(payload_ms).await? {
                    Some(value) => match value.trim().parse() {
                        Ok(v) => *slot = v,
                        Err(_) => {
                            log::warn!("Bad calibration value for profile {}: {:?}", profile, value);
                            return Ok(StatusEvent::ProfileChanged { profile });
                        }
                    },
                    None => {
                        log::warn!("Calibration payload for profile {} cut short", profile);
                        return Ok(StatusEvent::ProfileChanged { profile });
                    }
                }
            }
            let [x_scale, y_scale, x_center, y_center] = values;
            StatusEvent::ProfileUpdated {
                profile,
                calibration: Calibration { x_scale, y_scale, x_center, y_center },
            }
        }
        None => {
            log::debug!("Unclassified feed line: {}", line);
            StatusEvent::Unclassified { line }
        }
    };
    Ok(event)
}

/// Read at most one event while the link is idle
async fn poll_once(link: &SerialLink, poll_ms: u64, payload_ms: u64) -> Result<Option<StatusEvent>> {
    let Some(mut channel) = link.try_idle() else {
        tokio::time::sleep(Duration::from_millis(poll_ms)).await;
        return Ok(None);
    };
    let Some(line) = channel.read_line(poll_ms).await? else {
        return Ok(None);
    };

    let event = match link.feed_mode() {
        FeedMode::Telemetry => match parse_telemetry_line(&line) {
            Some(points) => StatusEvent::Telemetry(points),
            None => StatusEvent::Unclassified { line },
        },
        FeedMode::Status => interpret(line, &mut **channel, payload_ms).await?,
    };
    Ok(Some(event))
}

pub struct FeedHandle {
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(()).await;
        let abort = self.task.abort_handle();
        if tokio::time::timeout(Duration::from_secs(1), self.task).await.is_err() {
            log::warn!("Status feed did not stop in time, aborting");
            abort.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the background reader that turns idle-time lines into events.
///
/// Events are never dropped: once the queue is full the feed stops reading
/// until the receiver catches up, leaving further lines in the transport.
pub fn spawn_status_feed(link: SerialLink, poll_ms: u64, payload_ms: u64) -> (FeedHandle, mpsc::Receiver<StatusEvent>) {
    let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

    let task = tokio::spawn(async move {
        log::info!("Status feed started");
        loop {
            select! {
                _ = stop_rx.recv() => break,
                polled = poll_once(&link, poll_ms, payload_ms) => match polled {
                    Ok(Some(event)) => select! {
                        _ = stop_rx.recv() => break,
                        sent = events_tx.send(event) => {
                            if sent.is_err() {
                                log::info!("Status event receiver dropped");
                                break;
                            }
                        }
                    },
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("Status feed read failed: {}", e);
                        break;
                    }
                }
            }
        }
        log::info!("Status feed stopped");
    });

    (FeedHandle { stop_tx, task }, events_rx)
}
