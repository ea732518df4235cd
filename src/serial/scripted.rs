use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{LineTransport, Result, SerialError};

type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

#[derive(Debug, Default)]
struct ScriptState {
    incoming: VecDeque<String>,
    written: Vec<String>,
    open: bool,
    stall_writes: bool,
}

/// Test-side view of a [`ScriptedTransport`]: inject unsolicited lines and
/// inspect what the host wrote.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a line as if the device sent it
    pub fn push_line(&self, line: impl Into<String>) {
        self.lock().incoming.push_back(line.into());
    }

    pub fn push_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.lock();
        state.incoming.extend(lines.into_iter().map(Into::into));
    }

    /// Every line the host wrote, in order
    pub fn written(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    /// Make every following write hang until its deadline
    pub fn stall_writes(&self, stall: bool) {
        self.lock().stall_writes = stall;
    }

    pub fn clear_written(&self) {
        self.lock().written.clear();
    }

    /// Lines queued but not yet read by the host
    pub fn pending(&self) -> usize {
        self.lock().incoming.len()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

/// In-process transport whose replies come from a responder closure.
pub struct ScriptedTransport {
    handle: ScriptHandle,
    responder: Responder,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> (Self, ScriptHandle)
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let handle = ScriptHandle::default();
        handle.lock().open = true;
        let transport = Self {
            handle: handle.clone(),
            responder: Box::new(responder),
        };
        (transport, handle)
    }
}

#[async_trait]
impl LineTransport for ScriptedTransport {
    async fn write_line(&mut self, line: &str, timeout_ms: u64) -> Result<()> {
        if !self.handle.is_open() {
            return Err(SerialError::NotConnected);
        }
        let stalled = self.handle.lock().stall_writes;
        if stalled {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            return Err(SerialError::Timeout(format!("write of {}", line)));
        }
        let replies = (self.responder)(line);
        let mut state = self.handle.lock();
        state.written.push(line.to_string());
        state.incoming.extend(replies);
        Ok(())
    }

    async fn read_line(&mut self, timeout_ms: u64) -> Result<Option<String>> {
        if !self.handle.is_open() {
            return Err(SerialError::NotConnected);
        }
        let queued = self.handle.lock().incoming.pop_front();
        if queued.is_some() {
            return Ok(queued);
        }
        tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
        Ok(self.handle.lock().incoming.pop_front())
    }

    fn close(&mut self) {
        self.handle.lock().open = false;
    }

    fn is_open(&self) -> bool {
        self.handle.is_open()
    }
}
