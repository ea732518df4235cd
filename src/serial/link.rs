use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::feed::FeedMode;
use super::LineTransport;

type Transport = Box<dyn LineTransport>;

/// Shared handle to the open transport.
///
/// Synchronous sequences take the channel through [`SerialLink::acquire`], which
/// marks the link busy for as long as the returned guard lives. The status feed
/// only reads while the link is idle.
#[derive(Clone)]
pub struct SerialLink {
    transport: Arc<Mutex<Transport>>,
    owners: Arc<AtomicUsize>,
    feed_mode: Arc<AtomicU8>,
}

impl SerialLink {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            owners: Arc::new(AtomicUsize::new(0)),
            feed_mode: Arc::new(AtomicU8::new(FeedMode::Status as u8)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.owners.load(Ordering::SeqCst) > 0
    }

    /// Take exclusive ownership of the channel for a request/response sequence
    pub async fn acquire(&self) -> ChannelGuard {
        // Busy goes up before waiting so the feed backs off immediately.
        self.owners.fetch_add(1, Ordering::SeqCst);
        let busy = BusyMark(self.owners.clone());
        let guard = self.transport.clone().lock_owned().await;
        ChannelGuard { guard, _busy: busy }
    }

    /// Channel for the feed, only when no sequence owns or is waiting for it
    pub(crate) fn try_idle(&self) -> Option<OwnedMutexGuard<Transport>> {
        if self.is_busy() {
            return None;
        }
        let guard = self.transport.clone().try_lock_owned().ok()?;
        // A sequence may have queued up between the check and the lock.
        if self.is_busy() {
            return None;
        }
        Some(guard)
    }

    pub fn feed_mode(&self) -> FeedMode {
        FeedMode::from(self.feed_mode.load(Ordering::SeqCst))
    }

    pub fn set_feed_mode(&self, mode: FeedMode) {
        self.feed_mode.store(mode as u8, Ordering::SeqCst);
    }
}

struct BusyMark(Arc<AtomicUsize>);

impl Drop for BusyMark {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive access to the transport; the link reads as busy until dropped.
pub struct ChannelGuard {
    guard: OwnedMutexGuard<Transport>,
    _busy: BusyMark,
}

impl Deref for ChannelGuard {
    type Target = dyn LineTransport;

    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}

impl DerefMut for ChannelGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::ScriptedTransport;

    #[tokio::test]
    async fn busy_tracks_guard_lifetime() {
        let (transport, _handle) = ScriptedTransport::new(|_| Vec::new());
        let link = SerialLink::new(Box::new(transport));
        assert!(!link.is_busy());

        {
            let _guard = link.acquire().await;
            assert!(link.is_busy());
            assert!(link.try_idle().is_none());
        }

        assert!(!link.is_busy());
        assert!(link.try_idle().is_some());
    }

    #[tokio::test]
    async fn busy_clears_when_sequence_errors() {
        let (transport, _handle) = ScriptedTransport::new(|_| Vec::new());
        let link = SerialLink::new(Box::new(transport));

        async fn failing(link: &SerialLink) -> crate::serial::Result<()> {
            let mut channel = link.acquire().await;
            channel.close();
            channel.write_line("XP", 100).await
        }

        assert!(failing(&link).await.is_err());
        assert!(!link.is_busy());
    }
}
