//! Per-transfer progress channel registry.
//!
//! Channels are keyed by the client's chosen progress key (usually the media
//! id) and created lazily by whichever side shows up first. A channel is
//! retired the moment its terminal event is delivered; a transfer that ends
//! without one (client went away) retires it silently on publisher drop. The
//! mutex-guarded map below is the only state shared across requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use super::event::ProgressEvent;

/// Events buffered per channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 256;

struct ChannelEntry {
    sender: broadcast::Sender<ProgressEvent>,
    publisher_attached: bool,
}

impl ChannelEntry {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            publisher_attached: false,
        }
    }
}

/// Registry of live progress channels.
#[derive(Default)]
pub struct ProgressBus {
    channels: Mutex<HashMap<String, ChannelEntry>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the channel for `key`, creating it if absent.
    ///
    /// Only events published after this call are observed; there is no
    /// replay. Subscribing to a key with no transfer attached yields a
    /// channel that stays quiet until one starts.
    pub fn subscribe(self: &Arc<Self>, key: &str) -> ProgressSubscription {
        let receiver = {
            let mut channels = self.channels.lock();
            let entry = channels
                .entry(key.to_string())
                .or_insert_with(ChannelEntry::new);
            entry.sender.subscribe()
        };
        ProgressSubscription {
            receiver,
            _guard: SubscriberGuard {
                bus: Arc::clone(self),
                key: key.to_string(),
            },
        }
    }

    /// Attach the publishing side for `key`, creating the channel if absent.
    ///
    /// One publisher per transfer; it owns the channel's retirement.
    pub fn publisher(self: &Arc<Self>, key: &str) -> ProgressPublisher {
        let sender = {
            let mut channels = self.channels.lock();
            let entry = channels
                .entry(key.to_string())
                .or_insert_with(ChannelEntry::new);
            entry.publisher_attached = true;
            entry.sender.clone()
        };
        ProgressPublisher {
            bus: Arc::clone(self),
            key: key.to_string(),
            sender,
            closed: AtomicBool::new(false),
        }
    }

    /// Whether a channel currently exists for `key`.
    pub fn is_active(&self, key: &str) -> bool {
        self.channels.lock().contains_key(key)
    }

    fn retire(&self, key: &str) {
        if self.channels.lock().remove(key).is_some() {
            debug!(key, "progress channel retired");
        }
    }

    /// Remove a subscriber-created entry nobody is using anymore, so keys
    /// that never see a transfer do not accumulate in the map.
    fn prune(&self, key: &str) {
        let mut channels = self.channels.lock();
        if let Some(entry) = channels.get(key)
            && !entry.publisher_attached
            && entry.sender.receiver_count() == 0
        {
            channels.remove(key);
        }
    }
}

/// A live subscription to one channel.
pub struct ProgressSubscription {
    receiver: broadcast::Receiver<ProgressEvent>,
    _guard: SubscriberGuard,
}

impl ProgressSubscription {
    /// Receive the next event, or `None` once the channel is retired.
    ///
    /// A lagged subscriber skips ahead to the oldest buffered event instead
    /// of erroring out; the transfer itself is never affected.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

struct SubscriberGuard {
    bus: Arc<ProgressBus>,
    key: String,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.bus.prune(&self.key);
    }
}

/// Publishing side of one transfer's channel.
pub struct ProgressPublisher {
    bus: Arc<ProgressBus>,
    key: String,
    sender: broadcast::Sender<ProgressEvent>,
    closed: AtomicBool,
}

impl ProgressPublisher {
    /// Broadcast an event to current subscribers.
    ///
    /// Delivering a terminal event retires the channel; anything published
    /// after that is dropped.
    pub fn publish(&self, event: ProgressEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let terminal = event.is_terminal();
        if terminal && self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.sender.send(event);
        if terminal {
            self.bus.retire(&self.key);
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ProgressPublisher {
    fn drop(&mut self) {
        // A transfer that never reached a terminal event retires its channel
        // without publishing one, releasing any subscribers.
        if !self.closed.load(Ordering::Acquire) {
            self.bus.retire(&self.key);
        }
    }
}
