//! Update broadcasting
//!
//! Named publish/subscribe channels shared by every connected client.
//! Subscribers only see messages published after they subscribed; delivery
//! is best-effort with no acknowledgement or retry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::BroadcastMessage;

/// Channel the worker publishes cache updates on.
pub const CACHE_UPDATES_CHANNEL: &str = "cache-updates";

const DEFAULT_CAPACITY: usize = 64;

// == Update Event ==
/// A cache partition changed for `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub cache_name: String,
    pub url: String,
    /// Unix milliseconds
    pub timestamp: u64,
    /// False when the comparator found the old and new responses identical
    pub changed: bool,
}

impl From<UpdateEvent> for BroadcastMessage {
    fn from(event: UpdateEvent) -> Self {
        BroadcastMessage::CacheUpdated {
            timestamp: event.timestamp,
            url: Some(event.url),
            cache_name: Some(event.cache_name),
            are_responses_same: Some(!event.changed),
        }
    }
}

// == Broadcast Hub ==
/// Registry of named channels. Clones share the same channels.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<BroadcastMessage>>>>,
    capacity: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastHub {
    /// `capacity` is how many messages a slow subscriber may fall behind
    /// before it starts missing them.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    // == Publish ==
    /// Sends `message` to everyone currently subscribed to `channel`.
    ///
    /// Returns how many subscribers it reached; zero is not an error.
    pub fn publish(&self, channel: &str, message: impl Into<BroadcastMessage>) -> usize {
        let message = message.into();
        let channels = self.lock();
        let Some(sender) = channels.get(channel) else {
            debug!(channel, "No subscribers, dropping broadcast");
            return 0;
        };

        match sender.send(message) {
            Ok(reached) => {
                debug!(channel, reached, "Broadcast published");
                reached
            }
            Err(_) => {
                debug!(channel, "No subscribers, dropping broadcast");
                0
            }
        }
    }

    // == Subscribe ==
    /// Starts receiving messages published on `channel` from now on.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let receiver = self
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        Subscription {
            channel: channel.to_string(),
            receiver: Some(receiver),
        }
    }

    /// Runs `handler` once per message, in publish order, on a background
    /// task.
    pub fn subscribe_with<F>(&self, channel: &str, mut handler: F) -> Listener
    where
        F: FnMut(BroadcastMessage) + Send + 'static,
    {
        let mut subscription = self.subscribe(channel);
        let handle = tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                handler(message);
            }
        });
        Listener { handle }
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock()
            .get(channel)
            .map_or(0, |sender| sender.receiver_count())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<BroadcastMessage>>> {
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Recovered from poisoned broadcast registry lock");
                poisoned.into_inner()
            }
        }
    }
}

// == Subscription ==
/// One client's view of a channel.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    receiver: Option<broadcast::Receiver<BroadcastMessage>>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next message. Returns None once closed.
    ///
    /// A subscriber that falls too far behind skips the messages it missed.
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "Subscriber lagged, messages dropped");
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Stops delivery immediately. Safe to call more than once.
    pub fn close(&mut self) {
        if self.receiver.take().is_some() {
            debug!(channel = %self.channel, "Subscription closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.receiver.is_none()
    }
}

// == Listener ==
/// Handle to a handler-driven subscription.
#[derive(Debug)]
pub struct Listener {
    handle: JoinHandle<()>,
}

impl Listener {
    /// Stops the handler. Safe to call more than once.
    pub fn close(&self) {
        self.handle.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_finished()
    }
}
