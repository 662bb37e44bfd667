//! In-process publish/subscribe transport with MQTT-style topic filters.
//!
//! Topics are `/`-separated. In a filter, `+` matches exactly one level and a
//! trailing `#` matches any number of remaining levels (including none).

pub mod handlers;
pub mod router;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::PublishError;

/// Topic for messages about one device: `<base>/<logical device id>`.
pub fn device_topic(base: &str, logical_device_id: &str) -> String {
    format!("{base}/{logical_device_id}")
}

/// Filter matching every device of one profile type: `<base>/#`.
pub fn class_topic(base: &str) -> String {
    format!("{base}/#")
}

/// Outbound transport used by every publisher.
pub trait MessageBus: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// A delivered message.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Arc<[u8]>,
}

/// Parsed subscription filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    levels: Vec<String>,
}

impl TopicFilter {
    pub fn new(filter: &str) -> Self {
        Self {
            levels: filter.split('/').map(str::to_string).collect(),
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        let mut topic_levels = topic.split('/');
        for (i, level) in self.levels.iter().enumerate() {
            if level == "#" && i + 1 == self.levels.len() {
                return true;
            }
            match topic_levels.next() {
                Some(t) if level == "+" || level == t => {}
                _ => return false,
            }
        }
        topic_levels.next().is_none()
    }
}

struct Subscription {
    filter: TopicFilter,
    tx: mpsc::UnboundedSender<BusMessage>,
}

/// Bus that delivers within the process over unbounded channels.
///
/// Every subscription gets its own channel, so a slow consumer never blocks
/// a publisher. Subscriptions whose receiver was dropped are pruned on the
/// next publish.
#[derive(Default)]
pub struct LocalBus {
    subscriptions: RwLock<Vec<Subscription>>,
    closed: AtomicBool,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a filter and returns the receiving end of its channel.
    pub fn subscribe(&self, filter: &str) -> mpsc::UnboundedReceiver<BusMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.write().push(Subscription {
            filter: TopicFilter::new(filter),
            tx,
        });
        rx
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Rejects every later publish.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::ChannelClosed {
                topic: topic.to_string(),
            });
        }

        let message = BusMessage {
            topic: topic.to_string(),
            payload: payload.into(),
        };
        let mut stale = false;
        {
            let subs = self.subscriptions.read();
            for sub in subs.iter().filter(|s| s.filter.matches(topic)) {
                stale |= sub.tx.send(message.clone()).is_err();
            }
        }
        if stale {
            self.subscriptions.write().retain(|s| !s.tx.is_closed());
        }
        trace!(topic, "published");
        Ok(())
    }
}
