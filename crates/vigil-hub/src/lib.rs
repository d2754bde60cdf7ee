//! # vigil-hub
//!
//! In-memory fan-out hub multiplexing one live subprocess stream to many
//! concurrent HTTP subscribers.
//!
//! Topics are keyed by (session id, [`Channel`]): the raw NDJSON stream and
//! the formatted display stream are separate topics of the same session.
//! Each topic keeps a bounded replay buffer so a subscriber arriving within
//! a few seconds of session start still sees the opening lines.
//!
//! Delivery rules (spec'd, not tunable):
//! - lines arrive in publication order, shared as `Arc<String>`
//! - `publish` never blocks: a full subscriber channel drops that
//!   subscriber's line (counted), everyone else still receives it
//! - a subscriber that missed lines before the replay window gets one
//!   synthetic notice line first
//! - closing a session's topics closes every subscriber channel
//!
//! There is no back-pressure into the publisher — an unresponsive browser
//! must never stall remediation.

#![deny(unsafe_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Lines retained per topic for late subscribers.
pub const REPLAY_LINES: usize = 256;

/// Per-subscriber channel capacity. Must exceed [`REPLAY_LINES`] so the
/// replay always fits into a fresh channel.
pub const SUBSCRIBER_CAPACITY: usize = 512;

/// Which stream of a session a topic carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Verbatim NDJSON lines from the subprocess.
    Raw,
    /// Compact formatted fragments for the dashboard.
    Display,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Arc<String>>,
}

#[derive(Default)]
struct Topic {
    buffer: VecDeque<Arc<String>>,
    subscribers: Vec<Subscriber>,
    published: u64,
    dropped: u64,
}

type TopicMap = HashMap<(i64, Channel), Topic>;

/// RAII unsubscribe guard. Dropping it removes the subscriber from the topic.
pub struct SubscriptionGuard {
    topics: Arc<Mutex<TopicMap>>,
    key: (i64, Channel),
    subscriber_id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let mut topics = self.topics.lock();
        if let Some(topic) = topics.get_mut(&self.key) {
            topic.subscribers.retain(|s| s.id != self.subscriber_id);
        }
    }
}

/// The fan-out hub. One per process, shared via `Arc`.
pub struct SessionHub {
    topics: Arc<Mutex<TopicMap>>,
    next_subscriber_id: Mutex<u64>,
}

impl SessionHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber_id: Mutex::new(0),
        }
    }

    /// Subscribe to a session's stream.
    ///
    /// The receiver first yields the topic's replay buffer (preceded by a
    /// notice line when earlier lines have already scrolled out), then live
    /// lines in publication order.
    pub fn subscribe(
        &self,
        session_id: i64,
        channel: Channel,
    ) -> (mpsc::Receiver<Arc<String>>, SubscriptionGuard) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let subscriber_id = {
            let mut next = self.next_subscriber_id.lock();
            *next += 1;
            *next
        };

        let key = (session_id, channel);
        let mut topics = self.topics.lock();
        let topic = topics.entry(key).or_default();

        let missed = topic.published.saturating_sub(topic.buffer.len() as u64);
        if missed > 0 {
            let notice = Arc::new(format!("[vigil] {missed} earlier lines not shown"));
            let _ = tx.try_send(notice);
        }
        for line in &topic.buffer {
            // Capacity exceeds the buffer bound, so this cannot fail on a
            // fresh channel.
            let _ = tx.try_send(Arc::clone(line));
        }
        topic.subscribers.push(Subscriber {
            id: subscriber_id,
            tx,
        });

        debug!(session_id, ?channel, subscriber_id, "hub subscribe");
        (
            rx,
            SubscriptionGuard {
                topics: Arc::clone(&self.topics),
                key,
                subscriber_id,
            },
        )
    }

    /// Publish one line to a session's topic. Never blocks.
    pub fn publish(&self, session_id: i64, channel: Channel, line: &str) {
        let shared = Arc::new(line.to_string());
        let mut topics = self.topics.lock();
        let topic = topics.entry((session_id, channel)).or_default();

        topic.published += 1;
        if topic.buffer.len() == REPLAY_LINES {
            let _ = topic.buffer.pop_front();
        }
        topic.buffer.push_back(Arc::clone(&shared));

        for subscriber in &topic.subscribers {
            if subscriber.tx.try_send(Arc::clone(&shared)).is_err() {
                topic.dropped += 1;
                counter!("hub_dropped_lines_total").increment(1);
            }
        }
    }

    /// Close both topics of a session: every subscriber channel ends and the
    /// replay buffers are released.
    pub fn close(&self, session_id: i64) {
        let mut topics = self.topics.lock();
        let removed_raw = topics.remove(&(session_id, Channel::Raw));
        let removed_display = topics.remove(&(session_id, Channel::Display));
        let dropped: u64 = [&removed_raw, &removed_display]
            .into_iter()
            .flatten()
            .map(|t| t.dropped)
            .sum();
        debug!(session_id, dropped, "hub topics closed");
        // Dropping the Topic drops its senders; receivers observe `None`.
    }

    /// Lines dropped for slow subscribers on one topic (observability).
    #[must_use]
    pub fn dropped(&self, session_id: i64, channel: Channel) -> u64 {
        self.topics
            .lock()
            .get(&(session_id, channel))
            .map_or(0, |t| t.dropped)
    }

    /// Number of live topics (both channels counted separately).
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
