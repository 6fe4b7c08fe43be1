//! Dispatch progress events
//!
//! An in-process broadcast bus the UI layer subscribes to instead of
//! registering listeners with the dispatcher. Emitting never blocks: with no
//! subscribers an event is simply dropped, and a lagging subscriber loses
//! the oldest events first.
//!
//! # Example
//!
//! ```no_run
//! use libcrosspost::service::events::{Event, EventBus};
//! use libcrosspost::types::PlatformKind;
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::DispatchStarted {
//!     post_id: "abc123".to_string(),
//!     platforms: vec![PlatformKind::Facebook],
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{PlatformKind, PostStatus};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before old events are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    DispatchStarted {
        post_id: String,
        platforms: Vec<PlatformKind>,
    },

    /// Dropped during pre-flight; never submitted
    PlatformSkipped {
        post_id: String,
        platform: PlatformKind,
        reason: String,
    },

    PlatformSucceeded {
        post_id: String,
        platform: PlatformKind,
        external_id: String,
    },

    PlatformFailed {
        post_id: String,
        platform: PlatformKind,
        error: String,
    },

    DispatchCompleted {
        post_id: String,
        status: PostStatus,
        succeeded: usize,
        failed: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(Event::DispatchStarted {
            post_id: "p".to_string(),
            platforms: vec![],
        });
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_events() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = Event::PlatformSucceeded {
            post_id: "p".to_string(),
            platform: PlatformKind::Twitter,
            external_id: "twitter_1".to_string(),
        };
        bus.emit(event.clone());

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = Event::PlatformSkipped {
            post_id: "p".to_string(),
            platform: PlatformKind::Instagram,
            reason: "not connected".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "platform_skipped");
        assert_eq!(json["platform"], "instagram");
    }
}
