//! Event system for publish progress
//!
//! Jobs report their progress through an in-process broadcast channel so the
//! CLI (or any other front end) can follow a request without polling the
//! database.
//!
//! # Non-Blocking Behavior
//!
//! If no subscribers exist, events are dropped immediately. Subscribers can
//! lag without blocking jobs; a lagging receiver loses the oldest events.
//!
//! # Example
//!
//! ```no_run
//! use libpolycast::service::events::{Event, EventBus};
//! use libpolycast::types::{Platform, PostStatus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::StatusChanged {
//!     post_id: "abc123".to_string(),
//!     platform: Platform::X,
//!     status: PostStatus::Processing,
//!     detail: None,
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Platform, PostStatus};

pub type EventReceiver = broadcast::Receiver<Event>;

/// Broadcast channel shared by every job
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before lagging receivers
    /// start losing events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers. Never blocks.
    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Progress of a single (post, platform) job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was handed to the queue
    JobQueued { post_id: String, platform: Platform },

    /// The post record moved to a new status, or a step inside the job
    /// completed without changing it
    StatusChanged {
        post_id: String,
        platform: Platform,
        status: PostStatus,
        detail: Option<String>,
    },

    /// The job is done; `status` is terminal unless the record could not be
    /// updated
    JobFinished {
        post_id: String,
        platform: Platform,
        status: PostStatus,
        platform_post_id: Option<String>,
        share_url: Option<String>,
        error: Option<String>,
    },
}

impl Event {
    pub fn post_id(&self) -> &str {
        match self {
            Event::JobQueued { post_id, .. }
            | Event::StatusChanged { post_id, .. }
            | Event::JobFinished { post_id, .. } => post_id,
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            Event::JobQueued { platform, .. }
            | Event::StatusChanged { platform, .. }
            | Event::JobFinished { platform, .. } => *platform,
        }
    }
}
