//! # Event Bus System
//!
//! Typed broadcast events for the contact sync core, built on
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: `CoreEvent` wraps per-domain enums (sync, identity, enrichment)
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with optional filtering
//!
//! Emitting never blocks and never fails the caller's operation: with no
//! subscribers the event is simply dropped.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Started {
//!     sync_state_id: "state-1".to_string(),
//!     log_id: "log-1".to_string(),
//!     source: "gcontacts".to_string(),
//!     account_id: None,
//! }))
//! .ok();
//!
//! assert!(matches!(rx.recv().await, Ok(CoreEvent::Sync(_))));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep reading.
//! - **`RecvError::Closed`**: all senders were dropped, which means shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

pub use crate::config::DEFAULT_EVENT_BUFFER_SIZE;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Sync(SyncEvent),
    Identity(IdentityEvent),
    Enrichment(EnrichmentEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Identity(e) => e.description(),
            CoreEvent::Enrichment(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Identity(IdentityEvent::Ambiguous { .. }) => EventSeverity::Warning,
            CoreEvent::Enrichment(EnrichmentEvent::Applied { conflicts, .. }) if *conflicts > 0 => {
                EventSeverity::Warning
            }
            _ => EventSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Lifecycle of one sync attempt for a source/account pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        sync_state_id: String,
        log_id: String,
        source: String,
        account_id: Option<String>,
    },
    Completed {
        sync_state_id: String,
        log_id: String,
        source: String,
        items_processed: u64,
        items_matched: u64,
        items_created: u64,
        /// Unix seconds of the next scheduled run.
        next_sync_at: i64,
    },
    Failed {
        sync_state_id: String,
        source: String,
        message: String,
        /// Consecutive failures including this one.
        error_count: u32,
        /// Unix seconds of the retry.
        retry_at: i64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }
}

// ============================================================================
// Identity Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum IdentityEvent {
    /// An identity was linked to a contact, automatically or by hand.
    Linked {
        identity_id: String,
        contact_id: String,
        match_type: String,
        confidence: f64,
    },
    Unlinked {
        identity_id: String,
    },
    /// Discovery found several contacts for one identifier and left it unmatched.
    Ambiguous {
        identity_id: String,
        source: String,
        candidates: u32,
    },
}

impl IdentityEvent {
    fn description(&self) -> &str {
        match self {
            IdentityEvent::Linked { .. } => "Identity linked to contact",
            IdentityEvent::Unlinked { .. } => "Identity unlinked",
            IdentityEvent::Ambiguous { .. } => "Identity needs manual review",
        }
    }
}

// ============================================================================
// Enrichment Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum EnrichmentEvent {
    Applied {
        contact_id: String,
        source: String,
        fields_filled: u32,
        methods_added: u32,
        conflicts: u32,
    },
    CandidateImported {
        external_contact_id: String,
        contact_id: String,
    },
    CandidateIgnored {
        external_contact_id: String,
    },
}

impl EnrichmentEvent {
    fn description(&self) -> &str {
        match self {
            EnrichmentEvent::Applied { .. } => "Contact enriched from external record",
            EnrichmentEvent::CandidateImported { .. } => "External contact imported",
            EnrichmentEvent::CandidateIgnored { .. } => "External contact ignored",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cheap to clone; clones share the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall more than `capacity` events behind receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
