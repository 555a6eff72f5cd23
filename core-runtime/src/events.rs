//! # Event Bus System
//!
//! Provides an event-driven architecture for the sync engine using
//! `tokio::sync::broadcast`. This module enables decoupled communication
//! between core modules and the host CLI through typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │ Auth Module ├──────────────>│           │
//! └─────────────┘               │ EventBus  │     subscribe    ┌────────────┐
//!                               │ (broadcast├─────────────────>│ CLI output │
//! ┌─────────────┐     emit      │  channel) │                  └────────────┘
//! │ Sync Engine ├──────────────>│           │
//! └─────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ### Publishing Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, SyncEvent};
//!
//! # let event_bus = EventBus::new(100);
//! let event = CoreEvent::Sync(SyncEvent::DocumentStarted {
//!     reference: "ABC123".to_string(),
//! });
//!
//! event_bus.emit(event).ok();
//! ```
//!
//! ### Subscribing to Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent};
//! use tokio::sync::broadcast::error::RecvError;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! tokio::spawn(async move {
//!     loop {
//!         match stream.recv().await {
//!             Ok(event) => println!("Received: {:?}", event),
//!             Err(RecvError::Lagged(n)) => {
//!                 eprintln!("Missed {} events", n);
//!             }
//!             Err(RecvError::Closed) => break,
//!         }
//!     }
//! });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types
//! of errors:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n`
//!   events. This is non-fatal; the subscriber can continue receiving.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates
//!   shutdown.
//!
//! Subscribers should handle `Lagged` gracefully and treat `Closed` as a
//! signal to exit. Emitting with no subscribers is not an error for the
//! engine; callers use `.ok()` on `emit` when delivery is best-effort.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// This value balances memory usage with the ability to handle bursts of
/// events. Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
///
/// This is the main event type published and received through the event bus.
/// It wraps domain-specific event types for different modules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Authentication-related events
    Auth(AuthEvent),
    /// Sync-related events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::DocumentFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::RevisionFinished { .. }) => EventSeverity::Debug,
            CoreEvent::Sync(SyncEvent::DocumentPhase { .. }) => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events related to credential acquisition and refresh.
///
/// Payloads never carry token material; only expiry timestamps and display
/// strings are broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Interactive authorization flow started; the user should open the URL.
    FlowStarted {
        /// Authorization URL to open in a browser.
        auth_url: String,
    },
    /// A credential session became available (cache, refresh, or flow).
    SessionAcquired {
        /// Timestamp when the session expires (Unix epoch seconds).
        expires_at: i64,
        /// Where the session came from ("cache", "refresh", "interactive").
        source: String,
    },
    /// Access token is being refreshed.
    TokenRefreshing,
    /// Token refresh completed successfully.
    TokenRefreshed {
        /// Timestamp when the new token expires (Unix epoch seconds).
        expires_at: i64,
    },
    /// Authentication error occurred.
    AuthError {
        /// Human-readable error message.
        message: String,
        /// Whether the error is recoverable (e.g., retry possible).
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::FlowStarted { .. } => "Authorization flow started",
            AuthEvent::SessionAcquired { .. } => "Credential session acquired",
            AuthEvent::TokenRefreshing => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to one revision synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A run over the configured documents began.
    RunStarted {
        /// Unique identifier for this run.
        run_id: String,
        /// Number of documents in the run.
        document_count: usize,
    },
    /// Processing of one document began.
    DocumentStarted {
        /// The raw reference as configured (identifier or URL).
        reference: String,
    },
    /// A document moved to a new phase of its state machine.
    DocumentPhase {
        /// Resolved document identifier.
        document_id: String,
        /// Phase name (e.g., "listing", "downloading").
        phase: String,
    },
    /// Revisions were listed and filtered for a document.
    RevisionsSelected {
        /// Resolved document identifier.
        document_id: String,
        /// Number of revisions the API reported.
        listed: usize,
        /// Number retained after granularity filtering.
        retained: usize,
    },
    /// One revision download reached a terminal outcome.
    RevisionFinished {
        /// Resolved document identifier.
        document_id: String,
        /// Revision identifier.
        revision_id: String,
        /// Terminal outcome ("success", "skipped", "failed").
        outcome: String,
    },
    /// A document finished with every retained revision terminal.
    DocumentCompleted {
        /// Resolved document identifier.
        document_id: String,
        /// Revisions downloaded successfully.
        downloaded: usize,
        /// Revisions skipped (no plain-text export).
        skipped: usize,
        /// Revisions that failed past the retry budget.
        failed: usize,
    },
    /// A document failed before its downloads could complete.
    DocumentFailed {
        /// The raw reference as configured.
        reference: String,
        /// Human-readable failure reason.
        reason: String,
    },
    /// The whole run finished; per-document results are in the summary.
    RunCompleted {
        /// The run identifier.
        run_id: String,
        /// Documents that reached Done.
        documents_done: usize,
        /// Documents that failed.
        documents_failed: usize,
        /// Duration of the run in seconds.
        duration_secs: u64,
    },
    /// The run was cancelled; in-flight downloads were allowed to finish.
    RunCancelled {
        /// The run identifier.
        run_id: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::RunStarted { .. } => "Sync run started",
            SyncEvent::DocumentStarted { .. } => "Document sync started",
            SyncEvent::DocumentPhase { .. } => "Document phase changed",
            SyncEvent::RevisionsSelected { .. } => "Revisions selected",
            SyncEvent::RevisionFinished { .. } => "Revision finished",
            SyncEvent::DocumentCompleted { .. } => "Document completed",
            SyncEvent::DocumentFailed { .. } => "Document failed",
            SyncEvent::RunCompleted { .. } => "Sync run completed",
            SyncEvent::RunCancelled { .. } => "Sync run cancelled",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, CoreEvent, SyncEvent};
///
/// # #[tokio::main]
/// # async fn main() {
/// let event_bus = EventBus::new(100);
///
/// // Subscribe to events
/// let mut subscriber = event_bus.subscribe();
///
/// // Emit an event
/// let event = CoreEvent::Sync(SyncEvent::DocumentStarted {
///     reference: "ABC123".to_string(),
/// });
/// event_bus.emit(event).ok();
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers; emitters for
    /// which delivery is best-effort call `.ok()` on the result.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all
    /// future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
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
// Tests
// ============================================================================
