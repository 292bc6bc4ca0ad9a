//! Typed event bus
//!
//! All components emit through the bus; callers subscribe to decouple from
//! internal timers and capability callbacks. Dispatch is synchronous and in
//! subscription order; a panicking subscriber is caught and logged so it can
//! never abort delivery to later subscribers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::error;

use crate::channels::ChannelPayload;
use crate::stats::StatsSnapshot;
use crate::Error;

/// Event delivered to subscribers
#[derive(Debug, Clone)]
pub enum Event {
    /// The signaling transport is connected and ready
    Initialized,
    /// The client was closed
    Closed,
    /// A typed error surfaced from any layer
    Error {
        /// Stream the error relates to, when session-scoped
        stream_id: Option<String>,
        /// The error; `error.code()` gives a stable string code
        error: Arc<Error>,
    },
    /// A publish session was requested
    PublishRequested {
        /// Stream identifier
        stream_id: String,
    },
    /// A play session was requested
    PlayRequested {
        /// Stream identifier
        stream_id: String,
    },
    /// Offer/answer exchange began for a session
    NegotiationStarted {
        /// Stream identifier
        stream_id: String,
    },
    /// A session reached the connected state
    SessionConnected {
        /// Stream identifier
        stream_id: String,
    },
    /// A session's ICE connectivity reported disconnected
    SessionDisconnected {
        /// Stream identifier
        stream_id: String,
    },
    /// A session began a reconnect cycle
    ReconnectAttempt {
        /// Stream identifier
        stream_id: String,
        /// 1-based attempt number within the current outage
        attempt: u32,
    },
    /// A session was closed and its capability released
    SessionClosed {
        /// Stream identifier
        stream_id: String,
    },
    /// A data channel opened for a session
    DataChannelOpened {
        /// Stream identifier
        stream_id: String,
    },
    /// A data channel closed for a session
    DataChannelClosed {
        /// Stream identifier
        stream_id: String,
    },
    /// A data-channel message arrived
    DataReceived {
        /// Stream identifier
        stream_id: String,
        /// Message payload, sanitized when configured
        payload: ChannelPayload,
    },
    /// A normalized statistics snapshot was produced
    Stats {
        /// Stream identifier
        stream_id: String,
        /// The snapshot
        snapshot: StatsSnapshot,
    },
    /// A server notification arrived (joinedTheRoom, publish_started, ...)
    ServerNotification {
        /// Notification definition string
        definition: String,
        /// Stream the notification relates to, when present
        stream_id: Option<String>,
        /// Remaining notification fields
        payload: Value,
    },
    /// Stream information response
    StreamInformation {
        /// Stream identifier
        stream_id: Option<String>,
        /// Response payload
        payload: Value,
    },
    /// Room information response
    RoomInformation {
        /// Room name
        room: Option<String>,
        /// Response payload
        payload: Value,
    },
    /// Track list response
    TrackList {
        /// Stream identifier
        stream_id: Option<String>,
        /// Track identifiers
        tracks: Vec<String>,
    },
    /// Broadcast object response
    BroadcastObject {
        /// Stream identifier
        stream_id: Option<String>,
        /// Response payload
        payload: Value,
    },
    /// Subtrack list response
    SubtrackList {
        /// Stream identifier
        stream_id: Option<String>,
        /// Response payload
        payload: Value,
    },
    /// Subtrack count response
    SubtracksCount {
        /// Stream identifier
        stream_id: Option<String>,
        /// Number of subtracks
        count: Option<u64>,
    },
    /// Subscriber count response
    SubscriberCount {
        /// Stream identifier
        stream_id: Option<String>,
        /// Number of subscribers
        count: Option<u64>,
    },
    /// Subscriber list response
    SubscriberList {
        /// Stream identifier
        stream_id: Option<String>,
        /// Response payload
        payload: Value,
    },
    /// Video track assignment list
    VideoTrackAssignments {
        /// Stream identifier
        stream_id: Option<String>,
        /// Assignment payload
        payload: Value,
    },
}

/// Coarse discriminant of [`Event`], used for filtered subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum EventKind {
    Initialized,
    Closed,
    Error,
    PublishRequested,
    PlayRequested,
    NegotiationStarted,
    SessionConnected,
    SessionDisconnected,
    ReconnectAttempt,
    SessionClosed,
    DataChannelOpened,
    DataChannelClosed,
    DataReceived,
    Stats,
    ServerNotification,
    StreamInformation,
    RoomInformation,
    TrackList,
    BroadcastObject,
    SubtrackList,
    SubtracksCount,
    SubscriberCount,
    SubscriberList,
    VideoTrackAssignments,
}

impl Event {
    /// The event's kind discriminant
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Initialized => EventKind::Initialized,
            Event::Closed => EventKind::Closed,
            Event::Error { .. } => EventKind::Error,
            Event::PublishRequested { .. } => EventKind::PublishRequested,
            Event::PlayRequested { .. } => EventKind::PlayRequested,
            Event::NegotiationStarted { .. } => EventKind::NegotiationStarted,
            Event::SessionConnected { .. } => EventKind::SessionConnected,
            Event::SessionDisconnected { .. } => EventKind::SessionDisconnected,
            Event::ReconnectAttempt { .. } => EventKind::ReconnectAttempt,
            Event::SessionClosed { .. } => EventKind::SessionClosed,
            Event::DataChannelOpened { .. } => EventKind::DataChannelOpened,
            Event::DataChannelClosed { .. } => EventKind::DataChannelClosed,
            Event::DataReceived { .. } => EventKind::DataReceived,
            Event::Stats { .. } => EventKind::Stats,
            Event::ServerNotification { .. } => EventKind::ServerNotification,
            Event::StreamInformation { .. } => EventKind::StreamInformation,
            Event::RoomInformation { .. } => EventKind::RoomInformation,
            Event::TrackList { .. } => EventKind::TrackList,
            Event::BroadcastObject { .. } => EventKind::BroadcastObject,
            Event::SubtrackList { .. } => EventKind::SubtrackList,
            Event::SubtracksCount { .. } => EventKind::SubtracksCount,
            Event::SubscriberCount { .. } => EventKind::SubscriberCount,
            Event::SubscriberList { .. } => EventKind::SubscriberList,
            Event::VideoTrackAssignments { .. } => EventKind::VideoTrackAssignments,
        }
    }
}

/// Handler invoked for each delivered event
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Identifies a subscription for removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: u64,
    filter: Option<EventKind>,
    once: bool,
    handler: EventHandler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// Publish/subscribe hub shared by all components
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(None, false, Arc::new(handler))
    }

    /// Subscribe to events of one kind
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(Some(kind), false, Arc::new(handler))
    }

    /// Subscribe to exactly one delivery of the given kind
    ///
    /// The subscription self-unsubscribes after one delivery, even when the
    /// event is emitted reentrantly from within another handler.
    pub fn once<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(Some(kind), true, Arc::new(handler))
    }

    fn add(&self, filter: Option<EventKind>, once: bool, handler: EventHandler) -> SubscriptionId {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscriptions.push(Subscription {
            id,
            filter,
            once,
            handler,
        });
        SubscriptionId(id)
    }

    /// Remove a subscription; a stale id is a no-op
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        inner.subscriptions.retain(|s| s.id != id.0);
    }

    /// Deliver an event to every matching subscriber in subscription order
    pub fn emit(&self, event: Event) {
        let kind = event.kind();

        // Collect matching handlers and drop `once` entries before invoking
        // anything, so reentrant emits cannot double-deliver.
        let handlers: Vec<EventHandler> = {
            let mut inner = self.inner.lock().expect("event bus lock poisoned");
            let matched: Vec<EventHandler> = inner
                .subscriptions
                .iter()
                .filter(|s| s.filter.is_none() || s.filter == Some(kind))
                .map(|s| Arc::clone(&s.handler))
                .collect();
            inner
                .subscriptions
                .retain(|s| !(s.once && (s.filter.is_none() || s.filter == Some(kind))));
            matched
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!("event subscriber panicked while handling {:?}", kind);
            }
        }
    }
}
