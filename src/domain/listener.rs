// src/domain/listener.rs

//! Listener callbacks and event handlers.
//!
//! A [`SubscriptionListener`] is the caller-supplied pair of callbacks. The
//! messenger splits it into two [`EventHandler`]s, one per subscription
//! event, and hands them to the backend unchanged. Removal later matches on
//! the callback allocation, so the same listener value (or a clone of it)
//! must be passed to `unsubscribe`.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    // ---
    BackendError,
    Message,
};

/// Callback invoked for each delivered message.
pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Callback invoked for delivery or stream errors.
pub type ErrorCallback = Arc<dyn Fn(BackendError) + Send + Sync>;

/// Subscription event kinds a handler can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionEvent {
    /// A message was delivered.
    Message,
    /// The delivery stream reported an error.
    Error,
}

/// A callback bound to one subscription event.
#[derive(Clone)]
pub enum EventHandler {
    /// Handler for [`SubscriptionEvent::Message`].
    Message(MessageCallback),
    /// Handler for [`SubscriptionEvent::Error`].
    Error(ErrorCallback),
}

impl EventHandler {
    /// Event this handler is bound to.
    pub fn event(&self) -> SubscriptionEvent {
        match self {
            EventHandler::Message(_) => SubscriptionEvent::Message,
            EventHandler::Error(_) => SubscriptionEvent::Error,
        }
    }

    /// True when both handlers are for the same event and wrap the same
    /// callback allocation.
    pub fn same_callback(&self, other: &EventHandler) -> bool {
        // ---
        match (self, other) {
            (EventHandler::Message(a), EventHandler::Message(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (EventHandler::Error(a), EventHandler::Error(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        let ptr = match self {
            EventHandler::Message(cb) => Arc::as_ptr(cb) as *const (),
            EventHandler::Error(cb) => Arc::as_ptr(cb) as *const (),
        };
        f.debug_struct("EventHandler")
            .field("event", &self.event())
            .field("callback", &ptr)
            .finish()
    }
}

/// Caller-supplied callbacks for a subscription.
///
/// Cloning is cheap and preserves identity: a clone unsubscribes the
/// registrations made with the original.
///
/// # Example
///
/// ```
/// use pubsub_messenger::SubscriptionListener;
///
/// let listener = SubscriptionListener::new(
///     |msg| println!("received {} bytes", msg.data.len()),
///     |err| eprintln!("subscription error: {err}"),
/// );
/// assert!(listener.same_as(&listener.clone()));
/// ```
#[derive(Clone)]
pub struct SubscriptionListener {
    on_received: MessageCallback,
    on_error: ErrorCallback,
}

impl SubscriptionListener {
    /// Build a listener from two closures.
    pub fn new<R, E>(on_received: R, on_error: E) -> Self
    where
        R: Fn(Message) + Send + Sync + 'static,
        E: Fn(BackendError) + Send + Sync + 'static,
    {
        Self {
            on_received: Arc::new(on_received),
            on_error: Arc::new(on_error),
        }
    }

    /// Build a listener from callbacks that are already shared.
    pub fn from_callbacks(on_received: MessageCallback, on_error: ErrorCallback) -> Self {
        Self {
            on_received,
            on_error,
        }
    }

    /// Build a listener that forwards every delivery into a channel.
    ///
    /// Handy for async consumers: the receiver yields deliveries in the
    /// order the backend dispatched them. Deliveries sent after the receiver
    /// is dropped are discarded.
    pub fn inbox() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        // ---
        let (tx, rx) = mpsc::unbounded_channel();
        let err_tx = tx.clone();

        let listener = Self::new(
            move |msg| {
                let _ = tx.send(Delivery::Message(msg));
            },
            move |err| {
                let _ = err_tx.send(Delivery::Error(err));
            },
        );

        (listener, rx)
    }

    /// Handler for the message event.
    pub fn message_handler(&self) -> EventHandler {
        EventHandler::Message(self.on_received.clone())
    }

    /// Handler for the error event.
    pub fn error_handler(&self) -> EventHandler {
        EventHandler::Error(self.on_error.clone())
    }

    /// Invoke the message callback directly.
    pub fn on_received(&self, message: Message) {
        (self.on_received)(message)
    }

    /// Invoke the error callback directly.
    pub fn on_error(&self, err: BackendError) {
        (self.on_error)(err)
    }

    /// True when both listeners share the same callback allocations.
    pub fn same_as(&self, other: &SubscriptionListener) -> bool {
        self.message_handler().same_callback(&other.message_handler())
            && self.error_handler().same_callback(&other.error_handler())
    }
}

impl fmt::Debug for SubscriptionListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionListener")
            .field("on_received", &self.message_handler())
            .field("on_error", &self.error_handler())
            .finish()
    }
}

/// A delivery forwarded by an [`inbox`](SubscriptionListener::inbox) listener.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A message arrived.
    Message(Message),
    /// The subscription reported an error.
    Error(BackendError),
}
