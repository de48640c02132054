//! Domain layer public interface.
//!
//! This module defines the messaging-backend abstraction and the listener
//! types shared by the provisioner, the messenger, and every backend
//! implementation. Nothing in here refers to a concrete broker or client
//! library.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod backend;
mod listener;

// --- Backend domain re-exports ---

pub use backend::{
    //
    Attributes,
    BackendPtr,
    HandleId,
    Message,
    MessageId,
    MessagingBackend,
    SubscriptionRef,
    TopicRef,
};

// --- Listener domain re-exports ---

pub use listener::{
    //
    Delivery,
    ErrorCallback,
    EventHandler,
    MessageCallback,
    SubscriptionEvent,
    SubscriptionListener,
};
