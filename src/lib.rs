//! Existence-checked publish/subscribe with lazy subscription provisioning.
//!
//! This library sits between application code and a managed pub/sub
//! backend. It guarantees that publish and subscribe calls run against
//! resources that exist: subscriptions are created on first use, topics are
//! never created and a missing topic is reported as
//! [`MessengerError::TopicNotFound`].
//!
//! The backend is an injected capability ([`MessagingBackend`]); the crate
//! ships an in-memory reference implementation ([`MemoryBackend`]).
//!

// Import all sub modules once...
mod backend;
mod domain;
mod macros;
mod messenger;
mod messenger_builder;
mod provision;
mod subscription_options;

mod error;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use messenger::{Messenger, MessengerPtr, PubSubMessenger, TopicMessenger};
pub use messenger_builder::MessengerBuilder;
pub use provision::{is_existing, DefaultCreator, ResourceProvisioner, SubscriptionCreator};

pub use subscription_options::{
    //
    DeadLetterPolicy,
    SubscriptionOptions,
    MAX_ACK_DEADLINE,
    MAX_MESSAGE_RETENTION,
    MIN_ACK_DEADLINE,
    MIN_MESSAGE_RETENTION,
};

pub use error::{BackendError, BackendResult, MessengerError, Result};

pub use backend::{BackendOp, MemoryBackend};

// --- public re-exports
pub use domain::{
    //
    Attributes,
    BackendPtr,
    Delivery,
    ErrorCallback,
    EventHandler,
    HandleId,
    Message,
    MessageCallback,
    MessageId,
    MessagingBackend,
    SubscriptionEvent,
    SubscriptionListener,
    SubscriptionRef,
    TopicRef,
};
