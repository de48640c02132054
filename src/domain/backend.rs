// src/domain/backend.rs

//! Messaging backend abstractions.
//!
//! This module defines the capability the provisioning layer consumes: a
//! managed publish/subscribe service that can hand out resource handles,
//! answer existence probes, create subscriptions, publish, and bind event
//! handlers to a subscription's delivery stream.
//!
//! The backend owns its connection. Handles are cheap descriptors minted on
//! every call and carry no connection state of their own.
//!
//! Concrete implementations live under `src/backend/`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    // ---
    BackendResult,
    EventHandler,
    SubscriptionOptions,
};

/// String-keyed metadata attached to a published message.
pub type Attributes = HashMap<String, String>;

/// Identity of a single handle acquisition.
///
/// Two handles naming the same resource compare unequal when they were
/// obtained by different calls. This mirrors object identity on client
/// libraries that return a fresh handle object per lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(Uuid);

impl HandleId {
    /// Mint a new, unique handle identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a named topic on the backend.
///
/// A `TopicRef` returned by
/// [`ResourceProvisioner::resolve_topic`](crate::ResourceProvisioner::resolve_topic)
/// refers to a topic that existed at resolution time. Nothing is cached:
/// the next resolution probes again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicRef {
    name: Arc<str>,
    id: HandleId,
}

impl TopicRef {
    /// Create a handle for `name` with a fresh identity.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        // ---
        Self {
            name: name.into(),
            id: HandleId::generate(),
        }
    }

    /// Topic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of this handle.
    pub fn id(&self) -> HandleId {
        self.id
    }
}

/// Handle to a named subscription, always bound to exactly one topic.
///
/// Equality is identity: a handle returned by a create call differs from
/// the lookup handle that preceded it even though both name the same
/// subscription. Use [`SubscriptionRef::same_resource`] to compare names.
///
/// A handle is only a descriptor: it cannot close or detach anything by
/// itself. To detach listeners bound through it, either call
/// `unsubscribe` on the messenger with the same listener, or keep the
/// [`BackendPtr`] and call
/// [`remove_listener`](MessagingBackend::remove_listener) once per handler
/// (message and error).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionRef {
    topic: TopicRef,
    name: Arc<str>,
    id: HandleId,
}

impl SubscriptionRef {
    /// Create a handle for subscription `name` under `topic`.
    pub fn new(topic: TopicRef, name: impl Into<Arc<str>>) -> Self {
        // ---
        Self {
            topic,
            name: name.into(),
            id: HandleId::generate(),
        }
    }

    /// Subscription name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The topic this subscription is bound to.
    pub fn topic(&self) -> &TopicRef {
        &self.topic
    }

    /// Identity of this handle.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// True when both handles name the same subscription on the same topic.
    pub fn same_resource(&self, other: &SubscriptionRef) -> bool {
        self.name == other.name && self.topic.name == other.topic.name
    }
}

/// Backend-assigned identifier of a published message.
///
/// Serializes as the bare id string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message delivered to a subscription listener.
#[derive(Clone, Debug)]
pub struct Message {
    // ---
    /// Identifier assigned by the backend at publish time.
    pub id: MessageId,

    /// Opaque payload bytes, exactly as published.
    pub data: Bytes,

    /// Attributes supplied by the publisher.
    pub attributes: Attributes,

    /// When the backend accepted the message.
    pub publish_time: SystemTime,
}

/// Managed publish/subscribe backend.
///
/// Handle accessors (`topic`, `subscription`) are local and never touch the
/// network. Everything else is a round trip and may fail with a
/// [`BackendError`](crate::BackendError).
///
/// Existence probes return the backend's raw response. Callers normalise it
/// with [`is_existing`](crate::is_existing) rather than interpreting the
/// shape themselves.
///
/// Event registration follows emitter semantics: `on` appends a handler,
/// `remove_listener` drops one registration whose callback is the same
/// allocation as the given handler. Removing a handler that is not
/// registered is a no-op.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait MessagingBackend: Send + Sync {
    // ---
    /// Obtain a handle for the topic `name`.
    fn topic(&self, name: &str) -> TopicRef;

    /// Obtain a handle for subscription `name` under `topic`.
    fn subscription(&self, topic: &TopicRef, name: &str) -> SubscriptionRef;

    /// Probe whether the topic exists.
    async fn topic_exists(&self, topic: &TopicRef) -> BackendResult<serde_json::Value>;

    /// Probe whether the subscription exists.
    async fn subscription_exists(
        &self,
        subscription: &SubscriptionRef,
    ) -> BackendResult<serde_json::Value>;

    /// Create subscription `name` on `topic`.
    ///
    /// Must fail with `BackendError::AlreadyExists` when the subscription is
    /// already present.
    async fn create_subscription(
        &self,
        topic: &TopicRef,
        name: &str,
        options: &SubscriptionOptions,
    ) -> BackendResult<SubscriptionRef>;

    /// Publish `data` with `attributes` to `topic`.
    async fn publish(
        &self,
        topic: &TopicRef,
        data: Bytes,
        attributes: Attributes,
    ) -> BackendResult<MessageId>;

    /// Register `handler` on the subscription's delivery stream.
    fn on(&self, subscription: &SubscriptionRef, handler: EventHandler);

    /// Remove one registration of `handler` from the subscription.
    fn remove_listener(&self, subscription: &SubscriptionRef, handler: &EventHandler);
}

/// Shared backend pointer.
///
/// This is an `Arc<dyn MessagingBackend>`, which means:
/// - `.clone()` is cheap (only increments a reference count)
/// - Multiple clones share the same underlying connection
/// - Tests substitute a fake by implementing the same trait
pub type BackendPtr = Arc<dyn MessagingBackend>;
