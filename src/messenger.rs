//! Caller-facing messenger.
//!
//! [`PubSubMessenger`] turns publish/subscribe/unsubscribe intents into
//! provisioner calls plus listener binding on the backend. It holds no
//! mutable state: every call resolves its resources again, so concurrent
//! calls never contend on anything inside this crate.
//!
//! ## Listener binding
//!
//! `subscribe` registers exactly two handlers on the resolved subscription,
//! one per event, taken straight from the [`SubscriptionListener`]. Nothing
//! is wrapped, so `unsubscribe` with the same listener (or a clone) removes
//! exactly those two registrations. Binding is additive: subscribing the
//! same listener twice registers it twice.
//!
//! ## Asymmetry
//!
//! `subscribe` creates a missing subscription; `unsubscribe` never does. On
//! a subscription that was never created, `unsubscribe` still succeeds once
//! the topic resolves and leaves the backend untouched.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    // ---
    log_debug,
    Attributes,
    BackendPtr,
    DefaultCreator,
    MessageId,
    ResourceProvisioner,
    Result,
    SubscriptionCreator,
    SubscriptionListener,
    SubscriptionRef,
};

/// Publish/subscribe capability with existence-checked topics and lazily
/// provisioned subscriptions.
///
/// # Notes
///
/// This trait uses `async_trait`; consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Messenger: Send + Sync {
    // ---
    /// Publish `data` to an existing topic and return the backend message id.
    ///
    /// The payload is never buffered or retried here; retry policy belongs
    /// to the caller.
    ///
    /// # Errors
    ///
    /// [`MessengerError::TopicNotFound`](crate::MessengerError::TopicNotFound)
    /// when the topic is missing; backend failures otherwise.
    async fn publish(
        &self,
        topic_name: &str,
        data: Bytes,
        attributes: Option<Attributes>,
    ) -> Result<MessageId>;

    /// Resolve or create the subscription with the default creator and bind
    /// `listener` to it.
    async fn subscribe(
        &self,
        topic_name: &str,
        subscription_name: &str,
        listener: SubscriptionListener,
    ) -> Result<SubscriptionRef>;

    /// Like [`subscribe`](Self::subscribe), creating a missing subscription
    /// with `creator` instead of the default.
    async fn subscribe_with(
        &self,
        topic_name: &str,
        subscription_name: &str,
        listener: SubscriptionListener,
        creator: &dyn SubscriptionCreator,
    ) -> Result<SubscriptionRef>;

    /// Detach `listener` from the subscription.
    ///
    /// Idempotent: detaching a listener that is not attached is a no-op.
    ///
    /// # Errors
    ///
    /// Fails only when the topic cannot be resolved.
    async fn unsubscribe(
        &self,
        topic_name: &str,
        subscription_name: &str,
        listener: &SubscriptionListener,
    ) -> Result<SubscriptionRef>;
}

/// Shared messenger pointer.
pub type MessengerPtr = Arc<dyn Messenger>;

/// [`Messenger`] over an injected [`MessagingBackend`](crate::MessagingBackend).
///
/// Cheap to clone; clones share the backend and the default creator.
///
/// # Example
///
/// ```
/// use pubsub_messenger::{MemoryBackend, Messenger, MessengerError, PubSubMessenger};
///
/// # async fn example() -> pubsub_messenger::Result<()> {
/// let backend = MemoryBackend::new();
/// let messenger = PubSubMessenger::new(backend);
///
/// let err = messenger
///     .publish("orders", "payload".into(), None)
///     .await
///     .unwrap_err();
/// assert!(matches!(err, MessengerError::TopicNotFound { .. }));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PubSubMessenger {
    provisioner: ResourceProvisioner,
    creator: Arc<dyn SubscriptionCreator>,
}

impl PubSubMessenger {
    /// Messenger that creates missing subscriptions with default options.
    pub fn new(backend: BackendPtr) -> Self {
        Self::with_creator(backend, Arc::new(DefaultCreator::default()))
    }

    /// Messenger with a custom default creator.
    ///
    /// See [`MessengerBuilder`](crate::MessengerBuilder) for validated
    /// configuration.
    pub fn with_creator(backend: BackendPtr, creator: Arc<dyn SubscriptionCreator>) -> Self {
        Self {
            provisioner: ResourceProvisioner::new(backend),
            creator,
        }
    }

    /// The provisioner used to resolve resources.
    pub fn provisioner(&self) -> &ResourceProvisioner {
        &self.provisioner
    }

    /// Messenger bound to `topic_name`.
    pub fn using(&self, topic_name: impl Into<String>) -> TopicMessenger {
        TopicMessenger {
            topic_name: topic_name.into(),
            messenger: self.clone(),
        }
    }

    fn bind(&self, subscription: &SubscriptionRef, listener: &SubscriptionListener) {
        // ---
        let backend = self.provisioner.backend();
        backend.on(subscription, listener.message_handler());
        backend.on(subscription, listener.error_handler());

        log_debug!(
            "bound listener to subscription '{}' on '{}'",
            subscription.name(),
            subscription.topic().name()
        );
    }
}

#[async_trait::async_trait]
impl Messenger for PubSubMessenger {
    // ---
    async fn publish(
        &self,
        topic_name: &str,
        data: Bytes,
        attributes: Option<Attributes>,
    ) -> Result<MessageId> {
        // ---
        let topic = self.provisioner.resolve_topic(topic_name).await?;
        let id = self
            .provisioner
            .backend()
            .publish(&topic, data, attributes.unwrap_or_default())
            .await?;

        log_debug!("published message {id} to '{topic_name}'");
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic_name: &str,
        subscription_name: &str,
        listener: SubscriptionListener,
    ) -> Result<SubscriptionRef> {
        self.subscribe_with(topic_name, subscription_name, listener, self.creator.as_ref())
            .await
    }

    async fn subscribe_with(
        &self,
        topic_name: &str,
        subscription_name: &str,
        listener: SubscriptionListener,
        creator: &dyn SubscriptionCreator,
    ) -> Result<SubscriptionRef> {
        // ---
        let subscription = self
            .provisioner
            .resolve_or_create_subscription(topic_name, subscription_name, creator)
            .await?;

        self.bind(&subscription, &listener);
        Ok(subscription)
    }

    async fn unsubscribe(
        &self,
        topic_name: &str,
        subscription_name: &str,
        listener: &SubscriptionListener,
    ) -> Result<SubscriptionRef> {
        // ---
        let subscription = self
            .provisioner
            .resolve_subscription(topic_name, subscription_name)
            .await?;

        let backend = self.provisioner.backend();
        backend.remove_listener(&subscription, &listener.message_handler());
        backend.remove_listener(&subscription, &listener.error_handler());

        log_debug!("unbound listener from subscription '{subscription_name}' on '{topic_name}'");
        Ok(subscription)
    }
}

/// A messenger bound to one topic, obtained from [`PubSubMessenger::using`].
#[derive(Clone)]
pub struct TopicMessenger {
    topic_name: String,
    messenger: PubSubMessenger,
}

impl TopicMessenger {
    /// The bound topic name.
    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    /// Publish to the bound topic.
    pub async fn publish(&self, data: Bytes, attributes: Option<Attributes>) -> Result<MessageId> {
        self.messenger
            .publish(&self.topic_name, data, attributes)
            .await
    }

    /// Subscribe to the bound topic with the default creator.
    pub async fn subscribe(
        &self,
        subscription_name: &str,
        listener: SubscriptionListener,
    ) -> Result<SubscriptionRef> {
        self.messenger
            .subscribe(&self.topic_name, subscription_name, listener)
            .await
    }

    /// Subscribe to the bound topic with a per-call creator.
    pub async fn subscribe_with(
        &self,
        subscription_name: &str,
        listener: SubscriptionListener,
        creator: &dyn SubscriptionCreator,
    ) -> Result<SubscriptionRef> {
        self.messenger
            .subscribe_with(&self.topic_name, subscription_name, listener, creator)
            .await
    }

    /// Detach `listener` from a subscription of the bound topic.
    pub async fn unsubscribe(
        &self,
        subscription_name: &str,
        listener: &SubscriptionListener,
    ) -> Result<SubscriptionRef> {
        self.messenger
            .unsubscribe(&self.topic_name, subscription_name, listener)
            .await
    }
}
