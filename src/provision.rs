//! Resource resolution and lazy subscription provisioning.
//!
//! [`ResourceProvisioner`] turns names into live handles. Topics are only
//! ever looked up; a missing topic is an operator error. Subscriptions are
//! looked up and, when absent, created once through a pluggable
//! [`SubscriptionCreator`].
//!
//! ## Races
//!
//! The probe-then-create sequence is not atomic. Another process may create
//! the same subscription between our probe and our create call. The backend
//! then answers the create with `AlreadyExists`, which is treated as success
//! and the lookup handle is returned. No locking is involved.
//!
//! ## No caching
//!
//! Every call probes the backend again. Resources deleted out of band are
//! noticed on the next call, at the cost of one extra round trip.

use serde_json::Value;

use crate::{
    // ---
    log_debug,
    log_info,
    BackendError,
    BackendPtr,
    MessagingBackend,
    MessengerError,
    Result,
    SubscriptionOptions,
    SubscriptionRef,
    TopicRef,
};

/// Normalise a raw existence-probe response into a boolean.
///
/// Only an array whose first element is truthy counts as "exists". Null, an
/// empty array, objects, and bare scalars all count as "does not exist".
/// This never fails; an unexpected shape is logged at debug level so a
/// misbehaving backend shows up as a false negative in the logs rather than
/// silently.
///
/// # Example
///
/// ```
/// use pubsub_messenger::is_existing;
/// use serde_json::json;
///
/// assert!(is_existing(&json!([true])));
/// assert!(!is_existing(&json!([false])));
/// assert!(!is_existing(&json!(null)));
/// ```
pub fn is_existing(response: &Value) -> bool {
    // ---
    match response {
        Value::Array(items) => items.first().is_some_and(is_truthy),
        Value::Null => false,
        _other => {
            log_debug!("unrecognised existence response shape: {_other}");
            false
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    // ---
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Strategy for creating a missing subscription.
///
/// Implement this to provision subscriptions with filters, deadlines, or
/// dead-letter routing without touching the resolution protocol. The topic
/// passed in is guaranteed to have existed when it was resolved.
///
/// Returning `BackendError::AlreadyExists` is fine: the provisioner treats
/// it as a lost creation race and uses the existing subscription.
#[async_trait::async_trait]
pub trait SubscriptionCreator: Send + Sync {
    /// Create `subscription_name` on `topic`.
    async fn create(
        &self,
        backend: &dyn MessagingBackend,
        topic: &TopicRef,
        subscription_name: &str,
    ) -> std::result::Result<SubscriptionRef, BackendError>;
}

/// Creates subscriptions with a fixed set of [`SubscriptionOptions`].
///
/// `DefaultCreator::default()` uses `SubscriptionOptions::default()`.
#[derive(Debug, Clone, Default)]
pub struct DefaultCreator {
    options: SubscriptionOptions,
}

impl DefaultCreator {
    /// Creator that passes `options` to every create call.
    ///
    /// # Errors
    ///
    /// Returns [`MessengerError::InvalidConfig`] when `options` fail
    /// [`SubscriptionOptions::validate`].
    pub fn new(options: SubscriptionOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Options passed to the backend.
    pub fn options(&self) -> &SubscriptionOptions {
        &self.options
    }
}

#[async_trait::async_trait]
impl SubscriptionCreator for DefaultCreator {
    async fn create(
        &self,
        backend: &dyn MessagingBackend,
        topic: &TopicRef,
        subscription_name: &str,
    ) -> std::result::Result<SubscriptionRef, BackendError> {
        backend
            .create_subscription(topic, subscription_name, &self.options)
            .await
    }
}

/// Resolves topic and subscription names into live handles.
#[derive(Clone)]
pub struct ResourceProvisioner {
    backend: BackendPtr,
}

impl ResourceProvisioner {
    /// Create a provisioner over `backend`.
    pub fn new(backend: BackendPtr) -> Self {
        Self { backend }
    }

    /// The backend this provisioner talks to.
    pub fn backend(&self) -> &BackendPtr {
        &self.backend
    }

    /// Resolve `topic_name` to a handle for an existing topic.
    ///
    /// # Errors
    ///
    /// Returns [`MessengerError::TopicNotFound`] when the backend reports the
    /// topic as absent, and [`MessengerError::Backend`] when the probe
    /// itself fails.
    pub async fn resolve_topic(&self, topic_name: &str) -> Result<TopicRef> {
        // ---
        let topic = self.backend.topic(topic_name);
        let response = self.backend.topic_exists(&topic).await?;

        if is_existing(&response) {
            log_debug!("topic '{topic_name}' exists (handle {})", topic.id());
            Ok(topic)
        } else {
            log_debug!("topic '{topic_name}' does not exist");
            Err(MessengerError::TopicNotFound {
                topic: topic_name.to_string(),
            })
        }
    }

    /// Resolve a subscription, creating it with `creator` when absent.
    ///
    /// The handle returned by the creator is used as-is; it is not probed
    /// again.
    ///
    /// # Errors
    ///
    /// - [`MessengerError::TopicNotFound`] when the topic is absent.
    /// - [`MessengerError::Backend`] when a probe fails, or when creation
    ///   fails at the transport level (network, auth, quota).
    /// - [`MessengerError::SubscriptionCreation`] when the backend rejects
    ///   the creation itself for any other reason than the subscription
    ///   already existing.
    pub async fn resolve_or_create_subscription(
        &self,
        topic_name: &str,
        subscription_name: &str,
        creator: &dyn SubscriptionCreator,
    ) -> Result<SubscriptionRef> {
        // ---
        let topic = self.resolve_topic(topic_name).await?;
        let subscription = self.backend.subscription(&topic, subscription_name);
        let response = self.backend.subscription_exists(&subscription).await?;

        if is_existing(&response) {
            log_debug!("subscription '{subscription_name}' on '{topic_name}' exists");
            return Ok(subscription);
        }

        log_debug!("subscription '{subscription_name}' on '{topic_name}' missing, creating");

        match creator
            .create(self.backend.as_ref(), &topic, subscription_name)
            .await
        {
            Ok(created) => {
                log_info!("created subscription '{subscription_name}' on '{topic_name}'");
                Ok(created)
            }
            Err(err) if err.is_already_exists() => {
                log_info!(
                    "subscription '{}' on '{}' was created concurrently: {}",
                    subscription_name,
                    topic_name,
                    err
                );
                Ok(subscription)
            }
            Err(err) if err.is_transport_level() => Err(MessengerError::Backend(err)),
            Err(source) => Err(MessengerError::SubscriptionCreation {
                topic: topic_name.to_string(),
                subscription: subscription_name.to_string(),
                source,
            }),
        }
    }

    /// Resolve the topic and return a subscription handle without probing
    /// or creating the subscription.
    ///
    /// # Errors
    ///
    /// Fails exactly like [`resolve_topic`](Self::resolve_topic).
    pub async fn resolve_subscription(
        &self,
        topic_name: &str,
        subscription_name: &str,
    ) -> Result<SubscriptionRef> {
        // ---
        let topic = self.resolve_topic(topic_name).await?;
        Ok(self.backend.subscription(&topic, subscription_name))
    }
}
