//! In-memory messaging backend.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `MessagingBackend` trait. It is intended primarily for testing, local
//! execution, and as a reference for backend semantics.
//!
//! ## Reference Semantics
//!
//! - Topics exist only after [`MemoryBackend::create_topic`]; the backend
//!   never creates them implicitly.
//! - `create_subscription` fails with `NotFound` when the topic is missing
//!   and with `AlreadyExists` when the subscription is already present.
//! - A published message is fanned out to every subscription of the topic.
//!   Each subscription delivers it to every registered message handler.
//! - Messages published while a subscription has no message handler stay in
//!   its backlog until one is registered.
//! - Registrations are keyed by topic and subscription name, so every handle
//!   for the same subscription sees the same handlers.
//!
//! ## Dispatch
//!
//! Each subscription owns a dispatcher task, spawned when the subscription is
//! created. Handlers run on that task, one message at a time, in publish
//! order. A panicking handler is logged and does not stop the task. The task
//! exits when the subscription or topic is deleted, or when the backend is
//! dropped.
//!
//! ## Non-Goals
//!
//! Acknowledgement, redelivery, filters, retention, and dead-lettering are not
//! emulated. Subscription options are stored and can be inspected but do not
//! change delivery.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::Notify;

#[allow(unused_imports)]
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    Attributes,
    BackendError,
    BackendResult,
    EventHandler,
    Message,
    MessageCallback,
    MessageId,
    MessagingBackend,
    SubscriptionEvent,
    SubscriptionOptions,
    SubscriptionRef,
    TopicRef,
};

/// Backend operations that can be made to fail with
/// [`MemoryBackend::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    /// `topic_exists`
    TopicExists,
    /// `subscription_exists`
    SubscriptionExists,
    /// `create_subscription`
    CreateSubscription,
    /// `publish`
    Publish,
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct SubscriptionInner {
    backlog: VecDeque<Message>,
    handlers: Vec<EventHandler>,
    closed: bool,
}

struct SubscriptionState {
    // ---
    label: String,
    options: SubscriptionOptions,
    inner: Mutex<SubscriptionInner>,
    notify: Notify,
}

impl SubscriptionState {
    fn new(label: String, options: SubscriptionOptions) -> Arc<Self> {
        // ---
        Arc::new(Self {
            label,
            options,
            inner: Mutex::new(SubscriptionInner {
                backlog: VecDeque::new(),
                handlers: Vec::new(),
                closed: false,
            }),
            notify: Notify::new(),
        })
    }

    fn enqueue(&self, message: Message) {
        lock_ignore_poison(&self.inner).backlog.push_back(message);
        self.notify.notify_one();
    }

    fn close(&self) {
        lock_ignore_poison(&self.inner).closed = true;
        self.notify.notify_one();
    }

    /// Take the whole backlog together with the current message handlers.
    ///
    /// Returns `Ok(None)` when there is nothing to deliver yet and `Err(())`
    /// once the subscription is closed.
    fn next_batch(&self) -> Result<Option<(Vec<Message>, Vec<MessageCallback>)>, ()> {
        // ---
        let mut inner = lock_ignore_poison(&self.inner);
        if inner.closed {
            return Err(());
        }

        let callbacks: Vec<MessageCallback> = inner
            .handlers
            .iter()
            .filter_map(|h| match h {
                EventHandler::Message(cb) => Some(cb.clone()),
                EventHandler::Error(_) => None,
            })
            .collect();

        if callbacks.is_empty() || inner.backlog.is_empty() {
            return Ok(None);
        }

        Ok(Some((inner.backlog.drain(..).collect(), callbacks)))
    }
}

/// Delivery loop for one subscription.
async fn dispatch(state: Arc<SubscriptionState>) {
    // ---
    log_debug!("{}: dispatcher started", state.label);

    loop {
        match state.next_batch() {
            Ok(Some((messages, callbacks))) => {
                for message in messages {
                    log_debug!(
                        "{}: delivering message {} to {} handler(s)",
                        state.label,
                        message.id,
                        callbacks.len()
                    );
                    for cb in &callbacks {
                        let delivered = message.clone();
                        if panic::catch_unwind(AssertUnwindSafe(|| cb(delivered))).is_err() {
                            log_error!("{}: message handler panicked", state.label);
                        }
                    }
                }
            }
            Ok(None) => state.notify.notified().await,
            Err(()) => break,
        }
    }

    log_debug!("{}: dispatcher stopped", state.label);
}

#[derive(Default)]
struct TopicState {
    subscriptions: HashMap<String, Arc<SubscriptionState>>,
}

/// In-memory messaging backend.
///
/// Simulates a managed pub/sub service within the process. Topics are
/// administered explicitly; subscriptions are created through the
/// `MessagingBackend` trait or administratively.
///
/// # Example
///
/// ```
/// # use pubsub_messenger::{MemoryBackend, Messenger, PubSubMessenger, SubscriptionListener};
/// # async fn example() -> pubsub_messenger::Result<()> {
/// let backend = MemoryBackend::new();
/// backend.create_topic("orders")?;
///
/// let messenger = PubSubMessenger::new(backend.clone());
/// let (listener, mut inbox) = SubscriptionListener::inbox();
/// messenger.subscribe("orders", "billing", listener).await?;
/// messenger.publish("orders", "hello".into(), None).await?;
///
/// let delivery = inbox.recv().await;
/// assert!(delivery.is_some());
/// # Ok(())
/// # }
/// ```
pub struct MemoryBackend {
    // ---
    topics: Mutex<HashMap<String, TopicState>>,
    failures: Mutex<HashMap<BackendOp, BackendError>>,
    next_message_id: AtomicU64,
}

impl MemoryBackend {
    /// Create a new, empty backend.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create topic `name`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` when the topic is already present.
    pub fn create_topic(&self, name: &str) -> BackendResult<()> {
        // ---
        let mut topics = lock_ignore_poison(&self.topics);
        if topics.contains_key(name) {
            return Err(BackendError::AlreadyExists(format!("topic {name}")));
        }

        log_debug!("memory: create topic {name}");
        topics.insert(name.to_string(), TopicState::default());
        Ok(())
    }

    /// Delete topic `name` together with its subscriptions.
    ///
    /// # Errors
    ///
    /// `NotFound` when the topic does not exist.
    pub fn delete_topic(&self, name: &str) -> BackendResult<()> {
        // ---
        let removed = lock_ignore_poison(&self.topics).remove(name);
        let topic = removed.ok_or_else(|| BackendError::NotFound(format!("topic {name}")))?;

        log_debug!("memory: delete topic {name}");
        for sub in topic.subscriptions.values() {
            sub.close();
        }
        Ok(())
    }

    /// Delete subscription `name` on `topic`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the topic or subscription does not exist.
    pub fn delete_subscription(&self, topic: &str, name: &str) -> BackendResult<()> {
        // ---
        let removed = lock_ignore_poison(&self.topics)
            .get_mut(topic)
            .and_then(|t| t.subscriptions.remove(name));
        let sub = removed
            .ok_or_else(|| BackendError::NotFound(format!("subscription {topic}/{name}")))?;

        log_debug!("memory: delete subscription {topic}/{name}");
        sub.close();
        Ok(())
    }

    /// Names of the subscriptions on `topic`, sorted. Empty when the topic
    /// does not exist.
    pub fn subscription_names(&self, topic: &str) -> Vec<String> {
        // ---
        let topics = lock_ignore_poison(&self.topics);
        let mut names: Vec<String> = topics
            .get(topic)
            .map(|t| t.subscriptions.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Options the subscription was created with.
    pub fn subscription_options(&self, topic: &str, name: &str) -> Option<SubscriptionOptions> {
        self.find(topic, name).map(|sub| sub.options.clone())
    }

    /// Number of handlers registered for `event` on a subscription.
    pub fn listener_count(&self, topic: &str, name: &str, event: SubscriptionEvent) -> usize {
        // ---
        self.find(topic, name)
            .map(|sub| {
                lock_ignore_poison(&sub.inner)
                    .handlers
                    .iter()
                    .filter(|h| h.event() == event)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Deliver `error` to every error handler of a subscription.
    ///
    /// Returns the number of handlers invoked. A panicking handler is
    /// logged and does not stop the others, as on the delivery path.
    pub fn emit_error(&self, topic: &str, name: &str, error: BackendError) -> usize {
        // ---
        let Some(sub) = self.find(topic, name) else {
            return 0;
        };

        let callbacks: Vec<_> = lock_ignore_poison(&sub.inner)
            .handlers
            .iter()
            .filter_map(|h| match h {
                EventHandler::Error(cb) => Some(cb.clone()),
                EventHandler::Message(_) => None,
            })
            .collect();

        for cb in &callbacks {
            let delivered = error.clone();
            if panic::catch_unwind(AssertUnwindSafe(|| cb(delivered))).is_err() {
                log_error!("{}: error handler panicked", sub.label);
            }
        }
        callbacks.len()
    }

    /// Make the next call of `op` fail with `error`.
    ///
    /// The failure is consumed by the first matching call.
    pub fn fail_next(&self, op: BackendOp, error: BackendError) {
        lock_ignore_poison(&self.failures).insert(op, error);
    }

    fn take_failure(&self, op: BackendOp) -> BackendResult<()> {
        // ---
        match lock_ignore_poison(&self.failures).remove(&op) {
            Some(err) => {
                log_debug!("memory: injected failure for {op:?}: {err}");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn find(&self, topic: &str, name: &str) -> Option<Arc<SubscriptionState>> {
        lock_ignore_poison(&self.topics)
            .get(topic)
            .and_then(|t| t.subscriptions.get(name).cloned())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        // ---
        Self {
            topics: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            next_message_id: AtomicU64::new(1),
        }
    }
}

impl Drop for MemoryBackend {
    fn drop(&mut self) {
        // ---
        let topics = lock_ignore_poison(&self.topics);
        for topic in topics.values() {
            for sub in topic.subscriptions.values() {
                sub.close();
            }
        }
    }
}

#[async_trait::async_trait]
impl MessagingBackend for MemoryBackend {
    // ---
    fn topic(&self, name: &str) -> TopicRef {
        TopicRef::new(name)
    }

    fn subscription(&self, topic: &TopicRef, name: &str) -> SubscriptionRef {
        SubscriptionRef::new(topic.clone(), name)
    }

    async fn topic_exists(&self, topic: &TopicRef) -> BackendResult<Value> {
        // ---
        self.take_failure(BackendOp::TopicExists)?;
        let exists = lock_ignore_poison(&self.topics).contains_key(topic.name());
        Ok(json!([exists]))
    }

    async fn subscription_exists(&self, subscription: &SubscriptionRef) -> BackendResult<Value> {
        // ---
        self.take_failure(BackendOp::SubscriptionExists)?;
        let exists = self
            .find(subscription.topic().name(), subscription.name())
            .is_some();
        Ok(json!([exists]))
    }

    /// Create a subscription and start its dispatcher.
    async fn create_subscription(
        &self,
        topic: &TopicRef,
        name: &str,
        options: &SubscriptionOptions,
    ) -> BackendResult<SubscriptionRef> {
        // ---
        self.take_failure(BackendOp::CreateSubscription)?;

        let state = {
            let mut topics = lock_ignore_poison(&self.topics);
            let topic_state = topics
                .get_mut(topic.name())
                .ok_or_else(|| BackendError::NotFound(format!("topic {}", topic.name())))?;

            if topic_state.subscriptions.contains_key(name) {
                return Err(BackendError::AlreadyExists(format!(
                    "subscription {}/{name}",
                    topic.name()
                )));
            }

            let state = SubscriptionState::new(format!("{}/{name}", topic.name()), options.clone());
            topic_state
                .subscriptions
                .insert(name.to_string(), state.clone());
            state
        };

        log_debug!("memory: create subscription {}", state.label);
        tokio::spawn(dispatch(state));

        Ok(SubscriptionRef::new(topic.clone(), name))
    }

    /// Fan the message out to every subscription of the topic.
    ///
    /// Messages published to a topic without subscriptions are accepted and
    /// dropped, like on a managed service.
    async fn publish(
        &self,
        topic: &TopicRef,
        data: Bytes,
        attributes: Attributes,
    ) -> BackendResult<MessageId> {
        // ---
        self.take_failure(BackendOp::Publish)?;

        let subscriptions: Vec<Arc<SubscriptionState>> = {
            let topics = lock_ignore_poison(&self.topics);
            let topic_state = topics
                .get(topic.name())
                .ok_or_else(|| BackendError::NotFound(format!("topic {}", topic.name())))?;
            topic_state.subscriptions.values().cloned().collect()
        };

        let id = MessageId::from(self.next_message_id.fetch_add(1, Ordering::Relaxed).to_string());
        let message = Message {
            id: id.clone(),
            data,
            attributes,
            publish_time: SystemTime::now(),
        };

        log_debug!(
            "memory: publish {id} to {} ({} subscription(s))",
            topic.name(),
            subscriptions.len()
        );
        for sub in &subscriptions {
            sub.enqueue(message.clone());
        }

        Ok(id)
    }

    fn on(&self, subscription: &SubscriptionRef, handler: EventHandler) {
        // ---
        let Some(state) = self.find(subscription.topic().name(), subscription.name()) else {
            log_warn!(
                "memory: ignoring {:?} handler for missing subscription {}/{}",
                handler.event(),
                subscription.topic().name(),
                subscription.name()
            );
            return;
        };

        let is_message = handler.event() == SubscriptionEvent::Message;
        lock_ignore_poison(&state.inner).handlers.push(handler);

        // A new message handler may unblock a pending backlog.
        if is_message {
            state.notify.notify_one();
        }
    }

    fn remove_listener(&self, subscription: &SubscriptionRef, handler: &EventHandler) {
        // ---
        let Some(state) = self.find(subscription.topic().name(), subscription.name()) else {
            return;
        };

        let mut inner = lock_ignore_poison(&state.inner);
        if let Some(pos) = inner.handlers.iter().position(|h| h.same_callback(handler)) {
            inner.handlers.remove(pos);
        }
    }
}
