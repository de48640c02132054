// tests/common/mod.rs

//! Shared test support: a recording fake backend and logging setup.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::{json, Value};

use pubsub_messenger::{
    // ---
    Attributes,
    BackendError,
    BackendResult,
    EventHandler,
    MessageId,
    MessagingBackend,
    SubscriptionEvent,
    SubscriptionOptions,
    SubscriptionRef,
    TopicRef,
};

/// One recorded backend interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    TopicExists(String),
    SubscriptionExists(String),
    CreateSubscription(String),
    Publish(String, Bytes, Attributes),
    On(SubscriptionEvent),
    RemoveListener(SubscriptionEvent),
}

/// Backend fake that answers probes with fixed raw responses and records
/// every call, in the spirit of a stubbed client.
pub struct RecordingBackend {
    // ---
    topic_response: Value,
    subscription_response: Value,
    create_failure: Mutex<Option<BackendError>>,
    calls: Mutex<Vec<Call>>,
    lookups: Mutex<Vec<SubscriptionRef>>,
    created: Mutex<Vec<SubscriptionRef>>,
    registrations: Mutex<Vec<(SubscriptionRef, EventHandler)>>,
}

impl RecordingBackend {
    pub fn new(topic_exists: bool, subscription_exists: bool) -> Arc<Self> {
        Self::with_responses(json!([topic_exists]), json!([subscription_exists]))
    }

    pub fn with_responses(topic_response: Value, subscription_response: Value) -> Arc<Self> {
        // ---
        Arc::new(Self {
            topic_response,
            subscription_response,
            create_failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
        })
    }

    /// Make every create call fail with `err`.
    pub fn fail_create(&self, err: BackendError) {
        *self.create_failure.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn creations(&self) -> usize {
        self.count(|c| matches!(c, Call::CreateSubscription(_)))
    }

    pub fn publishes(&self) -> usize {
        self.count(|c| matches!(c, Call::Publish(..)))
    }

    /// Subscription handles handed out by `subscription()`.
    pub fn lookups(&self) -> Vec<SubscriptionRef> {
        self.lookups.lock().unwrap().clone()
    }

    /// Subscription handles returned by `create_subscription()`.
    pub fn created(&self) -> Vec<SubscriptionRef> {
        self.created.lock().unwrap().clone()
    }

    /// Handlers currently registered, with the handle they were bound on.
    pub fn registrations(&self) -> Vec<(SubscriptionRef, EventHandler)> {
        self.registrations.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl MessagingBackend for RecordingBackend {
    // ---
    fn topic(&self, name: &str) -> TopicRef {
        TopicRef::new(name)
    }

    fn subscription(&self, topic: &TopicRef, name: &str) -> SubscriptionRef {
        // ---
        let sub = SubscriptionRef::new(topic.clone(), name);
        self.lookups.lock().unwrap().push(sub.clone());
        sub
    }

    async fn topic_exists(&self, topic: &TopicRef) -> BackendResult<Value> {
        self.record(Call::TopicExists(topic.name().to_string()));
        Ok(self.topic_response.clone())
    }

    async fn subscription_exists(&self, subscription: &SubscriptionRef) -> BackendResult<Value> {
        self.record(Call::SubscriptionExists(subscription.name().to_string()));
        Ok(self.subscription_response.clone())
    }

    async fn create_subscription(
        &self,
        topic: &TopicRef,
        name: &str,
        _options: &SubscriptionOptions,
    ) -> BackendResult<SubscriptionRef> {
        // ---
        self.record(Call::CreateSubscription(name.to_string()));

        if let Some(err) = self.create_failure.lock().unwrap().clone() {
            return Err(err);
        }

        let sub = SubscriptionRef::new(topic.clone(), name);
        self.created.lock().unwrap().push(sub.clone());
        Ok(sub)
    }

    async fn publish(
        &self,
        topic: &TopicRef,
        data: Bytes,
        attributes: Attributes,
    ) -> BackendResult<MessageId> {
        self.record(Call::Publish(topic.name().to_string(), data, attributes));
        Ok(MessageId::from("messageId"))
    }

    fn on(&self, subscription: &SubscriptionRef, handler: EventHandler) {
        // ---
        self.record(Call::On(handler.event()));
        self.registrations
            .lock()
            .unwrap()
            .push((subscription.clone(), handler));
    }

    fn remove_listener(&self, _subscription: &SubscriptionRef, handler: &EventHandler) {
        // ---
        self.record(Call::RemoveListener(handler.event()));
        let mut regs = self.registrations.lock().unwrap();
        if let Some(pos) = regs.iter().position(|(_, h)| h.same_callback(handler)) {
            regs.remove(pos);
        }
    }
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
