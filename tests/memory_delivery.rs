// tests/memory_delivery.rs

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Barrier;
use tokio::time::{timeout, Duration};

use common::init_logging;
use pubsub_messenger::{
    // ---
    Attributes,
    BackendError,
    DefaultCreator,
    Delivery,
    MemoryBackend,
    Message,
    Messenger,
    MessagingBackend,
    PubSubMessenger,
    SubscriptionCreator,
    SubscriptionEvent,
    SubscriptionListener,
    SubscriptionRef,
    TopicRef,
};

fn setup() -> (Arc<MemoryBackend>, PubSubMessenger) {
    // ---
    init_logging();
    let backend = MemoryBackend::new();
    backend.create_topic("orders").expect("create topic");
    let messenger = PubSubMessenger::new(backend.clone());
    (backend, messenger)
}

async fn next_message(inbox: &mut UnboundedReceiver<Delivery>) -> Message {
    // ---
    let delivery = timeout(Duration::from_millis(500), inbox.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("inbox closed unexpectedly");

    match delivery {
        Delivery::Message(msg) => msg,
        Delivery::Error(err) => panic!("expected message, got error: {err}"),
    }
}

async fn assert_quiet(inbox: &mut UnboundedReceiver<Delivery>) {
    let res = timeout(Duration::from_millis(100), inbox.recv()).await;
    assert!(res.is_err(), "unexpected delivery: {res:?}");
}

#[tokio::test]
async fn published_bytes_reach_the_listener_unchanged() {
    // ---
    // Arrange
    // ---
    let (_backend, messenger) = setup();
    let (listener, mut inbox) = SubscriptionListener::inbox();

    messenger
        .subscribe("orders", "billing", listener)
        .await
        .expect("subscribe failed");

    let payload = Bytes::from(vec![0u8, 1, 2, 254, 255]);
    let mut attributes = Attributes::new();
    attributes.insert("content-type".into(), "application/octet-stream".into());

    // ---
    // Act
    // ---
    let id = messenger
        .publish("orders", payload.clone(), Some(attributes.clone()))
        .await
        .expect("publish failed");

    // ---
    // Assert
    // ---
    let received = next_message(&mut inbox).await;
    assert_eq!(received.id, id);
    assert_eq!(received.data, payload);
    assert_eq!(received.attributes, attributes);
}

#[tokio::test]
async fn every_attached_listener_receives_each_message() {
    // ---
    let (backend, messenger) = setup();
    let (first, mut first_inbox) = SubscriptionListener::inbox();
    let (second, mut second_inbox) = SubscriptionListener::inbox();

    messenger
        .subscribe("orders", "billing", first)
        .await
        .expect("first subscribe failed");
    messenger
        .subscribe("orders", "billing", second)
        .await
        .expect("second subscribe failed");

    assert_eq!(
        backend.listener_count("orders", "billing", SubscriptionEvent::Message),
        2
    );

    messenger
        .publish("orders", Bytes::from_static(b"fan-out"), None)
        .await
        .expect("publish failed");

    assert_eq!(next_message(&mut first_inbox).await.data, "fan-out");
    assert_eq!(next_message(&mut second_inbox).await.data, "fan-out");
}

#[tokio::test]
async fn each_subscription_gets_its_own_copy() {
    // ---
    let (_backend, messenger) = setup();
    let (billing, mut billing_inbox) = SubscriptionListener::inbox();
    let (shipping, mut shipping_inbox) = SubscriptionListener::inbox();

    messenger
        .subscribe("orders", "billing", billing)
        .await
        .expect("subscribe billing failed");
    messenger
        .subscribe("orders", "shipping", shipping)
        .await
        .expect("subscribe shipping failed");

    messenger
        .publish("orders", Bytes::from_static(b"order-7"), None)
        .await
        .expect("publish failed");

    assert_eq!(next_message(&mut billing_inbox).await.data, "order-7");
    assert_eq!(next_message(&mut shipping_inbox).await.data, "order-7");
}

#[tokio::test]
async fn unsubscribed_listener_stops_receiving() {
    // ---
    let (backend, messenger) = setup();
    let (leaving, mut leaving_inbox) = SubscriptionListener::inbox();
    let (staying, mut staying_inbox) = SubscriptionListener::inbox();

    messenger
        .subscribe("orders", "billing", leaving.clone())
        .await
        .expect("subscribe failed");
    messenger
        .subscribe("orders", "billing", staying)
        .await
        .expect("subscribe failed");

    messenger
        .unsubscribe("orders", "billing", &leaving)
        .await
        .expect("unsubscribe failed");

    assert_eq!(
        backend.listener_count("orders", "billing", SubscriptionEvent::Message),
        1
    );
    assert_eq!(
        backend.listener_count("orders", "billing", SubscriptionEvent::Error),
        1
    );

    messenger
        .publish("orders", Bytes::from_static(b"after"), None)
        .await
        .expect("publish failed");

    assert_eq!(next_message(&mut staying_inbox).await.data, "after");
    assert_quiet(&mut leaving_inbox).await;
}

#[tokio::test]
async fn last_listener_removed_leaves_subscription_unbound() {
    // ---
    let (backend, messenger) = setup();
    let (listener, _inbox) = SubscriptionListener::inbox();

    messenger
        .subscribe("orders", "billing", listener.clone())
        .await
        .expect("subscribe failed");
    messenger
        .unsubscribe("orders", "billing", &listener)
        .await
        .expect("unsubscribe failed");
    messenger
        .unsubscribe("orders", "billing", &listener)
        .await
        .expect("repeat unsubscribe failed");

    for event in [SubscriptionEvent::Message, SubscriptionEvent::Error] {
        assert_eq!(backend.listener_count("orders", "billing", event), 0);
    }
    // The subscription itself is untouched.
    assert_eq!(backend.subscription_names("orders"), vec!["billing".to_string()]);
}

#[tokio::test]
async fn stream_errors_reach_on_error() {
    // ---
    let (backend, messenger) = setup();
    let (listener, mut inbox) = SubscriptionListener::inbox();

    messenger
        .subscribe("orders", "billing", listener)
        .await
        .expect("subscribe failed");

    let invoked = backend.emit_error(
        "orders",
        "billing",
        BackendError::Unavailable("stream reset".into()),
    );
    assert_eq!(invoked, 1);

    let delivery = timeout(Duration::from_millis(500), inbox.recv())
        .await
        .expect("timed out waiting for error")
        .expect("inbox closed");
    assert!(matches!(delivery, Delivery::Error(BackendError::Unavailable(_))));
}

/// Simulates another process creating the subscription between our
/// existence probe and our create call.
struct RacingCreator {
    rival: Arc<MemoryBackend>,
}

#[async_trait::async_trait]
impl SubscriptionCreator for RacingCreator {
    async fn create(
        &self,
        backend: &dyn MessagingBackend,
        topic: &TopicRef,
        subscription_name: &str,
    ) -> Result<SubscriptionRef, BackendError> {
        // ---
        DefaultCreator::default()
            .create(self.rival.as_ref(), topic, subscription_name)
            .await?;

        DefaultCreator::default()
            .create(backend, topic, subscription_name)
            .await
    }
}

#[tokio::test]
async fn externally_created_subscription_is_adopted() {
    // ---
    let (backend, messenger) = setup();
    let creator = RacingCreator {
        rival: backend.clone(),
    };
    let (listener, mut inbox) = SubscriptionListener::inbox();

    let sub = messenger
        .subscribe_with("orders", "billing", listener, &creator)
        .await
        .expect("race surfaced as an error");
    assert_eq!(sub.name(), "billing");

    messenger
        .publish("orders", Bytes::from_static(b"won anyway"), None)
        .await
        .expect("publish failed");
    assert_eq!(next_message(&mut inbox).await.data, "won anyway");
}

/// Holds every caller at a barrier after the existence probe, so all of
/// them see the subscription as missing before any of them creates it.
struct GatedCreator {
    gate: Barrier,
    calls: AtomicUsize,
    already_exists: AtomicUsize,
}

impl GatedCreator {
    fn new(parties: usize) -> Self {
        Self {
            gate: Barrier::new(parties),
            calls: AtomicUsize::new(0),
            already_exists: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl SubscriptionCreator for GatedCreator {
    async fn create(
        &self,
        backend: &dyn MessagingBackend,
        topic: &TopicRef,
        subscription_name: &str,
    ) -> Result<SubscriptionRef, BackendError> {
        // ---
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.wait().await;

        let res = DefaultCreator::default()
            .create(backend, topic, subscription_name)
            .await;
        if matches!(res, Err(ref err) if err.is_already_exists()) {
            self.already_exists.fetch_add(1, Ordering::SeqCst);
        }
        res
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribes_race_and_all_succeed() {
    // ---
    // Arrange
    // ---
    const TASKS: usize = 8;
    let (backend, messenger) = setup();
    let creator = Arc::new(GatedCreator::new(TASKS));

    // ---
    // Act
    // ---
    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let m = messenger.clone();
        let creator = creator.clone();
        handles.push(tokio::spawn(async move {
            m.subscribe_with(
                "orders",
                "billing",
                SubscriptionListener::new(|_| {}, |_| {}),
                creator.as_ref(),
            )
            .await
        }));
    }

    let mut subs = Vec::new();
    for task in handles {
        let sub = timeout(Duration::from_secs(5), task)
            .await
            .expect("concurrent subscribe timed out")
            .expect("subscribe task panicked")
            .expect("concurrent subscribe failed");
        subs.push(sub);
    }

    // ---
    // Assert
    // ---
    assert_eq!(creator.calls.load(Ordering::SeqCst), TASKS);
    assert_eq!(creator.already_exists.load(Ordering::SeqCst), TASKS - 1);
    assert!(subs.iter().all(|s| s.same_resource(&subs[0])));

    assert_eq!(backend.subscription_names("orders"), vec!["billing".to_string()]);
    assert_eq!(
        backend.listener_count("orders", "billing", SubscriptionEvent::Message),
        TASKS
    );
    assert_eq!(
        backend.listener_count("orders", "billing", SubscriptionEvent::Error),
        TASKS
    );
}

#[tokio::test]
async fn deleted_subscription_is_recreated_on_next_subscribe() {
    // ---
    let (backend, messenger) = setup();

    messenger
        .subscribe("orders", "billing", SubscriptionListener::new(|_| {}, |_| {}))
        .await
        .expect("subscribe failed");
    backend
        .delete_subscription("orders", "billing")
        .expect("delete subscription");
    assert!(backend.subscription_names("orders").is_empty());

    let (listener, mut inbox) = SubscriptionListener::inbox();
    messenger
        .subscribe("orders", "billing", listener)
        .await
        .expect("resubscribe failed");

    messenger
        .publish("orders", Bytes::from_static(b"again"), None)
        .await
        .expect("publish failed");
    assert_eq!(next_message(&mut inbox).await.data, "again");
}

#[tokio::test]
async fn deleted_topic_is_reported_not_recreated() {
    // ---
    let (backend, messenger) = setup();
    backend.delete_topic("orders").expect("delete topic");

    let err = messenger
        .publish("orders", Bytes::from_static(b"lost"), None)
        .await
        .expect_err("publish to deleted topic succeeded");
    assert!(matches!(
        err,
        pubsub_messenger::MessengerError::TopicNotFound { .. }
    ));
    assert!(backend.subscription_names("orders").is_empty());
}

#[tokio::test]
async fn panicking_listener_does_not_stop_delivery() {
    // ---
    let (_backend, messenger) = setup();
    let (listener, mut inbox) = SubscriptionListener::inbox();

    messenger
        .subscribe(
            "orders",
            "billing",
            SubscriptionListener::new(|_| panic!("listener bug"), |_| {}),
        )
        .await
        .expect("subscribe failed");
    messenger
        .subscribe("orders", "billing", listener)
        .await
        .expect("subscribe failed");

    for payload in [&b"one"[..], &b"two"[..]] {
        messenger
            .publish("orders", Bytes::copy_from_slice(payload), None)
            .await
            .expect("publish failed");
    }

    assert_eq!(next_message(&mut inbox).await.data, "one");
    assert_eq!(next_message(&mut inbox).await.data, "two");
}
