//! Subscription provisioning options.
//!
//! These are the knobs the default creator passes to the backend when a
//! subscription has to be created. They are backend-agnostic; each backend
//! maps them onto its own create call and ignores what it cannot express.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{MessengerError, Result};

/// Shortest acknowledgement deadline a subscription may use.
pub const MIN_ACK_DEADLINE: Duration = Duration::from_secs(10);

/// Longest acknowledgement deadline a subscription may use.
pub const MAX_ACK_DEADLINE: Duration = Duration::from_secs(600);

/// Shortest retention window for unacknowledged messages.
pub const MIN_MESSAGE_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Longest retention window for unacknowledged messages.
pub const MAX_MESSAGE_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Dead-letter routing for messages that keep failing delivery.
///
/// # Example
///
/// ```
/// use pubsub_messenger::DeadLetterPolicy;
///
/// let policy = DeadLetterPolicy::new("orders-dead-letter").with_max_delivery_attempts(10);
/// assert_eq!(policy.max_delivery_attempts, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterPolicy {
    /// Topic receiving messages that exceeded `max_delivery_attempts`.
    pub topic: String,

    /// Delivery attempts before a message is dead-lettered (5..=100).
    pub max_delivery_attempts: u32,
}

impl DeadLetterPolicy {
    /// Dead-letter to `topic` after the default of 5 attempts.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            max_delivery_attempts: 5,
        }
    }

    /// Set the number of delivery attempts.
    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = attempts;
        self
    }
}

/// Options used when creating a missing subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    // ---
    /// Time a subscriber has to acknowledge a message before redelivery.
    ///
    /// Default: 10s
    pub ack_deadline: Duration,

    /// Optional backend filter expression; only matching messages are
    /// delivered to the subscription.
    pub filter: Option<String>,

    /// Keep acknowledged messages for replay within the retention window.
    pub retain_acked_messages: bool,

    /// How long unacknowledged messages are kept. `None` uses the backend
    /// default.
    pub message_retention: Option<Duration>,

    /// Optional dead-letter routing.
    pub dead_letter_policy: Option<DeadLetterPolicy>,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            ack_deadline: MIN_ACK_DEADLINE,
            filter: None,
            retain_acked_messages: false,
            message_retention: None,
            dead_letter_policy: None,
        }
    }
}

impl SubscriptionOptions {
    /// Set the acknowledgement deadline.
    pub fn with_ack_deadline(mut self, deadline: Duration) -> Self {
        self.ack_deadline = deadline;
        self
    }

    /// Set a filter expression.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Retain acknowledged messages.
    pub fn with_retain_acked_messages(mut self, retain: bool) -> Self {
        self.retain_acked_messages = retain;
        self
    }

    /// Set the retention window for unacknowledged messages.
    pub fn with_message_retention(mut self, retention: Duration) -> Self {
        self.message_retention = Some(retention);
        self
    }

    /// Route undeliverable messages to a dead-letter topic.
    pub fn with_dead_letter_policy(mut self, policy: DeadLetterPolicy) -> Self {
        self.dead_letter_policy = Some(policy);
        self
    }

    /// Check every field against the ranges backends accept.
    ///
    /// # Errors
    ///
    /// Returns [`MessengerError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.ack_deadline < MIN_ACK_DEADLINE || self.ack_deadline > MAX_ACK_DEADLINE {
            return Err(MessengerError::InvalidConfig(format!(
                "ack_deadline must be between {:?} and {:?}, got {:?}",
                MIN_ACK_DEADLINE, MAX_ACK_DEADLINE, self.ack_deadline
            )));
        }

        if let Some(retention) = self.message_retention {
            if !(MIN_MESSAGE_RETENTION..=MAX_MESSAGE_RETENTION).contains(&retention) {
                return Err(MessengerError::InvalidConfig(format!(
                    "message_retention must be between {:?} and {:?}, got {:?}",
                    MIN_MESSAGE_RETENTION, MAX_MESSAGE_RETENTION, retention
                )));
            }
        }

        if let Some(filter) = &self.filter {
            if filter.trim().is_empty() {
                return Err(MessengerError::InvalidConfig(
                    "filter must not be blank".into(),
                ));
            }
        }

        if let Some(policy) = &self.dead_letter_policy {
            if policy.topic.is_empty() {
                return Err(MessengerError::InvalidConfig(
                    "dead_letter_policy.topic must not be empty".into(),
                ));
            }
            if !(5..=100).contains(&policy.max_delivery_attempts) {
                return Err(MessengerError::InvalidConfig(format!(
                    "dead_letter_policy.max_delivery_attempts must be between 5 and 100, got {}",
                    policy.max_delivery_attempts
                )));
            }
        }

        Ok(())
    }
}
