//! Messenger builder.
//!
//! Provides a fluent builder API for configuring how a [`PubSubMessenger`]
//! provisions missing subscriptions.

use std::sync::Arc;

use crate::{
    // ---
    BackendPtr,
    DefaultCreator,
    MessengerError,
    PubSubMessenger,
    Result,
    SubscriptionCreator,
    SubscriptionOptions,
};

/// Builder for [`PubSubMessenger`] instances.
///
/// Either set [`subscription_options`](Self::subscription_options) to have
/// the default creator provision with them, or plug in a whole
/// [`creator`](Self::creator). Setting both is rejected at build time.
///
/// # Examples
///
/// ## Default creator with options
/// ```
/// use pubsub_messenger::{MemoryBackend, MessengerBuilder, SubscriptionOptions};
/// use std::time::Duration;
///
/// # fn example() -> pubsub_messenger::Result<()> {
/// let messenger = MessengerBuilder::new(MemoryBackend::new())
///     .subscription_options(
///         SubscriptionOptions::default().with_ack_deadline(Duration::from_secs(60)),
///     )
///     .build()?;
/// # Ok(())
/// # }
/// ```
///
/// ## Custom creator
/// ```
/// use pubsub_messenger::{DefaultCreator, MemoryBackend, MessengerBuilder};
/// use std::sync::Arc;
///
/// # fn example() -> pubsub_messenger::Result<()> {
/// let messenger = MessengerBuilder::new(MemoryBackend::new())
///     .creator(Arc::new(DefaultCreator::default()))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct MessengerBuilder {
    // ---
    backend: BackendPtr,
    subscription_options: Option<SubscriptionOptions>,
    creator: Option<Arc<dyn SubscriptionCreator>>,
}

impl MessengerBuilder {
    /// Create a new builder over `backend`.
    pub fn new(backend: BackendPtr) -> Self {
        // ---
        Self {
            backend,
            subscription_options: None,
            creator: None,
        }
    }

    /// Options the default creator passes to the backend.
    ///
    /// Default: `SubscriptionOptions::default()`.
    pub fn subscription_options(mut self, options: SubscriptionOptions) -> Self {
        self.subscription_options = Some(options);
        self
    }

    /// Replace the default creator.
    pub fn creator(mut self, creator: Arc<dyn SubscriptionCreator>) -> Self {
        self.creator = Some(creator);
        self
    }

    /// Build the messenger (consumes self).
    ///
    /// # Errors
    ///
    /// Returns [`MessengerError::InvalidConfig`] if:
    /// - both a creator and subscription options were set
    /// - the subscription options fail validation
    pub fn build(self) -> Result<PubSubMessenger> {
        // ---
        let creator: Arc<dyn SubscriptionCreator> = match (self.creator, self.subscription_options)
        {
            (Some(_), Some(_)) => {
                return Err(MessengerError::InvalidConfig(
                    "cannot set both a custom creator and subscription options".into(),
                ));
            }
            (Some(creator), None) => creator,
            (None, options) => Arc::new(DefaultCreator::new(options.unwrap_or_default())?),
        };

        Ok(PubSubMessenger::with_creator(self.backend, creator))
    }
}
