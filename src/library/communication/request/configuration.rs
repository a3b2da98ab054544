use super::super::topology::{ExchangeDescriptor, QueueDescriptor};
use crate::constants::{DEFAULT_REPLY_QUEUE_PREFIX, DEFAULT_RPC_EXCHANGE};
use uuid::Uuid;

/// Topology used by a single request
///
/// May be reused across requests as long as no two of them are outstanding at the same time,
/// since a reply queue must never be shared between concurrent requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfiguration {
    /// Queue on which the response is expected
    pub reply_queue: QueueDescriptor,
    /// Exchange the request is published to
    pub exchange: ExchangeDescriptor,
    /// Routing key used to publish the request
    pub routing_key: String,
    /// Key with which the reply queue is bound to the exchange
    pub reply_queue_routing_key: String,
}

impl RequestConfiguration {
    /// Creates a new instance from raw parts
    pub fn new(
        reply_queue: QueueDescriptor,
        exchange: ExchangeDescriptor,
        routing_key: impl Into<String>,
        reply_queue_routing_key: impl Into<String>,
    ) -> Self {
        Self {
            reply_queue,
            exchange,
            routing_key: routing_key.into(),
            reply_queue_routing_key: reply_queue_routing_key.into(),
        }
    }

    /// Starts building a configuration for requests published with the given routing key
    pub fn builder(routing_key: impl Into<String>) -> RequestConfigurationBuilder {
        RequestConfigurationBuilder::new(routing_key)
    }
}

/// Builder for [`RequestConfiguration`] filling in conventional defaults
///
/// - Exchange: durable direct exchange named [`DEFAULT_RPC_EXCHANGE`]
/// - Reply queue: ephemeral queue with a unique name prefixed by [`DEFAULT_REPLY_QUEUE_PREFIX`]
/// - Reply queue routing key: name of the reply queue
pub struct RequestConfigurationBuilder {
    routing_key: String,
    exchange: Option<ExchangeDescriptor>,
    reply_queue: Option<QueueDescriptor>,
    reply_queue_routing_key: Option<String>,
}

impl RequestConfigurationBuilder {
    fn new(routing_key: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
            exchange: None,
            reply_queue: None,
            reply_queue_routing_key: None,
        }
    }

    /// Exchange the request is published to
    pub fn exchange(mut self, exchange: ExchangeDescriptor) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Queue on which the response will be awaited
    pub fn reply_queue(mut self, queue: QueueDescriptor) -> Self {
        self.reply_queue = Some(queue);
        self
    }

    /// Key with which the reply queue is bound to the exchange
    pub fn reply_queue_routing_key(mut self, key: impl Into<String>) -> Self {
        self.reply_queue_routing_key = Some(key.into());
        self
    }

    /// Creates the configuration, generating a fresh reply queue if none has been set
    pub fn build(self) -> RequestConfiguration {
        let reply_queue = self.reply_queue.unwrap_or_else(|| {
            QueueDescriptor::ephemeral(format!(
                "{}.{}",
                DEFAULT_REPLY_QUEUE_PREFIX,
                Uuid::new_v4().to_simple()
            ))
        });

        let reply_queue_routing_key = self
            .reply_queue_routing_key
            .unwrap_or_else(|| reply_queue.name().to_owned());

        RequestConfiguration {
            exchange: self
                .exchange
                .unwrap_or_else(|| ExchangeDescriptor::direct(DEFAULT_RPC_EXCHANGE)),
            reply_queue,
            routing_key: self.routing_key,
            reply_queue_routing_key,
        }
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn apply_conventions() {
        let config = RequestConfiguration::builder("user.get").build();

        assert_eq!(config.routing_key, "user.get");
        assert_eq!(config.exchange, ExchangeDescriptor::direct(DEFAULT_RPC_EXCHANGE));
        assert!(config.reply_queue.name().starts_with(DEFAULT_REPLY_QUEUE_PREFIX));
        assert!(config.reply_queue.is_auto_delete());
        assert_eq!(config.reply_queue_routing_key, config.reply_queue.name());
    }

    #[test]
    fn generate_distinct_reply_queues() {
        let first = RequestConfiguration::builder("user.get").build();
        let second = RequestConfiguration::builder("user.get").build();

        assert_ne!(first.reply_queue.name(), second.reply_queue.name());
    }

    #[test]
    fn honor_overrides() {
        let config = RequestConfiguration::builder("user.get")
            .exchange(ExchangeDescriptor::topic("users"))
            .reply_queue(QueueDescriptor::durable("replies"))
            .reply_queue_routing_key("replies.user")
            .build();

        assert_eq!(
            config,
            RequestConfiguration::new(
                QueueDescriptor::durable("replies"),
                ExchangeDescriptor::topic("users"),
                "user.get",
                "replies.user"
            )
        );
    }
}
