//! In-process broker implementation
//!
//! [`MemoryBroker`] keeps exchanges, bindings and queues in memory and hands deliveries to
//! consumers through unbounded channels. It follows the semantics of an AMQP broker closely
//! enough to be used for tests and for embedding requestors and responders in the same process.

mod state;

use state::BrokerState;

use super::super::broker::{
    BasicProperties, BrokerError, Channel, ChannelFactory, ConsumerTag, Consumption, Delivery,
};
use super::super::topology::{ExchangeDescriptor, QueueDescriptor};
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;
use uuid::Uuid;

/// Broker living entirely in memory
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    channel: Arc<MemoryChannel>,
}

impl MemoryBroker {
    /// Creates a new broker with the `amq.direct`, `amq.topic` and `amq.fanout` exchanges predeclared
    pub fn new() -> Self {
        Self {
            channel: Arc::new(MemoryChannel {
                state: Arc::new(Mutex::new(BrokerState::new())),
            }),
        }
    }

    /// Shared channel into this broker
    pub fn connect(&self) -> Arc<MemoryChannel> {
        self.channel.clone()
    }

    /// Number of active consumers on a queue
    pub fn consumer_count(&self, queue: &str) -> usize {
        self.channel
            .state()
            .queue(queue)
            .map(|queue| queue.consumer_count())
            .unwrap_or_default()
    }

    /// Number of messages waiting for a consumer
    pub fn queued_messages(&self, queue: &str) -> usize {
        self.channel
            .state()
            .queue(queue)
            .map(|queue| queue.buffered())
            .unwrap_or_default()
    }

    /// Whether a queue has been declared (and not yet deleted)
    pub fn has_queue(&self, queue: &str) -> bool {
        self.channel.state().queue(queue).is_some()
    }

    /// Bindings of an exchange as pairs of routing key and queue name
    pub fn bindings(&self, exchange: &str) -> Vec<(String, String)> {
        self.channel.state().bindings(exchange)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelFactory for MemoryBroker {
    type Channel = MemoryChannel;

    async fn channel(&self) -> Result<Arc<Self::Channel>, BoxedError> {
        Ok(self.connect())
    }
}

/// [`Channel`] into a [`MemoryBroker`]
pub struct MemoryChannel {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryChannel {
    fn state(&self) -> MutexGuard<BrokerState> {
        // The state is never left half-modified, thus a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn declare_queue(&self, queue: &QueueDescriptor) -> EmptyResult {
        self.state().declare_queue(queue)?;
        Ok(())
    }

    async fn declare_exchange(&self, exchange: &ExchangeDescriptor) -> EmptyResult {
        self.state().declare_exchange(exchange)?;
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> EmptyResult {
        self.state().bind(queue, exchange, routing_key)?;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &BasicProperties,
        body: &[u8],
    ) -> EmptyResult {
        let delivery = Delivery {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            properties: properties.clone(),
            body: body.to_vec(),
        };

        let routed = self.state().publish(delivery)?;
        trace!(exchange, routing_key, routed, "Published message");

        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Consumption, BoxedError> {
        let tag: ConsumerTag = format!("ctag-{}", Uuid::new_v4().to_simple());
        let (tx, rx) = mpsc::unbounded();

        self.state()
            .queue_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_owned()))?
            .attach(tag.clone(), tx);

        Ok(Consumption {
            tag,
            deliveries: rx.boxed(),
        })
    }

    async fn cancel(&self, tag: &ConsumerTag) -> EmptyResult {
        self.state().cancel(tag);
        Ok(())
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    fn message(correlation_id: &str) -> BasicProperties {
        BasicProperties::default().with_correlation_id(correlation_id)
    }

    async fn setup(kind: ExchangeDescriptor, bindings: &[(&str, &str)]) -> Arc<MemoryChannel> {
        let channel = MemoryBroker::new().channel().await.unwrap();
        channel.declare_exchange(&kind).await.unwrap();

        for (queue, key) in bindings {
            channel
                .declare_queue(&QueueDescriptor::durable(*queue))
                .await
                .unwrap();
            channel.bind_queue(queue, kind.name(), key).await.unwrap();
        }

        channel
    }

    #[tokio::test]
    async fn tolerate_repeated_declarations() {
        let broker = MemoryBroker::new();
        let channel = broker.channel().await.unwrap();
        let queue = QueueDescriptor::durable("q");
        let exchange = ExchangeDescriptor::direct("x");

        for _ in 0..2 {
            channel.declare_queue(&queue).await.unwrap();
            channel.declare_exchange(&exchange).await.unwrap();
            channel.bind_queue("q", "x", "key").await.unwrap();
        }

        assert_eq!(
            broker.bindings("x"),
            vec![("key".to_string(), "q".to_string())]
        );
        assert!(channel
            .declare_exchange(&ExchangeDescriptor::fanout("x"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn refuse_unknown_entities() {
        let channel = MemoryBroker::new().channel().await.unwrap();

        assert!(channel.bind_queue("q", "amq.direct", "key").await.is_err());
        assert!(channel.consume("q").await.is_err());
        assert!(channel
            .publish("missing", "key", &message("1"), b"")
            .await
            .is_err());
        assert!(channel
            .declare_exchange(&ExchangeDescriptor::default_exchange())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn route_through_topic_exchange() {
        let channel = setup(
            ExchangeDescriptor::topic("events"),
            &[("users", "user.*"), ("all", "#")],
        )
        .await;

        channel
            .publish("events", "user.created", &message("1"), b"a")
            .await
            .unwrap();
        channel
            .publish("events", "order.created", &message("2"), b"b")
            .await
            .unwrap();

        let mut users = channel.consume("users").await.unwrap().deliveries;
        let mut all = channel.consume("all").await.unwrap().deliveries;

        assert_eq!(users.next().await.unwrap().body, b"a".to_vec());
        assert_eq!(all.next().await.unwrap().body, b"a".to_vec());
        assert_eq!(all.next().await.unwrap().body, b"b".to_vec());
    }

    #[tokio::test]
    async fn route_default_exchange_by_queue_name() {
        let channel = MemoryBroker::new().channel().await.unwrap();
        channel
            .declare_queue(&QueueDescriptor::ephemeral("direct"))
            .await
            .unwrap();

        let mut consumer = channel.consume("direct").await.unwrap().deliveries;
        channel
            .publish("", "direct", &message("1"), b"hello")
            .await
            .unwrap();

        let delivery = consumer.next().await.unwrap();
        assert_eq!(delivery.exchange, "");
        assert_eq!(delivery.properties.correlation_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn buffer_until_consumed() {
        let channel = setup(ExchangeDescriptor::fanout("fan"), &[("late", "")]).await;

        channel
            .publish("fan", "", &message("1"), b"early")
            .await
            .unwrap();

        let mut consumer = channel.consume("late").await.unwrap().deliveries;
        assert_eq!(consumer.next().await.unwrap().body, b"early".to_vec());
    }

    #[tokio::test]
    async fn end_stream_on_cancel() {
        let broker = MemoryBroker::new();
        let channel = broker.channel().await.unwrap();
        channel
            .declare_queue(&QueueDescriptor::ephemeral("temp"))
            .await
            .unwrap();

        let consumption = channel.consume("temp").await.unwrap();
        assert_eq!(broker.consumer_count("temp"), 1);

        channel.cancel(&consumption.tag).await.unwrap();
        channel.cancel(&consumption.tag).await.unwrap();

        let remaining: Vec<Delivery> = consumption.deliveries.collect().await;
        assert!(remaining.is_empty());
        assert_eq!(broker.consumer_count("temp"), 0);
        assert!(!broker.has_queue("temp"));
    }

    #[tokio::test]
    async fn keep_durable_queue_after_cancel() {
        let broker = MemoryBroker::new();
        let channel = broker.channel().await.unwrap();
        channel
            .declare_queue(&QueueDescriptor::durable("keep"))
            .await
            .unwrap();

        let consumption = channel.consume("keep").await.unwrap();
        channel.cancel(&consumption.tag).await.unwrap();

        assert!(broker.has_queue("keep"));
    }
}
