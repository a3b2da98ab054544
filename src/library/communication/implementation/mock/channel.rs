use crate::library::communication::broker::{
    BasicProperties, Channel, ChannelFactory, ConsumerTag, Consumption, Delivery,
};
use crate::library::communication::implementation::memory::{MemoryBroker, MemoryChannel};
use crate::library::communication::topology::{ExchangeDescriptor, QueueDescriptor};
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Broker operation as recorded by the [`MockChannel`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Operation {
    DeclareQueue(String),
    DeclareExchange(String),
    BindQueue {
        queue: String,
        exchange: String,
        routing_key: String,
    },
    Publish {
        exchange: String,
        routing_key: String,
    },
    Consume(String),
    Cancel(ConsumerTag),
}

/// Error returned by operations which have been told to fail
#[derive(Debug, Error)]
#[error("injected failure for {0:?}")]
pub struct InjectedFailure(Operation);

/// Channel factory wrapping a [`MemoryBroker`] which records every operation and fails selected ones
#[derive(Clone)]
pub struct MockChannelFactory {
    channel: Arc<MockChannel>,
    fail_channel: Arc<Mutex<bool>>,
}

impl MockChannelFactory {
    /// Creates a new instance operating on the given broker
    pub fn new(broker: MemoryBroker) -> Self {
        let inner = broker.connect();

        Self {
            channel: Arc::new(MockChannel {
                inner,
                operations: Arc::new(Mutex::new(Vec::new())),
                failures: Arc::new(Mutex::new(HashSet::new())),
                end_deliveries: Mutex::new(false),
            }),
            fail_channel: Arc::new(Mutex::new(false)),
        }
    }

    /// Makes the given operation fail from now on
    pub fn fail_on(&self, operation: Operation) -> &Self {
        self.channel.failures.lock().unwrap().insert(operation);
        self
    }

    /// Makes consumers started from now on receive a stream which ends right away
    pub fn end_deliveries(&self) -> &Self {
        *self.channel.end_deliveries.lock().unwrap() = true;
        self
    }

    /// Makes all subsequent attempts to obtain a channel fail
    pub fn fail_channel(&self) -> &Self {
        *self.fail_channel.lock().unwrap() = true;
        self
    }

    /// Operations attempted so far, in order
    pub fn operations(&self) -> Vec<Operation> {
        self.channel.operations.lock().unwrap().clone()
    }

    /// Number of recorded operations matching the predicate
    pub fn count(&self, predicate: impl Fn(&Operation) -> bool) -> usize {
        self.operations().iter().filter(|o| predicate(o)).count()
    }
}

#[async_trait]
impl ChannelFactory for MockChannelFactory {
    type Channel = MockChannel;

    async fn channel(&self) -> Result<Arc<Self::Channel>, BoxedError> {
        if *self.fail_channel.lock().unwrap() {
            return Err(InjectedFailure(Operation::Consume("<channel>".into())).into());
        }

        Ok(self.channel.clone())
    }
}

/// Recording channel handed out by [`MockChannelFactory`]
pub struct MockChannel {
    inner: Arc<MemoryChannel>,
    operations: Arc<Mutex<Vec<Operation>>>,
    failures: Arc<Mutex<HashSet<Operation>>>,
    end_deliveries: Mutex<bool>,
}

impl MockChannel {
    fn record(&self, operation: Operation) -> EmptyResult {
        self.operations.lock().unwrap().push(operation.clone());

        if self.failures.lock().unwrap().contains(&operation) {
            Err(InjectedFailure(operation).into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn declare_queue(&self, queue: &QueueDescriptor) -> EmptyResult {
        self.record(Operation::DeclareQueue(queue.name().to_owned()))?;
        self.inner.declare_queue(queue).await
    }

    async fn declare_exchange(&self, exchange: &ExchangeDescriptor) -> EmptyResult {
        self.record(Operation::DeclareExchange(exchange.name().to_owned()))?;
        self.inner.declare_exchange(exchange).await
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> EmptyResult {
        self.record(Operation::BindQueue {
            queue: queue.to_owned(),
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        })?;
        self.inner.bind_queue(queue, exchange, routing_key).await
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &BasicProperties,
        body: &[u8],
    ) -> EmptyResult {
        self.record(Operation::Publish {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        })?;
        self.inner
            .publish(exchange, routing_key, properties, body)
            .await
    }

    async fn consume(&self, queue: &str) -> Result<Consumption, BoxedError> {
        self.record(Operation::Consume(queue.to_owned()))?;
        let consumption = self.inner.consume(queue).await?;

        if *self.end_deliveries.lock().unwrap() {
            Ok(Consumption {
                tag: consumption.tag,
                deliveries: stream::empty::<Delivery>().boxed(),
            })
        } else {
            Ok(consumption)
        }
    }

    async fn cancel(&self, tag: &ConsumerTag) -> EmptyResult {
        self.record(Operation::Cancel(tag.clone()))?;
        self.inner.cancel(tag).await
    }
}
