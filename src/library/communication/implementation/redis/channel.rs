use super::super::super::broker::{
    BasicProperties, BrokerError, Channel, ChannelFactory, ConsumerTag, Consumption, Delivery,
};
use super::super::super::topology::{
    predeclared_exchanges, routes, ExchangeDescriptor, QueueDescriptor, DEFAULT_EXCHANGE,
    RESERVED_EXCHANGE_PREFIX,
};
use super::wire::{
    decode_delivery, encode_delivery, exchange_bindings_key, queue_bindings_key, queue_key,
    Binding,
};
use super::{
    RedisConnection, RedisConnectionVariant, RedisFactory, CONSUMERS_KEY,
    CONSUMER_POLL_INTERVAL, EXCHANGES_KEY, QUEUES_KEY,
};
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use redis::AsyncCommands;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

struct ConsumerEntry {
    queue: String,
    cancelled: Arc<AtomicBool>,
}

/// [`Channel`] implementation using redis
///
/// Consumers each hold a dedicated connection on which they block, all other operations share
/// a multiplexed connection.
pub struct RedisChannel<F> {
    factory: F,
    consumers: Mutex<HashMap<ConsumerTag, ConsumerEntry>>,
}

impl<F> RedisChannel<F>
where
    F: RedisFactory + Send + Sync,
{
    /// Creates a new instance from a given [`RedisFactory`]
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            consumers: Mutex::new(HashMap::new()),
        }
    }

    fn consumers(&self) -> MutexGuard<HashMap<ConsumerTag, ConsumerEntry>> {
        self.consumers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn shared(&self) -> Result<RedisConnection, BoxedError> {
        self.factory
            .connection(RedisConnectionVariant::Multiplexed)
            .await
    }

    async fn exchange(
        con: &mut RedisConnection,
        name: &str,
    ) -> Result<Option<ExchangeDescriptor>, BoxedError> {
        if let Some(predeclared) = predeclared_exchanges()
            .iter()
            .find(|exchange| exchange.name() == name)
        {
            return Ok(Some(predeclared.clone()));
        }

        let raw: Option<String> = con.hget(EXCHANGES_KEY, name).await?;

        match raw {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).map_err(|e| BrokerError::Malformed(e.into()))?,
            )),
            None => Ok(None),
        }
    }
}

async fn stored_queue(
    con: &mut RedisConnection,
    name: &str,
) -> Result<Option<QueueDescriptor>, BoxedError> {
    let raw: Option<String> = con.hget(QUEUES_KEY, name).await?;

    match raw {
        Some(raw) => Ok(Some(
            serde_json::from_str(&raw).map_err(|e| BrokerError::Malformed(e.into()))?,
        )),
        None => Ok(None),
    }
}

/// Removes the queue including its messages and bindings
#[instrument(skip(con))]
async fn delete_queue(con: &mut RedisConnection, queue: &str) -> EmptyResult {
    let bound_key = queue_bindings_key(queue);
    let bindings: Vec<String> = con.smembers(&bound_key).await?;

    for raw in bindings {
        let binding = Binding::decode(&raw)?;
        con.srem::<_, _, ()>(exchange_bindings_key(&binding.exchange), &raw)
            .await?;
    }

    con.del::<_, ()>(vec![bound_key, queue_key(queue)]).await?;
    con.hdel::<_, _, ()>(QUEUES_KEY, queue).await?;
    debug!("Deleted auto-delete queue");

    Ok(())
}

/// Marks a consumer as stopped, returns `true` only for the first caller
fn stop(cancelled: &AtomicBool) -> bool {
    !cancelled.swap(true, Ordering::SeqCst)
}

/// Drops one consumer from the queue's count and deletes auto-delete queues left without any
async fn release_consumer(con: &mut RedisConnection, queue: &str) -> EmptyResult {
    let remaining: i64 = con.hincr(CONSUMERS_KEY, queue, -1).await?;

    if remaining <= 0 {
        con.hdel::<_, _, ()>(CONSUMERS_KEY, queue).await?;

        if let Some(descriptor) = stored_queue(con, queue).await? {
            if descriptor.is_auto_delete() {
                delete_queue(con, queue).await?;
            }
        }
    }

    Ok(())
}

/// Pops messages off the queue and forwards them until the consumer is cancelled or dropped
async fn forward(
    mut con: RedisConnection,
    queue: String,
    cancelled: Arc<AtomicBool>,
    tx: UnboundedSender<Delivery>,
) {
    let key = queue_key(&queue);

    while !cancelled.load(Ordering::SeqCst) && !tx.is_closed() {
        let popped: Option<(String, Vec<u8>)> = match con.blpop(&key, CONSUMER_POLL_INTERVAL).await
        {
            Ok(popped) => popped,
            Err(e) => {
                warn!(%queue, "Failed to pop from queue: {}", e);
                break;
            }
        };

        let raw = match popped {
            Some((_, raw)) => raw,
            None => continue,
        };

        // Messages popped after cancellation belong to the remaining consumers
        if cancelled.load(Ordering::SeqCst) || tx.is_closed() {
            if let Err(e) = con.lpush::<_, _, ()>(&key, raw).await {
                warn!(%queue, "Failed to return message to queue: {}", e);
            }
            break;
        }

        match decode_delivery(&raw) {
            Ok(delivery) => {
                trace!(%queue, correlation_id = ?delivery.properties.correlation_id, "Delivering message");
                tx.unbounded_send(delivery).ok();
            }
            Err(e) => warn!(%queue, "Dropping malformed message: {}", e),
        }
    }

    // Not cancelled through the channel, so nobody else releases the consumer
    if stop(&cancelled) {
        match release_consumer(&mut con, &queue).await {
            Ok(()) => debug!(%queue, "Released abandoned consumer"),
            Err(e) => warn!(%queue, "Failed to release abandoned consumer: {}", e),
        }
    }
}

#[async_trait]
impl<F> Channel for RedisChannel<F>
where
    F: RedisFactory + Send + Sync,
{
    async fn declare_queue(&self, queue: &QueueDescriptor) -> EmptyResult {
        let mut con = self.shared().await?;
        let encoded = serde_json::to_string(queue)?;

        let created: bool = con.hset_nx(QUEUES_KEY, queue.name(), &encoded).await?;

        if !created {
            match stored_queue(&mut con, queue.name()).await? {
                Some(existing) if existing == *queue => {}
                _ => return Err(BrokerError::PreconditionFailed(queue.name().to_owned()).into()),
            }
        }

        Ok(())
    }

    async fn declare_exchange(&self, exchange: &ExchangeDescriptor) -> EmptyResult {
        let name = exchange.name();

        if name == DEFAULT_EXCHANGE {
            return Err(BrokerError::AccessRefused(name.to_owned()).into());
        }

        if name.starts_with(RESERVED_EXCHANGE_PREFIX) {
            return match predeclared_exchanges()
                .iter()
                .any(|predeclared| predeclared.is_equivalent(exchange))
            {
                true => Ok(()),
                false => Err(BrokerError::AccessRefused(name.to_owned()).into()),
            };
        }

        let mut con = self.shared().await?;
        let encoded = serde_json::to_string(exchange)?;

        let created: bool = con.hset_nx(EXCHANGES_KEY, name, &encoded).await?;

        if !created {
            match Self::exchange(&mut con, name).await? {
                Some(existing) if existing.is_equivalent(exchange) => {}
                _ => return Err(BrokerError::PreconditionFailed(name.to_owned()).into()),
            }
        }

        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> EmptyResult {
        if exchange == DEFAULT_EXCHANGE {
            return Err(BrokerError::AccessRefused(exchange.to_owned()).into());
        }

        let mut con = self.shared().await?;

        if stored_queue(&mut con, queue).await?.is_none() {
            return Err(BrokerError::QueueNotFound(queue.to_owned()).into());
        }

        if Self::exchange(&mut con, exchange).await?.is_none() {
            return Err(BrokerError::ExchangeNotFound(exchange.to_owned()).into());
        }

        let binding = Binding {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            queue: queue.to_owned(),
        }
        .encode()?;

        con.sadd::<_, _, ()>(exchange_bindings_key(exchange), &binding)
            .await?;
        con.sadd::<_, _, ()>(queue_bindings_key(queue), &binding)
            .await?;

        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &BasicProperties,
        body: &[u8],
    ) -> EmptyResult {
        let mut con = self.shared().await?;

        let targets: BTreeSet<String> = if exchange == DEFAULT_EXCHANGE {
            let exists: bool = con.hexists(QUEUES_KEY, routing_key).await?;
            exists
                .then(|| routing_key.to_owned())
                .into_iter()
                .collect()
        } else {
            let descriptor = Self::exchange(&mut con, exchange)
                .await?
                .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_owned()))?;
            let bindings: Vec<String> = con.smembers(exchange_bindings_key(exchange)).await?;

            let mut targets = BTreeSet::new();
            for raw in bindings {
                let binding = Binding::decode(&raw)?;

                if routes(descriptor.kind(), &binding.routing_key, routing_key) {
                    targets.insert(binding.queue);
                }
            }
            targets
        };

        let delivery = Delivery {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            properties: properties.clone(),
            body: body.to_vec(),
        };
        let encoded = encode_delivery(&delivery)?;

        for queue in targets.iter() {
            con.rpush::<_, _, ()>(queue_key(queue), encoded.as_slice())
                .await?;
        }

        trace!(exchange, routing_key, queues = targets.len(), "Published message");

        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Consumption, BoxedError> {
        let mut shared = self.shared().await?;

        if stored_queue(&mut shared, queue).await?.is_none() {
            return Err(BrokerError::QueueNotFound(queue.to_owned()).into());
        }

        let con = self.factory.connection(RedisConnectionVariant::Owned).await?;
        shared.hincr::<_, _, _, ()>(CONSUMERS_KEY, queue, 1).await?;

        let tag: ConsumerTag = format!("ctag-{}", Uuid::new_v4().to_simple());
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded();

        self.consumers().insert(
            tag.clone(),
            ConsumerEntry {
                queue: queue.to_owned(),
                cancelled: cancelled.clone(),
            },
        );

        tokio::spawn(forward(con, queue.to_owned(), cancelled, tx));
        debug!(%queue, consumer = %tag, "Started consumer");

        Ok(Consumption {
            tag,
            deliveries: rx.boxed(),
        })
    }

    async fn cancel(&self, tag: &ConsumerTag) -> EmptyResult {
        let entry = match self.consumers().remove(tag) {
            Some(entry) => entry,
            None => return Ok(()),
        };

        // The consumer's stream has been dropped before and was released already
        if !stop(&entry.cancelled) {
            return Ok(());
        }

        let mut con = self.shared().await?;
        release_consumer(&mut con, &entry.queue).await?;

        debug!(queue = %entry.queue, consumer = %tag, "Cancelled consumer");

        Ok(())
    }
}

/// [`ChannelFactory`] handing out a single shared [`RedisChannel`]
pub struct RedisChannelFactory<F> {
    channel: Arc<RedisChannel<F>>,
}

impl<F> RedisChannelFactory<F>
where
    F: RedisFactory + Send + Sync,
{
    /// Creates a new instance from a given [`RedisFactory`]
    pub fn new(factory: F) -> Self {
        Self {
            channel: Arc::new(RedisChannel::new(factory)),
        }
    }
}

impl<F> Clone for RedisChannelFactory<F> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

#[async_trait]
impl<F> ChannelFactory for RedisChannelFactory<F>
where
    F: RedisFactory + Send + Sync + 'static,
{
    type Channel = RedisChannel<F>;

    async fn channel(&self) -> Result<Arc<Self::Channel>, BoxedError> {
        Ok(self.channel.clone())
    }
}
