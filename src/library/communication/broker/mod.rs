//! Primitives of the underlying message broker
//!
//! The traits in this module are the only point of contact between the request/response logic
//! and a concrete broker. They mirror the handful of operations every AMQP-like broker offers:
//! declaring queues and exchanges, binding them together, publishing and consuming messages.

mod properties;

pub use properties::*;

use super::topology::{ExchangeDescriptor, QueueDescriptor};
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Identifier of an active consumer, used to cancel it
pub type ConsumerTag = String;

/// Message handed to a consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Exchange the message has been published to
    pub exchange: String,
    /// Routing key used when publishing
    pub routing_key: String,
    /// Envelope of the message
    pub properties: BasicProperties,
    /// Opaque payload
    pub body: Vec<u8>,
}

/// Active consumer on a queue
///
/// Deliveries are acknowledged automatically, a message is considered consumed the moment it is
/// yielded by the stream. The stream ends once the consumer has been cancelled.
pub struct Consumption {
    /// Tag which may be passed to [`Channel::cancel`]
    pub tag: ConsumerTag,
    /// Messages delivered to the consumer
    pub deliveries: BoxStream<'static, Delivery>,
}

/// Errors raised by broker implementations
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Referenced queue has not been declared
    #[error("queue '{0}' does not exist")]
    QueueNotFound(String),
    /// Referenced exchange has not been declared
    #[error("exchange '{0}' does not exist")]
    ExchangeNotFound(String),
    /// Entity exists with different parameters
    #[error("'{0}' has already been declared with different parameters")]
    PreconditionFailed(String),
    /// Operation is not permitted on the default or a predeclared exchange
    #[error("access to exchange '{0}' is refused")]
    AccessRefused(String),
    /// Stored data could not be interpreted
    #[error("encountered malformed broker data")]
    Malformed(#[source] BoxedError),
}

/// Session on a broker connection
///
/// Channels may be shared by multiple concurrent users, thus all operations take `&self`.
#[async_trait]
pub trait Channel {
    /// Declares a queue, succeeding without side effects if it already exists with the same parameters
    async fn declare_queue(&self, queue: &QueueDescriptor) -> EmptyResult;

    /// Declares an exchange, succeeding without side effects if it already exists with the same parameters
    async fn declare_exchange(&self, exchange: &ExchangeDescriptor) -> EmptyResult;

    /// Binds a queue to an exchange. Binding the same pair with the same key twice is a no-op.
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> EmptyResult;

    /// Publishes a message to an exchange
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &BasicProperties,
        body: &[u8],
    ) -> EmptyResult;

    /// Starts consuming a queue in auto-acknowledge mode
    ///
    /// Once this returns, the consumer is registered and will receive every message routed to the queue.
    async fn consume(&self, queue: &str) -> Result<Consumption, BoxedError>;

    /// Cancels a consumer. Cancelling an unknown or already cancelled consumer succeeds.
    async fn cancel(&self, tag: &ConsumerTag) -> EmptyResult;
}

/// Provider of [`Channels`](Channel)
///
/// Responsible for the connection lifecycle. Returned channels may be shared between callers.
#[async_trait]
pub trait ChannelFactory {
    /// [`Channel`] implementation type
    type Channel: Channel + Send + Sync + 'static;

    /// Retrieves a usable channel
    async fn channel(&self) -> Result<Arc<Self::Channel>, BoxedError>;
}

#[async_trait]
impl<F> ChannelFactory for Arc<F>
where
    F: ChannelFactory + Send + Sync,
{
    type Channel = F::Channel;

    async fn channel(&self) -> Result<Arc<Self::Channel>, BoxedError> {
        (**self).channel().await
    }
}
