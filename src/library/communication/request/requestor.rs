use super::super::broker::{Channel, ChannelFactory};
use super::super::context::MessageContextProvider;
use super::super::serializer::MessageSerializer;
use super::super::topology::{TopologyError, TopologyProvisioner};
use super::pending::{CallState, ConsumerHandle, PendingCall, ReplyQueueRegistry};
use super::{CallFuture, PropertyBuilder, RequestConfiguration, RequestEnvelope};
use crate::library::BoxedError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Error type for sending requests
///
/// All variants are terminal for the individual request only.
#[derive(Error, Debug)]
pub enum RequestError {
    /// Reply queue or exchange could not be prepared, nothing has been sent
    #[error("preparing the request topology failed")]
    Topology(#[source] TopologyError),
    /// The message context could not be obtained, nothing has been sent
    #[error("fetching the message context failed")]
    ContextFetch(#[source] BoxedError),
    /// The request payload could not be serialized, nothing has been sent
    #[error("serializing the request failed")]
    Serialization(#[source] BoxedError),
    /// The broker channel failed or the reply consumer stopped unexpectedly
    #[error("broker channel failed")]
    Channel(#[source] BoxedError),
    /// The broker rejected the request
    #[error("publishing the request failed")]
    Publish(#[source] BoxedError),
    /// No correlated response arrived in time
    #[error("no response received within {0:?}")]
    Timeout(Duration),
    /// A correlated response arrived but could not be decoded
    #[error("response could not be decoded")]
    ResponseDeserialization(#[source] BoxedError),
    /// The request has been cancelled before a response arrived
    #[error("request has been cancelled")]
    Cancelled,
    /// Another outstanding request is already waiting on the reply queue
    #[error("reply queue '{0}' is already awaited by another request")]
    ReplyQueueInUse(String),
    /// The request has been dropped without being resolved
    #[error("request was abandoned before it resolved")]
    Abandoned,
}

/// Handler for sending requests and awaiting their response
#[async_trait]
pub trait Requestor {
    /// Sends out a request and awaits the correlated response
    ///
    /// The `global_id` identifies the overall operation the request is part of and is passed
    /// on through the message context. Requests are never retried, to do so invoke this method again.
    async fn request<Req, Res>(
        &self,
        request: &Req,
        global_id: Uuid,
        config: &RequestConfiguration,
    ) -> Result<Res, RequestError>
    where
        Req: Serialize + Send + Sync,
        Res: DeserializeOwned + Send + 'static;
}

/// [`Requestor`] implementation on top of a [`ChannelFactory`]
///
/// Every request provisions its topology, opens a consumer on the reply queue, arms a timer and
/// then publishes the request. Whichever comes first, the correlated response or the timer, resolves
/// the request. The other one is cancelled.
pub struct BrokerRequestor<F, S, P> {
    factory: Arc<F>,
    provisioner: TopologyProvisioner<Arc<F>>,
    serializer: Arc<S>,
    context_provider: P,
    request_timeout: Duration,
    reply_queues: ReplyQueueRegistry,
}

impl<F, S, P> BrokerRequestor<F, S, P>
where
    F: ChannelFactory + Send + Sync,
    S: MessageSerializer + Send + Sync + 'static,
    P: MessageContextProvider + Send + Sync,
{
    /// Creates a new instance from raw parts
    ///
    /// The timeout applies to every request sent through this instance.
    pub fn new(factory: F, serializer: S, context_provider: P, request_timeout: Duration) -> Self {
        let factory = Arc::new(factory);

        Self {
            provisioner: TopologyProvisioner::new(factory.clone()),
            factory,
            serializer: Arc::new(serializer),
            context_provider,
            request_timeout,
            reply_queues: ReplyQueueRegistry::default(),
        }
    }

    /// Duration after which requests fail with [`RequestError::Timeout`]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Sends out a request and returns a handle to its response
    ///
    /// Returns once the request has been published. Errors occurring before that point are
    /// returned directly and leave no consumer or timer behind.
    #[instrument(skip(self, request, config), fields(exchange = config.exchange.name(), routing_key = %config.routing_key))]
    pub async fn begin<Req, Res>(
        &self,
        request: &Req,
        global_id: Uuid,
        config: &RequestConfiguration,
    ) -> Result<CallFuture<Res>, RequestError>
    where
        Req: Serialize + Sync + ?Sized,
        Res: DeserializeOwned + Send + 'static,
    {
        self.provisioner
            .ensure(
                &config.reply_queue,
                &config.exchange,
                &config.reply_queue_routing_key,
            )
            .await
            .map_err(RequestError::Topology)?;

        let envelope = PropertyBuilder::new(self.serializer.as_ref(), &self.context_provider)
            .build(request, global_id, config.reply_queue.name())
            .await?;

        self.send(envelope, config).await
    }

    async fn send<Res>(
        &self,
        envelope: RequestEnvelope,
        config: &RequestConfiguration,
    ) -> Result<CallFuture<Res>, RequestError>
    where
        Res: DeserializeOwned + Send + 'static,
    {
        let reply_queue = config.reply_queue.name();
        let lease = self
            .reply_queues
            .lease(reply_queue)
            .ok_or_else(|| RequestError::ReplyQueueInUse(reply_queue.to_owned()))?;

        let channel = self
            .factory
            .channel()
            .await
            .map_err(RequestError::Channel)?;

        // The consumer has to be active before publishing so that no early response is missed
        let consumption = channel
            .consume(reply_queue)
            .await
            .map_err(RequestError::Channel)?;

        let consumer = ConsumerHandle::new(channel.clone(), consumption.tag);
        let (call, receiver) = PendingCall::<F::Channel, Res>::new(
            envelope.correlation_id().to_owned(),
            consumer,
            lease,
        );

        call.listen(consumption.deliveries, self.serializer.clone());

        // Lets a reply stream which ended right away resolve the call before anything is sent
        tokio::task::yield_now().await;

        if call.is_resolved() {
            debug!(correlation_id = envelope.correlation_id(), "Request resolved before publishing");
            return Ok(CallFuture::new(receiver, call));
        }

        call.arm_timer(self.request_timeout);
        call.transition(CallState::Publishing);

        let published = channel
            .publish(
                config.exchange.name(),
                &config.routing_key,
                &envelope.properties,
                &envelope.body,
            )
            .await;

        match published {
            Ok(()) => {
                call.transition(CallState::Waiting);
                debug!(correlation_id = envelope.correlation_id(), "Request published");
            }
            Err(e) => {
                if call.withdraw().await {
                    return Err(RequestError::Publish(e));
                }
            }
        }

        Ok(CallFuture::new(receiver, call))
    }
}

#[async_trait]
impl<F, S, P> Requestor for BrokerRequestor<F, S, P>
where
    F: ChannelFactory + Send + Sync,
    S: MessageSerializer + Send + Sync + 'static,
    P: MessageContextProvider + Send + Sync,
{
    async fn request<Req, Res>(
        &self,
        request: &Req,
        global_id: Uuid,
        config: &RequestConfiguration,
    ) -> Result<Res, RequestError>
    where
        Req: Serialize + Send + Sync,
        Res: DeserializeOwned + Send + 'static,
    {
        self.begin(request, global_id, config).await?.await
    }
}
