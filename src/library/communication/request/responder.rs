use super::super::broker::{BasicProperties, Channel, ChannelFactory, Delivery};
use super::super::serializer::MessageSerializer;
use super::super::topology::{
    ExchangeDescriptor, QueueDescriptor, TopologyProvisioner, DEFAULT_EXCHANGE,
};
use crate::constants::DEFAULT_RESPONDER_CONCURRENCY;
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Error that may be thrown while responding to a request
#[derive(Error, Debug)]
pub enum ResponderError {
    /// The request carries no address to send the response to
    #[error("request has no reply address")]
    MissingReplyAddress,
    /// The request carries no correlation id to echo
    #[error("request has no correlation id")]
    MissingCorrelationId,
    /// The request payload could not be decoded
    #[error("request could not be decoded")]
    MalformedRequest(#[source] BoxedError),
    /// The [`RequestProcessor`] threw an error
    #[error("processing request failed")]
    ProcessingFailed(#[source] BoxedError),
    /// The response could not be serialized
    #[error("serializing response failed")]
    MalformedResponse(#[source] BoxedError),
    /// Unable to deliver the response
    #[error("sending response failed")]
    ResponseUndeliverable(#[source] BoxedError),
}

/// Structure which processes requests and produces responses
#[async_trait]
pub trait RequestProcessor {
    /// Type of request to process
    type Request: DeserializeOwned;
    /// Type of response produced
    type Response: Serialize;

    /// Handler for requests, returning a response
    async fn process(&self, request: Self::Request) -> Result<Self::Response, BoxedError>;
}

/// Location at which a [`Responder`] receives requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderConfiguration {
    /// Queue the requests are consumed from
    pub queue: QueueDescriptor,
    /// Exchange the requests are published to
    pub exchange: ExchangeDescriptor,
    /// Key with which the queue is bound to the exchange
    pub routing_key: String,
}

impl ResponderConfiguration {
    /// Creates a new instance from raw parts
    pub fn new(
        queue: QueueDescriptor,
        exchange: ExchangeDescriptor,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            exchange,
            routing_key: routing_key.into(),
        }
    }
}

/// Convenience wrapper to process requests and send responses
///
/// Responses are published to the default exchange using the reply address of the request as
/// routing key and carry the correlation id of the request.
pub struct Responder<F, S, P> {
    factory: F,
    provisioner: TopologyProvisioner<F>,
    serializer: S,
    processor: P,
}

impl<F, S, P> Responder<F, S, P>
where
    F: ChannelFactory + Clone + Send + Sync,
    S: MessageSerializer + Send + Sync,
    P: RequestProcessor + Send + Sync,
    P::Request: Send,
    P::Response: Send + Sync,
{
    /// Creates a new responder from raw parts
    pub fn new(factory: F, serializer: S, processor: P) -> Self {
        Self {
            provisioner: TopologyProvisioner::new(factory.clone()),
            factory,
            serializer,
            processor,
        }
    }

    /// Processes requests arriving at the configured queue until its consumer is cancelled
    ///
    /// Requests which can not be answered are logged and dropped.
    #[instrument(skip(self, config), fields(queue = config.queue.name()))]
    pub async fn serve(&self, config: &ResponderConfiguration) -> EmptyResult {
        self.provisioner
            .ensure(&config.queue, &config.exchange, &config.routing_key)
            .await?;

        let channel = self.factory.channel().await?;
        let consumption = channel.consume(config.queue.name()).await?;
        debug!(consumer = %consumption.tag, "Serving requests");

        let channel = channel.as_ref();
        consumption
            .deliveries
            .for_each_concurrent(Some(DEFAULT_RESPONDER_CONCURRENCY), |delivery| async move {
                let correlation_id = delivery.properties.correlation_id.clone();

                if let Err(e) = self.respond(channel, delivery).await {
                    warn!(?correlation_id, "Failed to respond to request: {}", e);
                }
            })
            .await;

        Ok(())
    }

    /// Answers a single request
    pub async fn respond<C>(&self, channel: &C, delivery: Delivery) -> Result<(), ResponderError>
    where
        C: Channel + Sync,
    {
        let properties = &delivery.properties;
        let reply_to = properties
            .reply_to
            .as_deref()
            .ok_or(ResponderError::MissingReplyAddress)?;
        let correlation_id = properties
            .correlation_id
            .as_deref()
            .ok_or(ResponderError::MissingCorrelationId)?;

        let request = self
            .serializer
            .deserialize::<P::Request>(&delivery.body)
            .map_err(ResponderError::MalformedRequest)?;

        let response = self
            .processor
            .process(request)
            .await
            .map_err(ResponderError::ProcessingFailed)?;

        let body = self
            .serializer
            .serialize(&response)
            .map_err(ResponderError::MalformedResponse)?;

        let properties = BasicProperties::default()
            .with_correlation_id(correlation_id)
            .with_message_id(Uuid::new_v4().to_string());

        channel
            .publish(DEFAULT_EXCHANGE, reply_to, &properties, &body)
            .await
            .map_err(ResponderError::ResponseUndeliverable)
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::implementation::json::{
        JsonContextProvider, JsonSerializer,
    };
    use crate::library::communication::implementation::memory::MemoryBroker;
    use crate::library::communication::request::{
        BrokerRequestor, RequestConfiguration, Requestor,
    };
    use pretty_assertions::assert_eq;
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    const EXCHANGE: &str = "math";
    const ROUTING_KEY: &str = "double";

    struct Doubler;

    #[async_trait]
    impl RequestProcessor for Doubler {
        type Request = usize;
        type Response = usize;

        async fn process(&self, request: usize) -> Result<usize, BoxedError> {
            if request == 0 {
                Err(io::Error::new(io::ErrorKind::Other, "zero").into())
            } else {
                Ok(request * 2)
            }
        }
    }

    fn responder(broker: &MemoryBroker) -> Responder<MemoryBroker, JsonSerializer, Doubler> {
        Responder::new(broker.clone(), JsonSerializer, Doubler)
    }

    fn configuration() -> ResponderConfiguration {
        ResponderConfiguration::new(
            QueueDescriptor::durable(ROUTING_KEY),
            ExchangeDescriptor::direct(EXCHANGE),
            ROUTING_KEY,
        )
    }

    async fn replies(broker: &MemoryBroker) -> futures::stream::BoxStream<'static, Delivery> {
        let channel = broker.connect();
        channel
            .declare_queue(&QueueDescriptor::ephemeral("replies"))
            .await
            .unwrap();
        channel.consume("replies").await.unwrap().deliveries
    }

    fn request(body: &[u8]) -> Delivery {
        Delivery {
            exchange: EXCHANGE.into(),
            routing_key: ROUTING_KEY.into(),
            properties: BasicProperties::default()
                .with_reply_to("replies")
                .with_correlation_id("abc")
                .with_message_id("request-message"),
            body: body.to_vec(),
        }
    }

    #[tokio::test]
    async fn echo_correlation_id() {
        let broker = MemoryBroker::new();
        let mut replies = replies(&broker).await;

        responder(&broker)
            .respond(broker.connect().as_ref(), request(b"21"))
            .await
            .unwrap();

        let reply = replies.next().await.unwrap();
        assert_eq!(reply.body, b"42".to_vec());
        assert_eq!(reply.properties.correlation_id.as_deref(), Some("abc"));
        assert!(reply.properties.message_id.is_some());
        assert_ne!(
            reply.properties.message_id.as_deref(),
            Some("request-message")
        );
    }

    #[tokio::test]
    async fn refuse_requests_without_reply_address() {
        let broker = MemoryBroker::new();
        let mut delivery = request(b"21");
        delivery.properties.reply_to = None;

        let result = responder(&broker)
            .respond(broker.connect().as_ref(), delivery)
            .await;

        assert!(matches!(result, Err(ResponderError::MissingReplyAddress)));
    }

    #[tokio::test]
    async fn refuse_requests_without_correlation_id() {
        let broker = MemoryBroker::new();
        let mut delivery = request(b"21");
        delivery.properties.correlation_id = None;

        let result = responder(&broker)
            .respond(broker.connect().as_ref(), delivery)
            .await;

        assert!(matches!(result, Err(ResponderError::MissingCorrelationId)));
    }

    #[tokio::test]
    async fn not_respond_to_failed_requests() {
        let broker = MemoryBroker::new();
        let _replies = replies(&broker).await;
        let responder = responder(&broker);
        let channel = broker.connect();

        let malformed = responder.respond(channel.as_ref(), request(b"\"text\"")).await;
        let failed = responder.respond(channel.as_ref(), request(b"0")).await;

        assert!(matches!(malformed, Err(ResponderError::MalformedRequest(_))));
        assert!(matches!(failed, Err(ResponderError::ProcessingFailed(_))));
        assert_eq!(broker.queued_messages("replies"), 0);
    }

    #[tokio::test]
    async fn serve_requestors() {
        let broker = MemoryBroker::new();
        let responder = Arc::new(responder(&broker));

        let server = {
            let responder = responder.clone();
            tokio::spawn(async move { responder.serve(&configuration()).await.unwrap() })
        };

        while broker.consumer_count(ROUTING_KEY) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let requestor = BrokerRequestor::new(
            broker.clone(),
            JsonSerializer,
            JsonContextProvider::default(),
            Duration::from_secs(2),
        );
        let config = || {
            RequestConfiguration::builder(ROUTING_KEY)
                .exchange(ExchangeDescriptor::direct(EXCHANGE))
                .build()
        };
        let (first_config, second_config) = (config(), config());

        let (first, second) = futures::join!(
            requestor.request::<_, usize>(&1usize, Uuid::new_v4(), &first_config),
            requestor.request::<_, usize>(&5usize, Uuid::new_v4(), &second_config),
        );

        assert_eq!(first.unwrap(), 2);
        assert_eq!(second.unwrap(), 10);

        server.abort();
    }
}
