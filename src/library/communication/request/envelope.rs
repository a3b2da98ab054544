use super::super::broker::BasicProperties;
use super::super::context::MessageContextProvider;
use super::super::serializer::MessageSerializer;
use super::RequestError;
use futures::try_join;
use serde::Serialize;
use uuid::Uuid;

/// Outgoing request ready to be published
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    /// Broker-level properties including correlation id and reply address
    pub properties: BasicProperties,
    /// Serialized request payload
    pub body: Vec<u8>,
}

impl RequestEnvelope {
    /// Token the response has to carry
    pub fn correlation_id(&self) -> &str {
        self.properties.correlation_id.as_deref().unwrap_or_default()
    }
}

/// Assembles [`RequestEnvelopes`](RequestEnvelope) from typed payloads
pub struct PropertyBuilder<'a, S, P> {
    serializer: &'a S,
    context_provider: &'a P,
}

impl<'a, S, P> PropertyBuilder<'a, S, P>
where
    S: MessageSerializer + Sync,
    P: MessageContextProvider + Sync,
{
    /// Creates a new instance from raw parts
    pub fn new(serializer: &'a S, context_provider: &'a P) -> Self {
        Self {
            serializer,
            context_provider,
        }
    }

    /// Fetches the message context and serializes the payload concurrently
    ///
    /// Correlation and message id are freshly generated and independent of each other.
    pub async fn build<T>(
        &self,
        payload: &T,
        global_id: Uuid,
        reply_to: &str,
    ) -> Result<RequestEnvelope, RequestError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let context = async {
            self.context_provider
                .context(global_id)
                .await
                .map_err(RequestError::ContextFetch)
        };

        let body = async {
            self.serializer
                .serialize(payload)
                .map_err(RequestError::Serialization)
        };

        let (context, body) = try_join!(context, body)?;

        let properties = BasicProperties::default()
            .with_reply_to(reply_to)
            .with_correlation_id(Uuid::new_v4().to_string())
            .with_message_id(Uuid::new_v4().to_string())
            .with_header(self.context_provider.header_name(), context);

        Ok(RequestEnvelope { properties, body })
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::implementation::json::JsonSerializer;
    use crate::library::communication::implementation::mock::MockContextProvider;
    use pretty_assertions::assert_eq;
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refusing to serialize"))
        }
    }

    #[tokio::test]
    async fn assemble_properties() {
        let provider = MockContextProvider::returning(b"ctx");
        let builder = PropertyBuilder::new(&JsonSerializer, &provider);

        let envelope = builder
            .build(&42usize, Uuid::new_v4(), "replies")
            .await
            .unwrap();
        let properties = &envelope.properties;

        assert_eq!(envelope.body, b"42".to_vec());
        assert_eq!(properties.reply_to.as_deref(), Some("replies"));
        assert_eq!(properties.headers.get("mock_context"), Some(&b"ctx".to_vec()));
        assert_eq!(properties.headers.len(), 1);
        assert_ne!(properties.correlation_id, properties.message_id);
        assert_eq!(envelope.correlation_id().len(), 36);
    }

    #[tokio::test]
    async fn generate_fresh_ids() {
        let provider = MockContextProvider::returning(b"ctx");
        let builder = PropertyBuilder::new(&JsonSerializer, &provider);
        let global_id = Uuid::new_v4();

        let first = builder.build("a", global_id, "replies").await.unwrap();
        let second = builder.build("a", global_id, "replies").await.unwrap();

        assert_ne!(first.correlation_id(), second.correlation_id());
        assert_ne!(first.properties.message_id, second.properties.message_id);
    }

    #[tokio::test]
    async fn surface_context_failure() {
        let provider = MockContextProvider::failing();
        let builder = PropertyBuilder::new(&JsonSerializer, &provider);

        let result = builder.build("a", Uuid::new_v4(), "replies").await;

        assert!(matches!(result, Err(RequestError::ContextFetch(_))));
    }

    #[tokio::test]
    async fn surface_serialization_failure() {
        let provider = MockContextProvider::returning(b"ctx");
        let builder = PropertyBuilder::new(&JsonSerializer, &provider);

        let result = builder
            .build(&Unserializable, Uuid::new_v4(), "replies")
            .await;

        assert!(matches!(result, Err(RequestError::Serialization(_))));
    }
}
