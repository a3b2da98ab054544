//! Serialization and deserialization provided by [`serde_json`]
//!
//! Both the message bodies and the default [`MessageContext`] are encoded as JSON. In the future,
//! this will allow for an easy exchange of serialization algorithms by swapping the types below.

use super::super::context::{MessageContext, MessageContextProvider};
use super::super::serializer::MessageSerializer;
use crate::constants::MESSAGE_CONTEXT_HEADER;
use crate::library::BoxedError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// [`MessageSerializer`] implementation based on [`serde_json`]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl MessageSerializer for JsonSerializer {
    /// Serializes the value using [`serde_json::to_vec`]
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, BoxedError> {
        serde_json::to_vec(value).map_err(Into::into)
    }

    /// Parses the bytes using [`serde_json::from_slice`]
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BoxedError> {
        serde_json::from_slice(bytes).map_err(Into::into)
    }
}

/// [`MessageContextProvider`] which attaches a JSON encoded [`MessageContext`]
#[derive(Debug, Clone)]
pub struct JsonContextProvider {
    header_name: String,
}

impl JsonContextProvider {
    /// Creates a new instance attaching the context under the given header name
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }

    /// Restores a context previously produced by this provider
    pub fn parse(bytes: &[u8]) -> Result<MessageContext, BoxedError> {
        serde_json::from_slice(bytes).map_err(Into::into)
    }
}

impl Default for JsonContextProvider {
    /// Uses the [`MESSAGE_CONTEXT_HEADER`] header name
    fn default() -> Self {
        Self::new(MESSAGE_CONTEXT_HEADER)
    }
}

#[async_trait]
impl MessageContextProvider for JsonContextProvider {
    fn header_name(&self) -> &str {
        &self.header_name
    }

    async fn context(&self, global_id: Uuid) -> Result<Vec<u8>, BoxedError> {
        let context = MessageContext {
            global_request_id: global_id,
        };

        serde_json::to_vec(&context).map_err(Into::into)
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        name: String,
        count: usize,
    }

    #[test]
    fn reject_mismatching_types() {
        let bytes = JsonSerializer.serialize("not a payload").unwrap();
        assert!(JsonSerializer.deserialize::<Payload>(&bytes).is_err());
    }

    #[tokio::test]
    async fn embed_global_id_in_context() {
        let provider = JsonContextProvider::default();
        let global_id = Uuid::new_v4();

        let blob = provider.context(global_id).await.unwrap();
        let context = JsonContextProvider::parse(&blob).unwrap();

        assert_eq!(provider.header_name(), MESSAGE_CONTEXT_HEADER);
        assert_eq!(context.global_request_id, global_id);
    }
}
