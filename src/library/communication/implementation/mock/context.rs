use crate::library::communication::context::MessageContextProvider;
use crate::library::BoxedError;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Error returned by a failing [`MockContextProvider`]
#[derive(Debug, Error)]
#[error("context unavailable")]
pub struct MockContextError;

/// Context provider returning a fixed blob or failing on demand
pub struct MockContextProvider {
    blob: Option<Vec<u8>>,
}

impl MockContextProvider {
    /// Provider handing out the given context
    pub fn returning(blob: &[u8]) -> Self {
        Self {
            blob: Some(blob.to_vec()),
        }
    }

    /// Provider which fails every time
    pub fn failing() -> Self {
        Self { blob: None }
    }
}

#[async_trait]
impl MessageContextProvider for MockContextProvider {
    fn header_name(&self) -> &str {
        "mock_context"
    }

    async fn context(&self, _global_id: Uuid) -> Result<Vec<u8>, BoxedError> {
        self.blob.clone().ok_or_else(|| MockContextError.into())
    }
}
