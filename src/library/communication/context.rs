//! Contextual information attached to outgoing messages
//!
//! When a request is sent, the caller supplies a global id identifying the overall operation it
//! is part of. A [`MessageContextProvider`] turns this id into an opaque blob which travels along
//! with the message in a header so that the serving side may continue the operation (e.g. for
//! tracing purposes). The requestor never looks into the blob.

use crate::library::BoxedError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default context which carries the id of the operation a message belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContext {
    /// Id shared by all messages of one logical operation
    pub global_request_id: Uuid,
}

/// Source of the context blob attached to outgoing messages
#[async_trait]
pub trait MessageContextProvider {
    /// Name of the header under which the context is attached
    fn header_name(&self) -> &str;

    /// Produces the context for the operation identified by the given id
    async fn context(&self, global_id: Uuid) -> Result<Vec<u8>, BoxedError>;
}
