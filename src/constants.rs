//! Default values and naming conventions

use std::time::Duration;

/// Timeout applied to requests when nothing else has been configured
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Header under which the message context is attached to outgoing requests
pub const MESSAGE_CONTEXT_HEADER: &str = "message_context";

/// Exchange used by [`RequestConfigurationBuilder`](crate::library::communication::request::RequestConfigurationBuilder) if none is provided
pub const DEFAULT_RPC_EXCHANGE: &str = "default_rpc_exchange";

/// Prefix of generated reply queue names
pub const DEFAULT_REPLY_QUEUE_PREFIX: &str = "default_rpc_response";

/// Maximum number of requests a [`Responder`](crate::library::communication::request::Responder) processes simultaneously
pub const DEFAULT_RESPONDER_CONCURRENCY: usize = 10;
