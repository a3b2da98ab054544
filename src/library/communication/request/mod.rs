//! Request/reply on top of the message broker
//!
//! A request is published to an exchange and carries a reply address and a correlation id.
//! The [`BrokerRequestor`] waits on the reply queue for a message with the same correlation id
//! or gives up once the configured timeout has passed. [`Responders`](Responder) sit on the
//! other end and answer requests.

mod configuration;
mod envelope;
mod future;
mod pending;
mod requestor;
mod responder;

pub use configuration::*;
pub use envelope::*;
pub use future::CallFuture;
pub use pending::{CallOutcome, CallState};
pub use requestor::*;
pub use responder::*;
