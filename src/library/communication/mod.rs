//! Request and response on top of a publish/subscribe message broker
//!
//! A broker only knows how to route published messages through exchanges into queues and how
//! to hand them to consumers. This module builds a remote call on top of that: the
//! [`Requestor`](request::Requestor) provisions a reply queue, publishes the request with a unique
//! correlation id and resolves exactly once, either with the correlated response or with an error
//! once the request timeout expires. The serving side of the pattern is the
//! [`Responder`](request::Responder) which answers requests arriving on its own queue.
//!
//! Everything broker specific is hidden behind the [`Channel`](broker::Channel) and
//! [`ChannelFactory`](broker::ChannelFactory) traits. Implementations for an in-process broker
//! and for Redis can be found in the [`implementation`] module.

pub mod broker;
pub mod context;
pub mod implementation;
pub mod request;
pub mod serializer;
pub mod topology;
