//! Broker implementation using [`redis`](::redis)
//!
//! Queues are modelled as [Redis Lists](https://redis.io/topics/data-types#lists) which are fed
//! using [`RPUSH`](https://redis.io/commands/rpush) and drained by consumers using
//! [`BLPOP`](https://redis.io/commands/blpop). Declarations and bindings are stored alongside
//! so that every process connected to the same database shares one topology.

const QUEUE_KEY_PREFIX: &str = "rpc.queue.";
const QUEUES_KEY: &str = "rpc.queues";
const EXCHANGES_KEY: &str = "rpc.exchanges";
const CONSUMERS_KEY: &str = "rpc.consumers";
const EXCHANGE_BINDINGS_KEY_PREFIX: &str = "rpc.bindings.";
const QUEUE_BINDINGS_KEY_PREFIX: &str = "rpc.bound.";

/// Seconds a consumer blocks before checking whether it has been cancelled
const CONSUMER_POLL_INTERVAL: usize = 1;

mod channel;
mod connection;
mod factory;
mod wire;

pub use channel::*;
pub use connection::*;
pub use factory::*;
