use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Name of the default exchange which routes directly to the queue named by the routing key
pub const DEFAULT_EXCHANGE: &str = "";

/// Prefix reserved for exchanges predeclared by the broker
pub const RESERVED_EXCHANGE_PREFIX: &str = "amq.";

/// Exchanges provided by every broker without being declared
pub fn predeclared_exchanges() -> [ExchangeDescriptor; 3] {
    [
        ExchangeDescriptor::direct("amq.direct"),
        ExchangeDescriptor::topic("amq.topic"),
        ExchangeDescriptor::fanout("amq.fanout"),
    ]
}

/// Describes a queue and the parameters it is declared with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueDescriptor {
    name: String,
    durable: bool,
    exclusive: bool,
    auto_delete: bool,
}

impl QueueDescriptor {
    /// Creates a new instance from raw parts
    pub fn new(name: impl Into<String>, durable: bool, exclusive: bool, auto_delete: bool) -> Self {
        Self {
            name: name.into(),
            durable,
            exclusive,
            auto_delete,
        }
    }

    /// Short-lived queue which is removed once its last consumer has been cancelled
    pub fn ephemeral(name: impl Into<String>) -> Self {
        Self::new(name, false, true, true)
    }

    /// Durable queue which outlives its consumers
    pub fn durable(name: impl Into<String>) -> Self {
        Self::new(name, true, false, false)
    }

    /// Name by which the queue is addressed
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the queue survives a broker restart
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Whether the queue is meant to be used by a single connection only
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Whether the queue is deleted when its last consumer is cancelled
    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }
}

/// Routing algorithm of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeKind {
    /// Routes to queues whose binding key equals the routing key
    Direct,
    /// Routes by matching dot-separated binding patterns
    Topic,
    /// Routes to all bound queues
    Fanout,
    /// Routes by header values (treated like [`Fanout`](ExchangeKind::Fanout))
    Headers,
}

impl Display for ExchangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Topic => write!(f, "topic"),
            Self::Fanout => write!(f, "fanout"),
            Self::Headers => write!(f, "headers"),
        }
    }
}

/// Describes an exchange and the parameters it is declared with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeDescriptor {
    name: String,
    kind: ExchangeKind,
    durable: bool,
    auto_delete: bool,
    #[serde(skip)]
    assume_initialized: bool,
}

impl ExchangeDescriptor {
    /// Creates a new instance from raw parts
    pub fn new(name: impl Into<String>, kind: ExchangeKind, durable: bool, auto_delete: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            durable,
            auto_delete,
            assume_initialized: false,
        }
    }

    /// Durable direct exchange
    pub fn direct(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Direct, true, false)
    }

    /// Durable topic exchange
    pub fn topic(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Topic, true, false)
    }

    /// Durable fanout exchange
    pub fn fanout(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Fanout, true, false)
    }

    /// The nameless default exchange
    pub fn default_exchange() -> Self {
        Self::direct(DEFAULT_EXCHANGE)
    }

    /// Marks the exchange as already existing so that it will not be declared
    pub fn assume_initialized(mut self) -> Self {
        self.assume_initialized = true;
        self
    }

    /// Name by which the exchange is addressed
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routing algorithm
    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    /// Whether the exchange survives a broker restart
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Whether the exchange is deleted once no queue is bound to it
    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    /// Whether this is the nameless default exchange
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_EXCHANGE
    }

    /// Whether declaring this exchange should be skipped
    ///
    /// True for the default exchange, broker-reserved exchanges and those marked as [initialized](ExchangeDescriptor::assume_initialized).
    pub fn is_predeclared(&self) -> bool {
        self.assume_initialized
            || self.is_default()
            || self.name.starts_with(RESERVED_EXCHANGE_PREFIX)
    }

    /// Compares the declaration parameters, ignoring the client-side initialization marker
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.durable == other.durable
            && self.auto_delete == other.auto_delete
    }
}
