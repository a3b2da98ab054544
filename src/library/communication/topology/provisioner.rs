use super::{ExchangeDescriptor, QueueDescriptor};
use crate::library::communication::broker::{Channel, ChannelFactory};
use crate::library::BoxedError;
use futures::try_join;
use thiserror::Error;
use tracing::{debug, instrument, trace};

/// Error type for preparing the broker-side topology
#[derive(Error, Debug)]
pub enum TopologyError {
    /// No channel could be obtained
    #[error("unable to obtain channel for topology declaration")]
    Channel(#[source] BoxedError),
    /// Declaring the queue failed
    #[error("declaration of queue '{queue}' failed")]
    QueueDeclaration {
        /// Name of the queue
        queue: String,
        /// Underlying broker error
        #[source]
        source: BoxedError,
    },
    /// Declaring the exchange failed
    #[error("declaration of exchange '{exchange}' failed")]
    ExchangeDeclaration {
        /// Name of the exchange
        exchange: String,
        /// Underlying broker error
        #[source]
        source: BoxedError,
    },
    /// Binding the queue to the exchange failed
    #[error("binding queue '{queue}' to exchange '{exchange}' failed")]
    Binding {
        /// Name of the queue
        queue: String,
        /// Name of the exchange
        exchange: String,
        /// Underlying broker error
        #[source]
        source: BoxedError,
    },
}

/// Ensures that a queue and an exchange exist and are bound together
pub struct TopologyProvisioner<F> {
    factory: F,
}

impl<F> TopologyProvisioner<F>
where
    F: ChannelFactory + Send + Sync,
{
    /// Creates a new instance which obtains channels from the given factory
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Declares the queue and exchange concurrently, then binds them using the given key
    ///
    /// Predeclared exchanges (see [`ExchangeDescriptor::is_predeclared`]) are not declared and the
    /// default exchange is never bound as it implicitly routes to every queue by name.
    #[instrument(skip(self, queue, exchange), fields(queue = queue.name(), exchange = exchange.name()))]
    pub async fn ensure(
        &self,
        queue: &QueueDescriptor,
        exchange: &ExchangeDescriptor,
        binding_key: &str,
    ) -> Result<(), TopologyError> {
        let channel = self
            .factory
            .channel()
            .await
            .map_err(TopologyError::Channel)?;

        let declare_queue = async {
            channel
                .declare_queue(queue)
                .await
                .map_err(|source| TopologyError::QueueDeclaration {
                    queue: queue.name().to_owned(),
                    source,
                })
        };

        let declare_exchange = async {
            if exchange.is_predeclared() {
                trace!("Skipping declaration of predeclared exchange");
                return Ok(());
            }

            channel
                .declare_exchange(exchange)
                .await
                .map_err(|source| TopologyError::ExchangeDeclaration {
                    exchange: exchange.name().to_owned(),
                    source,
                })
        };

        try_join!(declare_queue, declare_exchange)?;

        if exchange.is_default() {
            trace!("Default exchange is bound implicitly");
        } else {
            channel
                .bind_queue(queue.name(), exchange.name(), binding_key)
                .await
                .map_err(|source| TopologyError::Binding {
                    queue: queue.name().to_owned(),
                    exchange: exchange.name().to_owned(),
                    source,
                })?;
        }

        debug!(binding_key, "Topology ready");

        Ok(())
    }
}
