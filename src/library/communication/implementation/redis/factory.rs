use super::RedisConnection;
use crate::library::BoxedError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, instrument, trace};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// Variant for redis connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisConnectionVariant {
    /// Individual connection that allows for blocking commands without disturbing other users
    Owned,
    /// Connection that can be shared between multiple users and does not permit blocking commands
    Multiplexed,
}

/// Factory for redis connections of different [types](RedisConnectionVariant)
#[async_trait]
pub trait RedisFactory {
    /// Establishes a new connection or clones a shared one
    async fn connection(
        &self,
        variant: RedisConnectionVariant,
    ) -> Result<RedisConnection, BoxedError>;
}

/// [`RedisFactory`] implementation connecting to a single server
///
/// Multiplexed connections are established lazily and reused for the lifetime of the factory.
pub struct RedisClientFactory {
    client: Client,
    shared: Mutex<Option<MultiplexedConnection>>,
}

impl RedisClientFactory {
    /// Creates a new factory opening connections to the given URL
    pub fn new(url: &str) -> Result<Self, BoxedError> {
        Ok(Self {
            client: Client::open(url)?,
            shared: Mutex::new(None),
        })
    }

    #[instrument(skip(self))]
    async fn shared(&self) -> Result<MultiplexedConnection, BoxedError> {
        let mut shared = self.shared.lock().await;

        if let Some(con) = shared.as_ref() {
            trace!("Reusing existing shared connection");
            return Ok(con.clone());
        }

        debug!("Instantiating shared redis connection");
        let con = timeout(
            CONNECT_TIMEOUT,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await??;
        *shared = Some(con.clone());

        Ok(con)
    }
}

#[async_trait]
impl RedisFactory for RedisClientFactory {
    async fn connection(
        &self,
        variant: RedisConnectionVariant,
    ) -> Result<RedisConnection, BoxedError> {
        match variant {
            RedisConnectionVariant::Owned => {
                debug!("Instantiating new standalone redis connection");
                let con = timeout(CONNECT_TIMEOUT, self.client.get_async_connection()).await??;
                Ok(RedisConnection::Owned(con))
            }
            RedisConnectionVariant::Multiplexed => {
                Ok(RedisConnection::Multiplexed(self.shared().await?))
            }
        }
    }
}
