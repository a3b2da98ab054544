use redis::aio::{Connection, ConnectionLike, MultiplexedConnection};
use redis::{Cmd, Pipeline, RedisFuture, Value};

/// Connection handed out by a [`RedisFactory`](super::RedisFactory)
pub enum RedisConnection {
    /// Dedicated connection which may be used for blocking commands
    Owned(Connection),
    /// Handle to a connection shared with other users
    Multiplexed(MultiplexedConnection),
}

impl ConnectionLike for RedisConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            RedisConnection::Owned(con) => con.req_packed_command(cmd),
            RedisConnection::Multiplexed(con) => con.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            RedisConnection::Owned(con) => con.req_packed_commands(cmd, offset, count),
            RedisConnection::Multiplexed(con) => con.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            RedisConnection::Owned(con) => con.get_db(),
            RedisConnection::Multiplexed(con) => con.get_db(),
        }
    }
}
