//! Option groups shared by the subcommands of the binary
//!
//! The structs in this module are meant to be flattened into the options of a subcommand.

use crate::constants::DEFAULT_REQUEST_TIMEOUT;
use crate::library::helpers::parse_millis;
use std::time::Duration;
use structopt::StructOpt;

/// Options for connecting to the Redis server
#[derive(Debug, StructOpt)]
pub struct RedisOptions {
    /// Redis database server URL
    #[structopt(
        short = "r",
        long = "redis",
        env = "REDIS",
        global = true,
        default_value = "redis://localhost:6379/",
        value_name = "url"
    )]
    pub url: String,
}

/// Options for sending requests
#[derive(Debug, StructOpt)]
pub struct TimeoutOptions {
    /// Milliseconds to wait for a response before giving up
    #[structopt(
        long = "timeout",
        env = "REQUEST_TIMEOUT",
        default_value = "10000",
        parse(try_from_str = parse_millis),
        value_name = "millis"
    )]
    pub request_timeout: Duration,
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Options which are shared by every subcommand
#[derive(Debug, StructOpt)]
pub struct SharedOptions {
    /// Log level, scopable to different modules
    ///
    /// Levels: trace, debug, info, warn, error
    #[structopt(
        short,
        long,
        env = "RUST_LOG",
        default_value = "warn",
        global = true,
        value_name = "level"
    )]
    pub log: String,

    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub redis: RedisOptions,
}
