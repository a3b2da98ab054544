use anyhow::Result;
use async_trait::async_trait;
use correlate::constants::DEFAULT_RPC_EXCHANGE;
use correlate::library::communication::implementation::json::{
    JsonContextProvider, JsonSerializer,
};
use correlate::library::communication::implementation::redis::{
    RedisChannelFactory, RedisClientFactory,
};
use correlate::library::communication::request::{
    BrokerRequestor, RequestConfiguration, RequestProcessor, Requestor, Responder,
    ResponderConfiguration,
};
use correlate::library::communication::topology::{ExchangeDescriptor, QueueDescriptor};
use correlate::library::BoxedError;
use correlate::options::{SharedOptions, TimeoutOptions};
use serde_json::Value;
use structopt::StructOpt;
use uuid::Uuid;

#[derive(Debug, StructOpt)]
#[structopt(about = "Request/reply messaging on top of a message broker.")]
struct MainOptions {
    #[structopt(flatten)]
    shared_options: SharedOptions,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Sends a single request and prints the response
    Request(RequestOptions),
    /// Answers requests by returning their payload
    Echo(EchoOptions),
}

#[derive(Debug, StructOpt)]
struct RequestOptions {
    /// Direct exchange the request is published to
    #[structopt(short, long, value_name = "name")]
    exchange: Option<String>,

    /// Identifier of the overall operation, generated if omitted
    #[structopt(long, value_name = "uuid")]
    global_id: Option<Uuid>,

    #[structopt(flatten)]
    timeout: TimeoutOptions,

    /// Routing key the request is published with
    routing_key: String,

    /// Request payload as JSON
    payload: String,
}

#[derive(Debug, StructOpt)]
struct EchoOptions {
    /// Direct exchange requests are published to
    #[structopt(short, long, value_name = "name")]
    exchange: Option<String>,

    /// Durable queue requests are consumed from
    queue: String,

    /// Key with which the queue is bound to the exchange
    routing_key: String,
}

struct EchoProcessor;

#[async_trait]
impl RequestProcessor for EchoProcessor {
    type Request = Value;
    type Response = Value;

    async fn process(&self, request: Value) -> Result<Value, BoxedError> {
        log::info!("Echoing {}", request);
        Ok(request)
    }
}

type Factory = RedisChannelFactory<RedisClientFactory>;

fn exchange(name: Option<String>) -> ExchangeDescriptor {
    ExchangeDescriptor::direct(name.as_deref().unwrap_or(DEFAULT_RPC_EXCHANGE))
}

async fn request(factory: Factory, options: RequestOptions) -> Result<()> {
    let config = RequestConfiguration::builder(options.routing_key)
        .exchange(exchange(options.exchange))
        .build();

    let payload: Value = serde_json::from_str(&options.payload)?;
    let global_id = options.global_id.unwrap_or_else(Uuid::new_v4);

    let requestor = BrokerRequestor::new(
        factory,
        JsonSerializer,
        JsonContextProvider::default(),
        options.timeout.request_timeout,
    );

    let response: Value = requestor.request(&payload, global_id, &config).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

async fn echo(factory: Factory, options: EchoOptions) -> Result<()> {
    let config = ResponderConfiguration::new(
        QueueDescriptor::durable(options.queue),
        exchange(options.exchange),
        options.routing_key,
    );
    let responder = Responder::new(factory, JsonSerializer, EchoProcessor);

    tokio::select! {
        result = responder.serve(&config) => result.map_err(anyhow::Error::msg)?,
        _ = tokio::signal::ctrl_c() => log::info!("Shutting down"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let main_options = MainOptions::from_args();
    let shared_options = main_options.shared_options;

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&shared_options.log)
        .init();

    let factory = RedisChannelFactory::new(
        RedisClientFactory::new(&shared_options.redis.url).map_err(anyhow::Error::msg)?,
    );

    match main_options.cmd {
        Command::Request(options) => request(factory, options).await?,
        Command::Echo(options) => echo(factory, options).await?,
    }

    Ok(())
}
