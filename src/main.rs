//! membus demo - wires a few consumers and the logging middleware, sends
//! some messages through the async bus, then shuts it down.

use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use membus::{
    CancellationToken, Config, Consumer, EventMessage, EventMetadata, LoggingInterceptor,
    MessagingBuilder, MessagingModule, MiddlewareOptions, RegistryBuilder,
};

#[derive(Debug, Parser)]
#[command(name = "membus-demo", about = "Send a few messages through the in-process bus")]
struct Args {
    /// JSON configuration file (processing + observability sections)
    #[arg(long, env = "MEMBUS_CONFIG")]
    config: Option<PathBuf>,

    /// Number of HelloMessage sends
    #[arg(long, default_value_t = 2)]
    hellos: usize,

    /// Simulated work per slow consumer, in milliseconds
    #[arg(long, default_value_t = 1000)]
    work_ms: u64,

    /// Time to let deliveries finish before shutdown, in milliseconds
    #[arg(long, default_value_t = 3000)]
    settle_ms: u64,
}

#[derive(Debug)]
struct HelloMessage {
    text: String,
}

#[derive(Debug)]
struct GreetingRecorded {
    meta: EventMetadata,
    text: String,
}

impl EventMessage for GreetingRecorded {
    fn metadata(&self) -> &EventMetadata {
        &self.meta
    }
}

struct HelloConsumer;

#[async_trait]
impl Consumer<HelloMessage> for HelloConsumer {
    async fn consume(
        &self,
        message: &HelloMessage,
        _cancel: &CancellationToken,
    ) -> membus::Result<()> {
        tracing::info!(consumer = "hello", text = %message.text, "hello_received");
        Ok(())
    }
}

/// Pretends to do some work, giving up early on cancellation.
struct SlowHelloConsumer {
    name: &'static str,
    work: Duration,
}

#[async_trait]
impl Consumer<HelloMessage> for SlowHelloConsumer {
    async fn consume(
        &self,
        message: &HelloMessage,
        cancel: &CancellationToken,
    ) -> membus::Result<()> {
        tracing::info!(consumer = self.name, text = %message.text, "hello_received");
        tokio::select! {
            _ = cancel.cancelled() => Err(membus::Error::cancelled("slow consumer interrupted")),
            _ = tokio::time::sleep(self.work) => {
                tracing::info!(consumer = self.name, "hello_processed");
                Ok(())
            }
        }
    }
}

struct GreetingRecordedConsumer;

#[async_trait]
impl Consumer<GreetingRecorded> for GreetingRecordedConsumer {
    async fn consume(
        &self,
        event: &GreetingRecorded,
        _cancel: &CancellationToken,
    ) -> membus::Result<()> {
        tracing::info!(
            event_id = %event.id(),
            occurred_on_utc = %event.occurred_on_utc(),
            text = %event.text,
            "greeting_recorded"
        );
        Ok(())
    }
}

struct GreetingModule {
    work: Duration,
}

impl MessagingModule for GreetingModule {
    fn register(&self, registry: RegistryBuilder) -> RegistryBuilder {
        let work = self.work;
        registry
            .consumer::<HelloMessage, _, _>(|| HelloConsumer)
            .consumer::<HelloMessage, _, _>(move || SlowHelloConsumer {
                name: "second",
                work,
            })
            .consumer::<HelloMessage, _, _>(move || SlowHelloConsumer {
                name: "third",
                work,
            })
            .consumer::<GreetingRecorded, _, _>(|| GreetingRecordedConsumer)
            .interceptor(MiddlewareOptions::new().order(-100), || LoggingInterceptor)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let mut config = Config::default();
            config.processing = config
                .processing
                .with_max_concurrent_messages(10)
                .with_max_queue_size(500)
                .with_max_retries(5)
                .with_retry_delay(Duration::from_secs(2));
            config
        }
    };

    membus::observability::init_tracing_with(&config.observability);

    let messaging = MessagingBuilder::from_config(&config)
        .module(&GreetingModule {
            work: Duration::from_millis(args.work_ms),
        })
        .build_async()?;

    tracing::info!(
        max_concurrent_messages = config.processing.max_concurrent_messages,
        max_queue_size = config.processing.max_queue_size,
        "membus demo starting"
    );

    messaging
        .publisher()
        .publish(GreetingRecorded {
            meta: EventMetadata::new(),
            text: "demo started".to_string(),
        })
        .await?;

    for n in 0..args.hellos {
        messaging
            .bus()
            .send(HelloMessage {
                text: format!("Hello #{}", n + 1),
            })
            .await?;
    }

    tokio::time::sleep(Duration::from_millis(args.settle_ms)).await;

    let stats = messaging.bus().stats();
    tracing::info!(stats = %serde_json::to_string(&stats)?, "membus demo finished");
    messaging.bus().shutdown().await;

    Ok(())
}
