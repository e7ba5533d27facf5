//! Sync bus integration tests: pipeline ordering, targeting, short-circuit
//! and error propagation.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use membus::{
    CancellationToken, Consumer, Error, Interceptor, MessageContext, MessagingModule,
    Middleware, MiddlewareOptions, Next, Registry, RegistryBuilder, Result, SyncBus,
};

#[derive(Debug)]
struct HelloMessage {
    text: String,
}

fn hello(text: &str) -> HelloMessage {
    HelloMessage {
        text: text.to_string(),
    }
}

struct Unrelated;

type Log = Arc<Mutex<Vec<String>>>;

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

struct HelloConsumer {
    name: &'static str,
    log: Log,
}

#[async_trait]
impl Consumer<HelloMessage> for HelloConsumer {
    async fn consume(&self, message: &HelloMessage, _cancel: &CancellationToken) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, message.text));
        Ok(())
    }
}

struct TrackingMiddleware {
    name: &'static str,
    log: Log,
}

#[async_trait]
impl Middleware<HelloMessage> for TrackingMiddleware {
    async fn invoke(&self, _message: &HelloMessage, next: Next<'_>) -> Result<()> {
        self.log.lock().unwrap().push(format!("before:{}", self.name));
        let result = next.run().await;
        self.log.lock().unwrap().push(format!("after:{}", self.name));
        result
    }
}

/// Runs for every type it is targeted at; flags when it was called.
#[derive(Default)]
struct Flag {
    before: AtomicBool,
    after: AtomicBool,
}

struct BeforeOnly(Arc<Flag>);

#[async_trait]
impl Interceptor for BeforeOnly {
    async fn intercept(&self, _message: MessageContext<'_>, next: Next<'_>) -> Result<()> {
        self.0.before.store(true, Ordering::SeqCst);
        next.run().await
    }
}

struct AfterOnly(Arc<Flag>);

#[async_trait]
impl Interceptor for AfterOnly {
    async fn intercept(&self, _message: MessageContext<'_>, next: Next<'_>) -> Result<()> {
        let result = next.run().await;
        self.0.after.store(true, Ordering::SeqCst);
        result
    }
}

fn tracking(name: &'static str, log: &Log) -> impl Fn() -> TrackingMiddleware + Send + Sync {
    let log = log.clone();
    move || TrackingMiddleware {
        name,
        log: log.clone(),
    }
}

#[tokio::test]
async fn test_middleware_ordering_law() {
    let log = Log::default();
    let registry = Registry::builder()
        .consumer::<HelloMessage, _, _>({
            let log = log.clone();
            move || HelloConsumer {
                name: "consumer",
                log: log.clone(),
            }
        })
        .middleware::<HelloMessage, _, _>(MiddlewareOptions::new().order(2), tracking("B", &log))
        .middleware::<HelloMessage, _, _>(MiddlewareOptions::new().order(1), tracking("A", &log))
        .middleware::<HelloMessage, _, _>(MiddlewareOptions::new().order(3), tracking("C", &log))
        .build();
    let bus = SyncBus::new(Arc::new(registry));

    bus.send(hello("Order Test")).await.unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "before:A",
            "before:B",
            "before:C",
            "consumer:Order Test",
            "after:C",
            "after:B",
            "after:A",
        ]
    );
}

#[tokio::test]
async fn test_targeted_interceptors() {
    let matching = Arc::new(Flag::default());
    let non_matching = Arc::new(Flag::default());
    let log = Log::default();

    let registry = Registry::builder()
        .singleton_consumer::<HelloMessage, _>(HelloConsumer {
            name: "consumer",
            log: log.clone(),
        })
        .singleton_interceptor(
            MiddlewareOptions::new().target::<HelloMessage>(),
            BeforeOnly(matching.clone()),
        )
        .singleton_interceptor(
            MiddlewareOptions::new().target::<HelloMessage>(),
            AfterOnly(matching.clone()),
        )
        .singleton_interceptor(
            MiddlewareOptions::new().target::<Unrelated>(),
            BeforeOnly(non_matching.clone()),
        )
        .build();
    let bus = SyncBus::new(Arc::new(registry));

    bus.send(hello("Ping")).await.unwrap();

    assert!(matching.before.load(Ordering::SeqCst));
    assert!(matching.after.load(Ordering::SeqCst));
    assert!(!non_matching.before.load(Ordering::SeqCst));
    assert_eq!(entries(&log), vec!["consumer:Ping"]);
}

#[tokio::test]
async fn test_no_consumer_fails_and_middleware_sees_it() {
    let log = Log::default();
    let registry = Registry::builder()
        .middleware::<HelloMessage, _, _>(MiddlewareOptions::new(), tracking("A", &log))
        .build();
    let bus = SyncBus::new(Arc::new(registry));

    let err = bus.send(hello("No Consumer")).await.unwrap_err();

    assert!(matches!(err, Error::NoHandler { .. }));
    assert_eq!(err.code(), "NO_HANDLER");
    assert_eq!(entries(&log), vec!["before:A", "after:A"]);
}

#[tokio::test]
async fn test_consumers_run_in_registration_order() {
    let log = Log::default();
    let mut builder = Registry::builder();
    for name in ["first", "second", "third"] {
        builder = builder.singleton_consumer::<HelloMessage, _>(HelloConsumer {
            name,
            log: log.clone(),
        });
    }
    let bus = SyncBus::new(Arc::new(builder.build()));

    bus.send(hello("x")).await.unwrap();

    assert_eq!(entries(&log), vec!["first:x", "second:x", "third:x"]);
}

struct Broken;

#[async_trait]
impl Consumer<HelloMessage> for Broken {
    async fn consume(&self, _message: &HelloMessage, _cancel: &CancellationToken) -> Result<()> {
        Err(Error::handler(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk on fire",
        )))
    }
}

#[tokio::test]
async fn test_first_failure_stops_and_propagates() {
    let log = Log::default();
    let registry = Registry::builder()
        .singleton_consumer::<HelloMessage, _>(HelloConsumer {
            name: "first",
            log: log.clone(),
        })
        .singleton_consumer::<HelloMessage, _>(Broken)
        .singleton_consumer::<HelloMessage, _>(HelloConsumer {
            name: "never",
            log: log.clone(),
        })
        .build();
    let bus = SyncBus::new(Arc::new(registry));

    let err = bus.send(hello("x")).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(err.to_string().contains("disk on fire"));
    assert_eq!(entries(&log), vec!["first:x"]);
}

struct Gate;

#[async_trait]
impl Middleware<HelloMessage> for Gate {
    async fn invoke(&self, message: &HelloMessage, next: Next<'_>) -> Result<()> {
        if message.text.is_empty() {
            return Ok(());
        }
        next.run().await
    }
}

#[tokio::test]
async fn test_middleware_can_short_circuit() {
    let log = Log::default();
    let registry = Registry::builder()
        .singleton_middleware::<HelloMessage, _>(MiddlewareOptions::new().order(1), Gate)
        .middleware::<HelloMessage, _, _>(
            MiddlewareOptions::new().order(2),
            tracking("inner", &log),
        )
        .singleton_consumer::<HelloMessage, _>(HelloConsumer {
            name: "consumer",
            log: log.clone(),
        })
        .build();
    let bus = SyncBus::new(Arc::new(registry));

    bus.send(hello("")).await.unwrap();
    assert!(entries(&log).is_empty());

    bus.send(hello("go")).await.unwrap();
    assert_eq!(
        entries(&log),
        vec!["before:inner", "consumer:go", "after:inner"]
    );
}

#[tokio::test]
async fn test_scoped_consumers_are_fresh_per_send() {
    let built = Arc::new(AtomicUsize::new(0));
    let log = Log::default();
    let registry = Registry::builder()
        .consumer::<HelloMessage, _, _>({
            let built = built.clone();
            let log = log.clone();
            move || {
                built.fetch_add(1, Ordering::SeqCst);
                HelloConsumer {
                    name: "scoped",
                    log: log.clone(),
                }
            }
        })
        .build();
    let bus = SyncBus::new(Arc::new(registry));

    bus.send(hello("1")).await.unwrap();
    bus.send(hello("2")).await.unwrap();

    assert_eq!(built.load(Ordering::SeqCst), 2);
}

struct GreetingsModule {
    log: Log,
}

impl MessagingModule for GreetingsModule {
    fn register(&self, registry: RegistryBuilder) -> RegistryBuilder {
        let log = self.log.clone();
        registry.consumer::<HelloMessage, _, _>(move || HelloConsumer {
            name: "module",
            log: log.clone(),
        })
    }
}

#[tokio::test]
async fn test_module_registration() {
    let log = Log::default();
    let registry = Registry::builder()
        .module(&GreetingsModule { log: log.clone() })
        .build();
    let bus = SyncBus::new(Arc::new(registry));

    bus.send(hello("hi")).await.unwrap();
    assert_eq!(entries(&log), vec!["module:hi"]);
}
