//! Registry of consumers and middleware, keyed by message type.
//!
//! Built once at startup through [`RegistryBuilder`] and read-only afterwards.
//! Each registration stores a type-specific adapter, so dispatch never needs
//! reflection: the message's `TypeId` selects the adapters and the adapters
//! downcast back to the concrete type.
//!
//! Registrations are either:
//!   - **scoped**: a factory invoked on every dispatch, so per-instance state
//!     is never shared between concurrent deliveries, or
//!   - **singleton**: one shared instance.

#[cfg(feature = "discovery")]
pub mod discovery;

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::consumer::{Consumer, ErasedConsumer, TypedConsumer};
use crate::message::{message_name, Message};
use crate::middleware::{Interceptor, Middleware, MiddlewareOptions, TypedMiddleware};

/// How instances are produced at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// New instance per dispatch.
    Scoped,
    /// One instance shared by every dispatch.
    Singleton,
}

enum Provider<T: ?Sized> {
    Scoped(Arc<dyn Fn() -> Arc<T> + Send + Sync>),
    Singleton(Arc<T>),
}

impl<T: ?Sized> Provider<T> {
    fn resolve(&self) -> Arc<T> {
        match self {
            Provider::Scoped(factory) => factory(),
            Provider::Singleton(instance) => instance.clone(),
        }
    }

    fn lifetime(&self) -> Lifetime {
        match self {
            Provider::Scoped(_) => Lifetime::Scoped,
            Provider::Singleton(_) => Lifetime::Singleton,
        }
    }
}

impl<T: ?Sized> Clone for Provider<T> {
    fn clone(&self) -> Self {
        match self {
            Provider::Scoped(factory) => Provider::Scoped(factory.clone()),
            Provider::Singleton(instance) => Provider::Singleton(instance.clone()),
        }
    }
}

struct ConsumerRegistration {
    name: &'static str,
    provider: Provider<dyn ErasedConsumer>,
}

struct MiddlewareRegistration {
    name: &'static str,
    /// `Some` for typed middleware, `None` for interceptors.
    message_type: Option<TypeId>,
    options: MiddlewareOptions,
    provider: Provider<dyn Interceptor>,
}

impl MiddlewareRegistration {
    fn applies_to(&self, message_type: TypeId) -> bool {
        self.message_type.map_or(true, |t| t == message_type) && self.options.matches(message_type)
    }
}

/// Description of a registration, for inspection and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub name: &'static str,
    pub lifetime: Lifetime,
    pub order: i32,
}

/// Read-only lookup tables used by the pipeline.
#[derive(Default)]
pub struct Registry {
    consumers: HashMap<TypeId, Vec<ConsumerRegistration>>,
    middleware: Vec<MiddlewareRegistration>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Number of consumers registered for `M`.
    pub fn consumer_count<M: Message>(&self) -> usize {
        self.consumer_count_for(TypeId::of::<M>())
    }

    pub fn consumer_count_for(&self, message_type: TypeId) -> usize {
        self.consumers.get(&message_type).map_or(0, Vec::len)
    }

    /// Middleware that would run for `M`, in execution order.
    pub fn middleware_for<M: Message>(&self) -> Vec<RegistrationInfo> {
        self.applicable(TypeId::of::<M>())
            .into_iter()
            .map(|reg| RegistrationInfo {
                name: reg.name,
                lifetime: reg.provider.lifetime(),
                order: reg.options.order_value(),
            })
            .collect()
    }

    /// Resolve fresh consumer instances for one dispatch, in registration order.
    pub(crate) fn resolve_consumers(&self, message_type: TypeId) -> Vec<Arc<dyn ErasedConsumer>> {
        self.consumers
            .get(&message_type)
            .map(|regs| regs.iter().map(|reg| reg.provider.resolve()).collect())
            .unwrap_or_default()
    }

    /// Resolve the eligible middleware for one dispatch, sorted by order.
    pub(crate) fn resolve_middleware(&self, message_type: TypeId) -> Vec<Arc<dyn Interceptor>> {
        self.applicable(message_type)
            .into_iter()
            .map(|reg| reg.provider.resolve())
            .collect()
    }

    fn applicable(&self, message_type: TypeId) -> Vec<&MiddlewareRegistration> {
        let mut eligible: Vec<&MiddlewareRegistration> = self
            .middleware
            .iter()
            .filter(|reg| reg.applies_to(message_type))
            .collect();
        // Stable: equal orders keep registration order.
        eligible.sort_by_key(|reg| reg.options.order_value());
        eligible
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("message_types", &self.consumers.len())
            .field(
                "consumers",
                &self.consumers.values().map(Vec::len).sum::<usize>(),
            )
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// A unit that contributes consumers and middleware, e.g. one feature
/// module of an application.
pub trait MessagingModule {
    fn register(&self, registry: RegistryBuilder) -> RegistryBuilder;
}

/// Startup-time registration.
#[derive(Default)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scoped consumer: `factory` runs on every dispatch.
    pub fn consumer<M, C, F>(self, factory: F) -> Self
    where
        M: Message,
        C: Consumer<M> + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let provider: Provider<dyn ErasedConsumer> = Provider::Scoped(Arc::new(move || {
            Arc::new(TypedConsumer::<M, C>::new(factory())) as Arc<dyn ErasedConsumer>
        }));
        self.push_consumer::<M>(std::any::type_name::<C>(), provider)
    }

    /// Register a consumer instance shared by all dispatches.
    pub fn singleton_consumer<M, C>(self, consumer: C) -> Self
    where
        M: Message,
        C: Consumer<M> + 'static,
    {
        let provider: Provider<dyn ErasedConsumer> =
            Provider::Singleton(Arc::new(TypedConsumer::<M, C>::new(consumer)));
        self.push_consumer::<M>(std::any::type_name::<C>(), provider)
    }

    /// Register scoped middleware for message type `M`.
    pub fn middleware<M, W, F>(self, options: MiddlewareOptions, factory: F) -> Self
    where
        M: Message,
        W: Middleware<M> + 'static,
        F: Fn() -> W + Send + Sync + 'static,
    {
        let provider: Provider<dyn Interceptor> = Provider::Scoped(Arc::new(move || {
            Arc::new(TypedMiddleware::<M, W>::new(factory())) as Arc<dyn Interceptor>
        }));
        self.push_middleware(
            std::any::type_name::<W>(),
            Some(TypeId::of::<M>()),
            options,
            provider,
        )
    }

    /// Register shared middleware for message type `M`.
    pub fn singleton_middleware<M, W>(self, options: MiddlewareOptions, middleware: W) -> Self
    where
        M: Message,
        W: Middleware<M> + 'static,
    {
        let provider: Provider<dyn Interceptor> =
            Provider::Singleton(Arc::new(TypedMiddleware::<M, W>::new(middleware)));
        self.push_middleware(
            std::any::type_name::<W>(),
            Some(TypeId::of::<M>()),
            options,
            provider,
        )
    }

    /// Register a scoped interceptor for every message type `options` targets.
    pub fn interceptor<I, F>(self, options: MiddlewareOptions, factory: F) -> Self
    where
        I: Interceptor + 'static,
        F: Fn() -> I + Send + Sync + 'static,
    {
        let provider: Provider<dyn Interceptor> =
            Provider::Scoped(Arc::new(move || Arc::new(factory()) as Arc<dyn Interceptor>));
        self.push_middleware(std::any::type_name::<I>(), None, options, provider)
    }

    /// Register a shared interceptor for every message type `options` targets.
    pub fn singleton_interceptor<I>(self, options: MiddlewareOptions, interceptor: I) -> Self
    where
        I: Interceptor + 'static,
    {
        let provider: Provider<dyn Interceptor> = Provider::Singleton(Arc::new(interceptor));
        self.push_middleware(std::any::type_name::<I>(), None, options, provider)
    }

    /// Let a module add its registrations.
    pub fn module(self, module: &dyn MessagingModule) -> Self {
        module.register(self)
    }

    pub fn build(self) -> Registry {
        tracing::debug!(
            message_types = self.registry.consumers.len(),
            middleware = self.registry.middleware.len(),
            "registry_built"
        );
        self.registry
    }

    fn push_consumer<M: Message>(
        mut self,
        name: &'static str,
        provider: Provider<dyn ErasedConsumer>,
    ) -> Self {
        tracing::debug!(
            message_type = message_name::<M>(),
            consumer = name,
            lifetime = ?provider.lifetime(),
            "consumer_registered"
        );
        self.registry
            .consumers
            .entry(TypeId::of::<M>())
            .or_default()
            .push(ConsumerRegistration { name, provider });
        self
    }

    fn push_middleware(
        mut self,
        name: &'static str,
        message_type: Option<TypeId>,
        options: MiddlewareOptions,
        provider: Provider<dyn Interceptor>,
    ) -> Self {
        tracing::debug!(
            middleware = name,
            order = options.order_value(),
            targets = ?options.target_names().collect::<Vec<_>>(),
            "middleware_registered"
        );
        self.registry.middleware.push(MiddlewareRegistration {
            name,
            message_type,
            options,
            provider,
        });
        self
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageContext;
    use crate::middleware::Next;
    use crate::types::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct Hello;
    struct Other;

    struct Noop;

    #[async_trait]
    impl Consumer<Hello> for Noop {
        async fn consume(&self, _message: &Hello, _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    struct Labelled(&'static str);

    #[async_trait]
    impl Interceptor for Labelled {
        async fn intercept(&self, _message: MessageContext<'_>, next: Next<'_>) -> Result<()> {
            next.run().await
        }
    }

    #[async_trait]
    impl Middleware<Hello> for Labelled {
        async fn invoke(&self, _message: &Hello, next: Next<'_>) -> Result<()> {
            next.run().await
        }
    }

    #[test]
    fn test_consumer_counts() {
        let registry = Registry::builder()
            .consumer::<Hello, _, _>(|| Noop)
            .singleton_consumer::<Hello, _>(Noop)
            .build();

        assert_eq!(registry.consumer_count::<Hello>(), 2);
        assert_eq!(registry.consumer_count::<Other>(), 0);
    }

    #[test]
    fn test_scoped_factory_runs_per_resolve() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let registry = Registry::builder()
            .consumer::<Hello, _, _>(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Noop
            })
            .build();

        registry.resolve_consumers(TypeId::of::<Hello>());
        registry.resolve_consumers(TypeId::of::<Hello>());
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_singleton_is_shared() {
        let registry = Registry::builder()
            .singleton_consumer::<Hello, _>(Noop)
            .build();

        let a = registry.resolve_consumers(TypeId::of::<Hello>());
        let b = registry.resolve_consumers(TypeId::of::<Hello>());
        assert!(Arc::ptr_eq(&a[0], &b[0]));
    }

    #[test]
    fn test_middleware_sorted_stable_and_filtered() {
        let registry = Registry::builder()
            .singleton_interceptor(MiddlewareOptions::new().order(2), Labelled("b"))
            .singleton_interceptor(MiddlewareOptions::new().order(1), Labelled("a"))
            .singleton_interceptor(
                MiddlewareOptions::new().order(1).target::<Other>(),
                Labelled("other-only"),
            )
            .middleware::<Hello, _, _>(MiddlewareOptions::new().order(1), || Labelled("typed"))
            .build();

        let for_hello = registry.middleware_for::<Hello>();
        let orders: Vec<i32> = for_hello.iter().map(|m| m.order).collect();
        let lifetimes: Vec<Lifetime> = for_hello.iter().map(|m| m.lifetime).collect();
        assert_eq!(orders, vec![1, 1, 2]);
        assert_eq!(
            lifetimes,
            vec![Lifetime::Singleton, Lifetime::Scoped, Lifetime::Singleton]
        );

        // Typed middleware for Hello never applies to Other.
        let for_other = registry.middleware_for::<Other>();
        assert_eq!(for_other.len(), 3);
        assert!(for_other.iter().all(|m| m.lifetime == Lifetime::Singleton));
    }

    struct HelloModule;

    impl MessagingModule for HelloModule {
        fn register(&self, registry: RegistryBuilder) -> RegistryBuilder {
            registry.consumer::<Hello, _, _>(|| Noop)
        }
    }

    #[test]
    fn test_module_registration() {
        let registry = Registry::builder().module(&HelloModule).build();
        assert_eq!(registry.consumer_count::<Hello>(), 1);
    }
}
