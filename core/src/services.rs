//! Process-lifetime service registry.
//!
//! Services are keyed by type. A key may hold a singleton, a factory or
//! both; the singleton wins. Trait objects are registered as
//! `Arc<dyn Trait>`:
//!
//! ```
//! use std::sync::Arc;
//! use toolbelt_core::{Logger, RecordingLogger, ServiceContainer};
//!
//! let mut services = ServiceContainer::new();
//! services.register_singleton::<dyn Logger>(Arc::new(RecordingLogger::new()));
//! assert!(services.resolve::<dyn Logger>().is_some());
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ServiceError;

type Factory<T> = Arc<dyn Fn(&ServiceContainer) -> Arc<T> + Send + Sync>;

/// Singleton and factory registrations. Mutated only during startup.
#[derive(Default)]
pub struct ServiceContainer {
    singletons: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    factories: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_singleton<T>(&mut self, instance: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.singletons.insert(TypeId::of::<T>(), Box::new(instance));
    }

    /// Registers a factory invoked on every resolve of `T` that is not
    /// shadowed by a singleton.
    pub fn register_factory<T, F>(&mut self, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceContainer) -> Arc<T> + Send + Sync + 'static,
    {
        let factory: Factory<T> = Arc::new(factory);
        self.factories.insert(TypeId::of::<T>(), Box::new(factory));
    }

    pub fn resolve<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeId::of::<T>();
        if let Some(instance) = self
            .singletons
            .get(&key)
            .and_then(|boxed| boxed.downcast_ref::<Arc<T>>())
        {
            return Some(Arc::clone(instance));
        }

        let factory = self
            .factories
            .get(&key)
            .and_then(|boxed| boxed.downcast_ref::<Factory<T>>())?;
        Some((**factory)(self))
    }

    /// Like [`resolve`](Self::resolve) but reports which service is missing.
    pub fn require<T>(&self) -> Result<Arc<T>, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<T>()
            .ok_or(ServiceError::Missing(type_name::<T>()))
    }

    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeId::of::<T>();
        self.singletons.contains_key(&key) || self.factories.contains_key(&key)
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("singletons", &self.singletons.len())
            .field("factories", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter: std::fmt::Debug + Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Debug)]
    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[derive(Debug)]
    struct German;
    impl Greeter for German {
        fn greet(&self) -> String {
            "hallo".into()
        }
    }

    #[test]
    fn test_resolve_missing_returns_none() {
        let services = ServiceContainer::new();
        assert!(services.resolve::<dyn Greeter>().is_none());
        assert_eq!(
            services.require::<dyn Greeter>().unwrap_err(),
            ServiceError::Missing(type_name::<dyn Greeter>())
        );
    }

    #[test]
    fn test_singleton_is_shared() {
        let mut services = ServiceContainer::new();
        services.register_singleton::<dyn Greeter>(Arc::new(English));
        let a = services.resolve::<dyn Greeter>().unwrap();
        let b = services.resolve::<dyn Greeter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.greet(), "hello");
    }

    #[test]
    fn test_factory_runs_per_resolve() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut services = ServiceContainer::new();
        services.register_factory::<dyn Greeter, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(German)
        });

        assert_eq!(services.resolve::<dyn Greeter>().unwrap().greet(), "hallo");
        assert_eq!(services.resolve::<dyn Greeter>().unwrap().greet(), "hallo");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_singleton_takes_precedence_over_factory() {
        let mut services = ServiceContainer::new();
        services.register_factory::<dyn Greeter, _>(|_| Arc::new(German));
        services.register_singleton::<dyn Greeter>(Arc::new(English));
        assert_eq!(services.resolve::<dyn Greeter>().unwrap().greet(), "hello");
    }

    #[test]
    fn test_concrete_types_are_separate_keys() {
        let mut services = ServiceContainer::new();
        services.register_singleton(Arc::new(42_u32));
        assert_eq!(*services.resolve::<u32>().unwrap(), 42);
        assert!(services.resolve::<u64>().is_none());
        assert!(services.contains::<u32>());
    }
}
