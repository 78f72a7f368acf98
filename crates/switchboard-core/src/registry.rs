//! Instance registry.
//!
//! Handler-owning types and filters are plain Rust values the application
//! constructs itself and registers here, one singleton per type. The route
//! table builder resolves owners and filters from the registry once, at
//! build time; nothing is looked up while dispatching.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::TypeToken;

/// A registered singleton, upcast to `Any`.
pub type InstanceArc = Arc<dyn Any + Send + Sync>;

/// Type-keyed singleton store.
#[derive(Default)]
pub struct InstanceRegistry {
    instances: RwLock<HashMap<TypeId, (TypeToken, InstanceArc)>>,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `instance` as the singleton of `T`, replacing any previous one.
    pub fn insert<T: Send + Sync + 'static>(&self, instance: Arc<T>) {
        self.instances
            .write()
            .insert(TypeId::of::<T>(), (TypeToken::of::<T>(), instance));
    }

    /// Registers `value` as the singleton of `T` (builder style).
    pub fn with<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.insert(Arc::new(value));
        self
    }

    /// Returns the singleton of `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let instance = self.get_raw(TypeId::of::<T>())?;
        instance.downcast::<T>().ok()
    }

    /// Returns the type-erased singleton registered under `type_id`.
    pub fn get_raw(&self, type_id: TypeId) -> Option<InstanceArc> {
        self.instances
            .read()
            .get(&type_id)
            .map(|(_, instance)| Arc::clone(instance))
    }

    /// Returns `true` if `T` has a singleton.
    pub fn contains<T: 'static>(&self) -> bool {
        self.instances.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of registered singletons.
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instances = self.instances.read();
        let types: Vec<_> = instances.values().map(|(token, _)| token.name()).collect();
        f.debug_struct("InstanceRegistry")
            .field("types", &types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[test]
    fn test_insert_and_get() {
        let registry = InstanceRegistry::new().with(Counter::default());
        let a = registry.get::<Counter>().unwrap();
        let b = registry.get::<Counter>().unwrap();
        a.0.fetch_add(1, Ordering::SeqCst);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
        assert!(registry.get::<String>().is_none());
    }
}
