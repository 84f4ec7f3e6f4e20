//! Construction-time configuration of a registry.

use std::any::type_name;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{ListenerFactory, Registry, SharedListener, repeatable};

/// Number of bindings a registry can hold before it first needs to grow.
const DEFAULT_CAPACITY: usize = 8;

/// Configures and creates a [`Registry`].
///
/// # Example
///
/// ```rust
/// use listeners::Registry;
///
/// let registry = Registry::<String, Vec<u8>>::builder()
///     .factory(listeners::once)
///     .capacity(1024)
///     .build();
///
/// assert!(registry.is_empty());
/// ```
#[must_use]
pub struct RegistryBuilder<K, V> {
    factory: Option<ListenerFactory<V>>,
    capacity: usize,

    _keys: PhantomData<fn() -> K>,
}

impl<K, V> RegistryBuilder<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            factory: None,
            capacity: DEFAULT_CAPACITY,
            _keys: PhantomData,
        }
    }

    /// Sets the factory that creates the listener for every new key.
    ///
    /// If not set, the registry creates [`RepeatListener`][crate::RepeatListener]s.
    ///
    /// The factory runs while the registry holds its exclusive lock, so it must not call back
    /// into the registry it belongs to; doing so deadlocks.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> SharedListener<V> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Sets how many bindings the registry can hold before it first needs to grow.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Creates the registry.
    #[must_use]
    pub fn build(self) -> Registry<K, V> {
        let factory: ListenerFactory<V> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(repeatable::<V>),
        };

        Registry::from_parts(factory, self.capacity)
    }
}

impl<K, V> fmt::Debug for RegistryBuilder<K, V> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("has_custom_factory", &self.factory.is_some())
            .field("capacity", &self.capacity)
            .finish()
    }
}
