//! Concurrent mapping from keys to the listeners that coalesce requests for them.

use std::any::type_name;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;
use std::ops::ControlFlow;
use std::sync::Arc;

use foldhash::fast::RandomState;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{RegistryBuilder, SharedListener};

/// Creates the listener for a key seen by a [`Registry`] for the first time.
pub type ListenerFactory<V> = Arc<dyn Fn() -> SharedListener<V> + Send + Sync>;

/// Binds keys to listeners, creating each listener exactly once.
///
/// Concurrent callers asking for the same key through [`get_or_create()`][Self::get_or_create]
/// always receive the same listener instance. Exactly one of them is told that it created the
/// listener, which makes it responsible for eventually broadcasting a value on it.
///
/// All listeners are created by the one factory the registry was built with. The default factory
/// creates [`RepeatListener`][crate::RepeatListener] instances; use
/// [`with_factory()`][Self::with_factory] or [`builder()`][Self::builder] to select another
/// delivery policy, for example [`once`][crate::once].
///
/// Entries are never evicted automatically. A binding lives until it is removed with
/// [`delete()`][Self::delete] or replaced with [`put()`][Self::put].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use listeners::Registry;
///
/// let registry = Registry::<String, u32>::new();
///
/// let (first, existed) = registry.get_or_create("k".to_string());
/// assert!(!existed);
///
/// let (second, existed) = registry.get_or_create("k".to_string());
/// assert!(existed);
/// assert!(Arc::ptr_eq(&first, &second));
///
/// registry.delete("k");
/// let (third, existed) = registry.get_or_create("k".to_string());
/// assert!(!existed);
/// assert!(!Arc::ptr_eq(&first, &third));
/// ```
pub struct Registry<K, V> {
    factory: ListenerFactory<V>,
    bindings: RwLock<HashMap<K, SharedListener<V>, RandomState>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a registry whose listeners are [`RepeatListener`][crate::RepeatListener]s.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a registry whose listeners are created by `factory`.
    ///
    /// The factory runs while the registry holds its exclusive lock, so it must not call back
    /// into the registry it belongs to; doing so deadlocks.
    ///
    /// # Example
    ///
    /// ```rust
    /// use listeners::Registry;
    ///
    /// let registry = Registry::<u64, String>::with_factory(listeners::once);
    /// ```
    #[must_use]
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> SharedListener<V> + Send + Sync + 'static,
    {
        Self::builder().factory(factory).build()
    }

    /// Starts building a registry with non-default configuration.
    #[must_use]
    pub fn builder() -> RegistryBuilder<K, V> {
        RegistryBuilder::new()
    }

    pub(crate) fn from_parts(factory: ListenerFactory<V>, capacity: usize) -> Self {
        Self {
            factory,
            bindings: RwLock::new(HashMap::with_capacity_and_hasher(
                capacity,
                RandomState::default(),
            )),
        }
    }

    /// Returns the listener bound to `key`, creating and binding a new one if there is none.
    ///
    /// The second element of the returned tuple is `true` if the listener already existed and
    /// `false` if this call created it. When many threads race to create a listener for the same
    /// key, exactly one of them gets `false` and all of them get the same instance.
    #[cfg_attr(test, mutants::skip)] // Removing the re-check creates duplicate listeners silently.
    pub fn get_or_create(&self, key: K) -> (SharedListener<V>, bool) {
        if let Some(listener) = self.bindings.read().get(&key) {
            return (Arc::clone(listener), true);
        }

        let mut bindings = self.bindings.write();

        // Someone may have bound the key between our read and write lock.
        match bindings.entry(key) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), true),
            Entry::Vacant(entry) => {
                let listener = entry.insert((self.factory)());
                trace!("created listener for new key");

                (Arc::clone(listener), false)
            }
        }
    }

    /// Returns the listener bound to `key`, if any.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<SharedListener<V>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.bindings.read().get(key).map(Arc::clone)
    }

    /// Binds `listener` to `key`, returning the listener previously bound to it, if any.
    ///
    /// Threads that already hold the previous listener keep using it. The new binding is visible
    /// to every lookup that starts after this call returns.
    pub fn put(&self, key: K, listener: SharedListener<V>) -> Option<SharedListener<V>> {
        let previous = self.bindings.write().insert(key, listener);

        if previous.is_some() {
            trace!("replaced listener binding");
        }

        previous
    }

    /// Removes the binding for `key`, returning the listener that was bound to it, if any.
    ///
    /// The next [`get_or_create()`][Self::get_or_create] for the key creates a new listener.
    /// Threads waiting on the removed listener are not affected and still need a broadcast.
    pub fn delete<Q>(&self, key: &Q) -> Option<SharedListener<V>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let removed = self.bindings.write().remove(key);

        if removed.is_some() {
            debug!("deleted listener binding");
        }

        removed
    }

    /// Calls `f` for every binding until it returns [`ControlFlow::Break`].
    ///
    /// The bindings are read from a consistent snapshot taken when the call starts. Changes made
    /// to the registry while iterating, including from inside `f`, are not reflected in the
    /// iteration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::ops::ControlFlow;
    ///
    /// use listeners::Registry;
    ///
    /// let registry = Registry::<u32, u32>::new();
    /// registry.get_or_create(1);
    /// registry.get_or_create(2);
    ///
    /// let mut seen = 0;
    /// registry.for_each(|_key, _listener| {
    ///     seen += 1;
    ///     ControlFlow::Continue(())
    /// });
    /// assert_eq!(seen, 2);
    /// ```
    pub fn for_each<F>(&self, mut f: F)
    where
        K: Clone,
        F: FnMut(&K, &SharedListener<V>) -> ControlFlow<()>,
    {
        let snapshot = self
            .bindings
            .read()
            .iter()
            .map(|(key, listener)| (key.clone(), Arc::clone(listener)))
            .collect::<Vec<_>>();

        for (key, listener) in &snapshot {
            if f(key, listener).is_break() {
                break;
            }
        }
    }

    /// Number of bindings.
    ///
    /// Under concurrent mutation the result may be stale the instant it is returned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Whether there are no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl<K, V> Default for Registry<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for Registry<K, V> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("len", &self.bindings.read().len())
            .finish_non_exhaustive()
    }
}
