//! Thread-safe typed property bag for out-of-band strategy data.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed key into a [`Properties`] bag.
///
/// The phantom type ties reads and writes of one key to one value type
/// at compile time; the string name is the runtime identity.
#[derive(Debug)]
pub struct PropertyKey<V> {
    name: &'static str,
    _marker: PhantomData<fn() -> V>,
}

impl<V> PropertyKey<V> {
    /// Creates a new key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the key name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<V> Clone for PropertyKey<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for PropertyKey<V> {}

/// A thread-safe bag mapping typed keys to values.
///
/// Values are stored erased; a read with a key of the wrong type for
/// the stored value returns `None`.
#[derive(Default)]
pub struct Properties {
    values: RwLock<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl Properties {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under the given key, replacing any previous value.
    pub fn set<V>(&self, key: PropertyKey<V>, value: V)
    where
        V: Send + Sync + 'static,
    {
        self.values.write().insert(key.name, Arc::new(value));
    }

    /// Reads a value by key, cloning it out of the bag.
    #[must_use]
    pub fn get<V>(&self, key: PropertyKey<V>) -> Option<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        self.values
            .read()
            .get(key.name)
            .and_then(|value| value.downcast_ref::<V>())
            .cloned()
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains<V>(&self, key: PropertyKey<V>) -> bool {
        self.values.read().contains_key(key.name)
    }

    /// Returns the number of stored properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl Clone for Properties {
    fn clone(&self) -> Self {
        Self {
            values: RwLock::new(self.values.read().clone()),
        }
    }
}

impl std::fmt::Debug for Properties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Properties")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTEMPT: PropertyKey<usize> = PropertyKey::new("attempt");
    const LABEL: PropertyKey<String> = PropertyKey::new("label");

    #[test]
    fn test_set_and_get() {
        let props = Properties::new();
        props.set(ATTEMPT, 3);
        assert_eq!(props.get(ATTEMPT), Some(3));
        assert!(props.contains(ATTEMPT));
    }

    #[test]
    fn test_missing_key() {
        let props = Properties::new();
        assert_eq!(props.get(ATTEMPT), None);
        assert!(props.is_empty());
    }

    #[test]
    fn test_type_mismatch_returns_none() {
        let props = Properties::new();
        props.set(ATTEMPT, 1);
        // Same name, different type.
        let wrong: PropertyKey<String> = PropertyKey::new("attempt");
        assert_eq!(props.get(wrong), None);
    }

    #[test]
    fn test_overwrite() {
        let props = Properties::new();
        props.set(LABEL, "first".to_string());
        props.set(LABEL, "second".to_string());
        assert_eq!(props.get(LABEL), Some("second".to_string()));
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn test_clone_snapshots_values() {
        let props = Properties::new();
        props.set(ATTEMPT, 1);
        let snapshot = props.clone();
        props.set(ATTEMPT, 2);
        assert_eq!(snapshot.get(ATTEMPT), Some(1));
    }
}
