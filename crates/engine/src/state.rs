//! Shared state passed between the steps of one build run.
//!
//! The bag is keyed by strings, like the state of most step runners, but every
//! key is a [`StateKey<T>`] that fixes the value type at compile time. Reading
//! a key therefore never needs an unchecked cast at the call site.

use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;
use thiserror::Error;

/// A namespaced state key bound to the type of its value.
pub struct StateKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey({})", self.name)
    }
}

/// Failure to read a value from the bag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state key `{key}` is not set")]
    Missing { key: &'static str },
    #[error("state key `{key}` does not hold a `{expected}`")]
    TypeMismatch { key: &'static str, expected: &'static str },
}

/// Mutable key/value store shared by the steps of a single run.
#[derive(Default)]
pub struct StateBag {
    values: IndexMap<&'static str, Box<dyn Any + Send>>,
}

impl StateBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the value stored under `key`.
    pub fn put<T: Any + Send>(&mut self, key: StateKey<T>, value: T) {
        self.values.insert(key.name, Box::new(value));
    }

    /// Returns the value under `key`, or an error when an earlier step did not
    /// store it.
    pub fn get<T: Any>(&self, key: StateKey<T>) -> Result<&T, StateError> {
        let value = self.values.get(key.name).ok_or(StateError::Missing { key: key.name })?;
        value.downcast_ref::<T>().ok_or(StateError::TypeMismatch {
            key: key.name,
            expected: type_name::<T>(),
        })
    }

    /// Returns the value under `key` if it is present.
    pub fn get_ok<T: Any>(&self, key: StateKey<T>) -> Option<&T> {
        self.get(key).ok()
    }

    pub fn contains<T: Any>(&self, key: StateKey<T>) -> bool {
        self.get_ok(key).is_some()
    }

    /// Removes the value under `key` and hands it back.
    pub fn take<T: Any>(&mut self, key: StateKey<T>) -> Option<T> {
        let value = self.values.shift_remove(key.name)?;
        match value.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(value) => {
                self.values.insert(key.name, value);
                None
            }
        }
    }

    /// Drops the value under `key`; returns whether one was present.
    pub fn remove<T: Any>(&mut self, key: StateKey<T>) -> bool {
        self.values.shift_remove(key.name).is_some()
    }

    /// Key names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for StateBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBag").field("keys", &self.values.keys().collect::<Vec<_>>()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: StateKey<String> = StateKey::new("test.Name");
    const COUNT: StateKey<u32> = StateKey::new("test.Count");
    const NAME_AS_COUNT: StateKey<u32> = StateKey::new("test.Name");

    #[test]
    fn put_overwrites_and_get_reads_typed_values() {
        let mut state = StateBag::new();
        state.put(NAME, "first".to_string());
        state.put(NAME, "second".to_string());
        state.put(COUNT, 3);

        assert_eq!(state.get(NAME).map(String::as_str), Ok("second"));
        assert_eq!(state.get(COUNT), Ok(&3));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn get_reports_missing_keys() {
        let state = StateBag::new();
        assert_eq!(state.get(NAME), Err(StateError::Missing { key: "test.Name" }));
        assert_eq!(state.get_ok(NAME), None);
        assert!(!state.contains(NAME));
    }

    #[test]
    fn conflicting_key_types_are_reported_not_cast() {
        let mut state = StateBag::new();
        state.put(NAME, "vm1".to_string());

        let error = state.get(NAME_AS_COUNT).unwrap_err();
        assert!(matches!(error, StateError::TypeMismatch { key: "test.Name", .. }));
        assert_eq!(state.take(NAME_AS_COUNT), None);
        assert_eq!(state.get(NAME).map(String::as_str), Ok("vm1"), "failed take must keep the value");
    }

    #[test]
    fn take_and_remove_drop_entries() {
        let mut state = StateBag::new();
        state.put(NAME, "vm1".to_string());
        state.put(COUNT, 1);

        assert_eq!(state.take(NAME), Some("vm1".to_string()));
        assert!(state.remove(COUNT));
        assert!(!state.remove(COUNT));
        assert!(state.is_empty());
    }

    #[test]
    fn keys_preserve_insertion_order() {
        let mut state = StateBag::new();
        state.put(COUNT, 1);
        state.put(NAME, "vm1".to_string());
        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["test.Count", "test.Name"]);
    }
}
