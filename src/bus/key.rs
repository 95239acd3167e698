//! Bus identification types.

use std::sync::atomic::{AtomicU32, Ordering};

/// Identifies an audio bus.
///
/// A key is either *object-identified* (derived from a stable external object
/// id, so every request for the same logical bus produces an equal key) or
/// *instance-identified* (allocated from a [`BusKeyFactory`], unique per
/// allocation). Equality and hashing combine both fields.
///
/// # Example
///
/// ```
/// use audio_patchbay::{BusKey, BusKeyFactory};
///
/// assert_eq!(BusKey::from_object_id(42), BusKey::from_object_id(42));
///
/// let factory = BusKeyFactory::new();
/// assert_ne!(factory.next_key(), factory.next_key());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusKey {
    object_id: Option<u32>,
    instance_id: Option<u32>,
}

impl BusKey {
    /// Creates a key for a bus backed by a stable external object.
    pub const fn from_object_id(object_id: u32) -> Self {
        Self {
            object_id: Some(object_id),
            instance_id: None,
        }
    }

    /// Creates a key from a raw instance id.
    ///
    /// Prefer [`BusKeyFactory::next_key`], which guarantees uniqueness.
    pub const fn from_instance_id(instance_id: u32) -> Self {
        Self {
            object_id: None,
            instance_id: Some(instance_id),
        }
    }

    /// Returns the object id, if this key is object-identified.
    pub fn object_id(&self) -> Option<u32> {
        self.object_id
    }

    /// Returns the instance id, if this key is instance-identified.
    pub fn instance_id(&self) -> Option<u32> {
        self.instance_id
    }

    /// Returns `true` if at least one id is set.
    pub fn is_valid(&self) -> bool {
        self.object_id.is_some() || self.instance_id.is_some()
    }
}

impl std::fmt::Display for BusKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.object_id, self.instance_id) {
            (Some(object), Some(instance)) => write!(f, "object:{object}/instance:{instance}"),
            (Some(object), None) => write!(f, "object:{object}"),
            (None, Some(instance)) => write!(f, "instance:{instance}"),
            (None, None) => write!(f, "invalid"),
        }
    }
}

/// Allocates instance-identified [`BusKey`]s.
///
/// The counter starts at 1 and is never reset. It wraps only after the full
/// `u32` range has been handed out, skipping 0.
#[derive(Debug)]
pub struct BusKeyFactory {
    next: AtomicU32,
}

impl BusKeyFactory {
    /// Creates a factory whose first key has instance id 1.
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocates a fresh instance-identified key.
    pub fn next_key(&self) -> BusKey {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return BusKey::from_instance_id(id);
            }
        }
    }
}

impl Default for BusKeyFactory {
    fn default() -> Self {
        Self::new()
    }
}
