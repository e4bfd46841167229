// ABOUTME: Phantom-typed names for objects observed on the cluster.
// ABOUTME: Prevents passing a replica-set name where a pod name is expected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker types for phantom type parameters.
pub enum PodMarker {}
pub enum ReplicaSetMarker {}

/// Name of an object the platform generated for us (pods, replica sets).
///
/// These are never validated: they come back from the platform and are only
/// ever handed straight back to it.
#[must_use = "object names reference cluster resources and should not be ignored"]
pub struct ObjectName<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> ObjectName<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

// Manual impls: T is only a marker and implements nothing.

impl<T> std::fmt::Debug for ObjectName<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObjectName").field(&self.value).finish()
    }
}

impl<T> Clone for ObjectName<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for ObjectName<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for ObjectName<T> {}

impl<T> Hash for ObjectName<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for ObjectName<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> Serialize for ObjectName<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for ObjectName<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

pub type PodName = ObjectName<PodMarker>;
pub type ReplicaSetName = ObjectName<ReplicaSetMarker>;
