// ABOUTME: Validated names and phantom-typed identifiers for cluster objects.
// ABOUTME: Keeps pod names, replica-set names, and RFC 1123 names from being mixed up.

mod id;
mod resource_name;

pub use id::{PodName, ReplicaSetName};
pub use resource_name::{ResourceName, ResourceNameError};
