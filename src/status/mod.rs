//! Full status tree returned by the control plane's `FullStatus` call, and
//! the differencer that turns successive trees into change records.

mod differ;

pub use differ::{diff_snapshots, flatten, Snapshot, StateDiffer};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[cfg(test)]
mod tests;

/// Full snapshot of the model as reported by the control plane.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FullStatus {
    #[serde(default)]
    pub model: Option<Map<String, Value>>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub applications: BTreeMap<String, ApplicationStatus>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub machines: BTreeMap<String, Map<String, Value>>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub relations: Vec<Map<String, Value>>,
}

/// Application entry; units are nested under their application.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub units: BTreeMap<String, Map<String, Value>>,

    /// Every other field of the application
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Treats an explicit `null` collection like a missing one.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
