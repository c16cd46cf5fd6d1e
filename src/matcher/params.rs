// src/matcher/params.rs

//! Parameter sets and their canonical fingerprint.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::repo::ArtefactId;

/// What one input slot is bound to in a parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    One(ArtefactId),
    /// `all` selection on a non-iterating slot.
    Many(Vec<ArtefactId>),
    /// Optional slot with no candidate.
    Absent,
}

impl Binding {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Binding::One(id) => vec![id.as_str()],
            Binding::Many(ids) => ids.iter().map(|s| s.as_str()).collect(),
            Binding::Absent => Vec::new(),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Binding::Absent)
    }

    fn to_value(&self) -> Value {
        match self {
            Binding::One(id) => Value::String(id.clone()),
            Binding::Many(ids) => Value::Array(ids.iter().cloned().map(Value::String).collect()),
            Binding::Absent => Value::Null,
        }
    }
}

/// Slot name to binding; the ordered map makes serialisation canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, Binding>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: impl Into<String>, binding: Binding) {
        self.0.insert(slot.into(), binding);
    }

    pub fn with(mut self, slot: impl Into<String>, binding: Binding) -> Self {
        self.insert(slot, binding);
        self
    }

    pub fn get(&self, slot: &str) -> Option<&Binding> {
        self.0.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Binding)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical compact JSON of the bindings, keys sorted.
    pub fn fingerprint(&self) -> Fingerprint {
        let map: Map<String, Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect();
        Fingerprint(Value::Object(map).to_string())
    }
}

/// Serialised parameter set used as the dedup key of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse back into a parameter set.
    ///
    /// `None` for empty or unparsable fingerprints, which make an existing
    /// task population ambiguous.
    pub fn parse(&self) -> Option<ParameterSet> {
        if self.0.trim().is_empty() {
            return None;
        }
        let set: ParameterSet = serde_json::from_str(&self.0).ok()?;
        (!set.is_empty()).then_some(set)
    }

    /// Hex blake3 digest, used for file names and labels.
    pub fn digest(&self) -> String {
        blake3::hash(self.0.as_bytes()).to_hex().to_string()
    }

    pub fn short_digest(&self) -> String {
        self.digest()[..8].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
