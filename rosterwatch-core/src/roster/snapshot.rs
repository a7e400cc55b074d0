use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type EntityId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub label: String,
}

impl EntityRecord {
    pub fn new(id: impl Into<EntityId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Entity id to display label, ordered by id. Serialises as a plain JSON
/// object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitySnapshot(BTreeMap<EntityId, String>);

impl EntitySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: EntityRecord) -> Option<String> {
        self.0.insert(record.id, record.label)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(id, label)| (id.as_str(), label.as_str()))
    }
}

impl FromIterator<EntityRecord> for EntitySnapshot {
    fn from_iter<I: IntoIterator<Item = EntityRecord>>(iter: I) -> Self {
        let mut snapshot = EntitySnapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

impl<K, V> FromIterator<(K, V)> for EntitySnapshot
where
    K: Into<EntityId>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(id, label)| EntityRecord::new(id, label))
            .collect()
    }
}
