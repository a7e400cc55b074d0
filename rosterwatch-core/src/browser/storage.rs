use serde::Deserialize;
use serde_json::Value;

use super::error::{BrowserError, BrowserResult};

/// Dumps `localStorage` as an ordered list of pairs. A JSON object would lose
/// the enumeration order once it reaches `serde_json::Map`.
pub const READ_STORAGE_SCRIPT: &str = r#"
(() => {
    const out = { entries: [], error: null };
    try {
        for (let i = 0; i < localStorage.length; i++) {
            const key = localStorage.key(i);
            out.entries.push([key, localStorage.getItem(key)]);
        }
    } catch (e) {
        out.error = String(e);
    }
    return out;
})()
"#;

/// Key/value pairs read from client-side storage at one instant, in the order
/// the page enumerated them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageSnapshot {
    entries: Vec<(String, String)>,
}

impl StorageSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry; a key already present keeps its position and takes
    /// the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

impl<K, V> FromIterator<(K, V)> for StorageSnapshot
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut snapshot = StorageSnapshot::new();
        for (key, value) in iter {
            snapshot.insert(key, value);
        }
        snapshot
    }
}

#[derive(Debug, Deserialize)]
struct StoragePayload {
    #[serde(default)]
    entries: Vec<(String, Option<String>)>,
    error: Option<String>,
}

/// Decodes the value returned by [`READ_STORAGE_SCRIPT`].
pub fn decode_storage_payload(value: Value) -> BrowserResult<StorageSnapshot> {
    let payload: StoragePayload = serde_json::from_value(value).map_err(|err| {
        BrowserError::Storage(format!("unexpected storage dump: {err}"))
    })?;
    if let Some(error) = payload.error {
        return Err(BrowserError::Storage(format!("script error: {error}")));
    }
    Ok(payload
        .entries
        .into_iter()
        // getItem returns null when the key vanished mid-enumeration
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect())
}
