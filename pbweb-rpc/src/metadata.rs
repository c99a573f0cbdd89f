//! Request and response metadata.

use bytes::Bytes;

/// A single metadata value.
///
/// Keys ending in `-bin` carry binary values, base64-encoded on the wire and
/// raw bytes here. Every other key carries ASCII text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataValue {
    Ascii(String),
    Binary(Bytes),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Ascii(s) => Some(s),
            MetadataValue::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MetadataValue::Ascii(s) => s.as_bytes(),
            MetadataValue::Binary(b) => b,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Ascii(s.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Ascii(s)
    }
}

impl From<Bytes> for MetadataValue {
    fn from(b: Bytes) -> Self {
        MetadataValue::Binary(b)
    }
}

/// An ordered multimap of metadata entries.
///
/// Keys are case-insensitive and stored lowercased. A key may appear with
/// several values; values keep insertion order, which is the order repeated
/// headers arrived on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, MetadataValue)>,
}

/// Whether values under this key are binary (base64 on the wire).
pub fn is_binary_key(key: &str) -> bool {
    key.ends_with("-bin")
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, keeping any existing values under the same key.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> &mut Self {
        self.entries
            .push((key.into().to_ascii_lowercase(), value.into()));
        self
    }

    /// Replace all values under `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> &mut Self {
        let key = key.into().to_ascii_lowercase();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value.into()));
        self
    }

    /// Remove every value under `key`.
    pub fn remove(&mut self, key: &str) -> &mut Self {
        let key = key.to_ascii_lowercase();
        self.entries.retain(|(k, _)| *k != key);
        self
    }

    /// The first value under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        let key = key.to_ascii_lowercase();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// The first ASCII value under `key`, if any.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// All values under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a MetadataValue> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The distinct keys, in first-appearance order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let mut seen: Vec<&str> = Vec::new();
        self.entries.iter().filter_map(move |(k, _)| {
            if seen.contains(&k.as_str()) {
                None
            } else {
                seen.push(k.as_str());
                Some(k.as_str())
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `overrides` into `self`: any key present in `overrides`
    /// replaces all of that key's values in `self`; other keys keep theirs.
    pub fn merge(&mut self, overrides: &Metadata) {
        for key in overrides.keys().map(str::to_owned).collect::<Vec<_>>() {
            self.entries.retain(|(k, _)| *k != key);
        }
        for (k, v) in overrides.iter() {
            self.entries.push((k.to_owned(), v.clone()));
        }
    }
}

impl<K: Into<String>, V: Into<MetadataValue>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut meta = Metadata::new();
        for (k, v) in iter {
            meta.append(k, v);
        }
        meta
    }
}
