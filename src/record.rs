//! Records, version vectors and document snapshots

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A uniquely identified, typed unit of document data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable, globally unique identifier (e.g. "shape:abc")
    pub id: String,
    /// Record type; immutable once the record exists
    pub type_name: String,
    /// Property bag checked by the type's contract
    #[serde(default)]
    pub props: Map<String, Value>,
}

impl Record {
    /// Create a record from an id, a type name and a JSON object of props.
    ///
    /// Non-object `props` values produce an empty property bag.
    pub fn new(id: impl Into<String>, type_name: impl Into<String>, props: Value) -> Self {
        let props = match props {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            type_name: type_name.into(),
            props,
        }
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Return the record with `key` set to `value`
    pub fn with_prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    /// Return the record with `key` removed
    pub fn without_prop(mut self, key: &str) -> Self {
        self.props.remove(key);
        self
    }

    /// Return the record with a different type name.
    ///
    /// Only store-level migrations may do this.
    pub fn retyped(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }
}

/// The unit a migration sequence applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKey {
    /// Whole-document migrations
    Store,
    /// Migrations of one record type
    RecordType(String),
}

impl ScopeKey {
    pub fn record_type(type_name: impl Into<String>) -> Self {
        ScopeKey::RecordType(type_name.into())
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Store => write!(f, "store"),
            ScopeKey::RecordType(name) => write!(f, "record type '{}'", name),
        }
    }
}

/// Per-scope schema versions carried alongside a snapshot.
///
/// Missing entries read as version 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    /// Version of the store scope
    #[serde(default)]
    pub store: u32,
    /// Version of each record type
    #[serde(default)]
    pub records: BTreeMap<String, u32>,
}

impl VersionVector {
    pub fn new(store: u32) -> Self {
        Self {
            store,
            records: BTreeMap::new(),
        }
    }

    /// Builder-style setter for a record type entry
    pub fn with_type(mut self, type_name: impl Into<String>, version: u32) -> Self {
        self.records.insert(type_name.into(), version);
        self
    }

    pub fn get(&self, scope: &ScopeKey) -> u32 {
        match scope {
            ScopeKey::Store => self.store,
            ScopeKey::RecordType(name) => self.type_version(name),
        }
    }

    pub fn type_version(&self, type_name: &str) -> u32 {
        self.records.get(type_name).copied().unwrap_or(0)
    }

    pub fn set(&mut self, scope: ScopeKey, version: u32) {
        match scope {
            ScopeKey::Store => self.store = version,
            ScopeKey::RecordType(name) => {
                self.records.insert(name, version);
            }
        }
    }

    /// Remove a record type entry, returning its version if present
    pub fn remove_type(&mut self, type_name: &str) -> Option<u32> {
        self.records.remove(type_name)
    }

    /// All explicit entries, store first
    pub fn entries(&self) -> impl Iterator<Item = (ScopeKey, u32)> + '_ {
        std::iter::once((ScopeKey::Store, self.store)).chain(
            self.records
                .iter()
                .map(|(name, version)| (ScopeKey::RecordType(name.clone()), *version)),
        )
    }
}

/// The full state of a document subject to migration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub records: Vec<Record>,
    #[serde(default)]
    pub versions: VersionVector,
}

impl Snapshot {
    pub fn new(records: Vec<Record>, versions: VersionVector) -> Self {
        Self { records, versions }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Find a record by id
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Copy of this snapshot without records of the given type
    pub fn without_type(&self, type_name: &str) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|r| r.type_name != type_name)
                .cloned()
                .collect(),
            versions: self.versions.clone(),
        }
    }
}

/// Record positions grouped by type name, each group in original order
pub fn partition_by_type(records: &[Record]) -> BTreeMap<&str, Vec<usize>> {
    let mut partitions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        partitions
            .entry(record.type_name.as_str())
            .or_default()
            .push(index);
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serde_shape() {
        let record = Record::new("page:1", "page", json!({"name": "Page 1"}));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"id": "page:1", "typeName": "page", "props": {"name": "Page 1"}})
        );
    }

    #[test]
    fn test_missing_entries_default_to_zero() {
        let versions = VersionVector::new(2).with_type("video", 1);
        assert_eq!(versions.get(&ScopeKey::Store), 2);
        assert_eq!(versions.type_version("video"), 1);
        assert_eq!(versions.type_version("image"), 0);

        let parsed: VersionVector = serde_json::from_value(json!({})).unwrap();
        assert_eq!(parsed, VersionVector::default());
    }

    #[test]
    fn test_partition_preserves_positions() {
        let snapshot = Snapshot::new(
            vec![
                Record::new("video:1", "video", json!({})),
                Record::new("page:1", "page", json!({})),
                Record::new("video:2", "video", json!({})),
            ],
            VersionVector::default(),
        );
        let partitions = partition_by_type(&snapshot.records);
        assert_eq!(partitions["video"], vec![0, 2]);
        assert_eq!(partitions["page"], vec![1]);
    }

    #[test]
    fn test_prop_helpers() {
        let record = Record::new("image:1", "image", json!({"url": "a.png", "src": "a.png"}))
            .without_prop("src")
            .with_prop("crop", Value::Null)
            .without_prop("missing");
        assert_eq!(record.prop("url"), Some(&json!("a.png")));
        assert_eq!(record.prop("crop"), Some(&Value::Null));
        assert!(record.prop("src").is_none());
    }
}
