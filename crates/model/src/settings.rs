//! Flat settings bags
//!
//! Cluster-wide and per-index configuration is carried as a flat, sorted
//! `key -> string` map. The flat form is what travels on the wire; the
//! document form nests keys on `.` so `index.number_of_shards` renders as
//! `{"index": {"number_of_shards": ...}}`.
//!
//! Settings are immutable after construction; mutation goes through
//! [`Settings::builder`].

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use clustermeta_core::error::{MetadataError, Result};
use clustermeta_core::simple_diffable;
use clustermeta_core::version::TransportVersion;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

/// Well-known setting keys
pub mod keys {
    /// Number of primary shards of an index
    pub const NUMBER_OF_SHARDS: &str = "index.number_of_shards";
    /// Number of replica copies per primary
    pub const NUMBER_OF_REPLICAS: &str = "index.number_of_replicas";
    /// Whether the index is hidden from wildcard resolution
    pub const INDEX_HIDDEN: &str = "index.hidden";
    /// Transport version the index was created at
    pub const VERSION_CREATED: &str = "index.version.created";
    /// Oldest transport version the index is compatible with
    pub const VERSION_COMPATIBILITY: &str = "index.version.compatibility";
    /// The index uuid
    pub const INDEX_UUID: &str = "index.uuid";
    /// Routing partition size
    pub const ROUTING_PARTITION_SIZE: &str = "index.routing_partition_size";
}

/// An immutable, sorted key/value settings bag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    map: BTreeMap<String, String>,
}

simple_diffable!(Settings);

impl Settings {
    /// The empty bag
    pub fn empty() -> Settings {
        Settings::default()
    }

    /// Start building a settings bag
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder {
            map: BTreeMap::new(),
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the bag is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Raw string value for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Parse a value as u32
    pub fn get_as_u32(&self, key: &str, default: u32) -> Result<u32> {
        match self.map.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                MetadataError::InvalidInput(format!(
                    "failed to parse value [{}] for setting [{}]",
                    raw, key
                ))
            }),
        }
    }

    /// Parse a value as i64
    pub fn get_as_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.map.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                MetadataError::InvalidInput(format!(
                    "failed to parse value [{}] for setting [{}]",
                    raw, key
                ))
            }),
        }
    }

    /// Parse a value as bool (`true` / `false`)
    pub fn get_as_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.map.get(key) {
            None => Ok(default),
            Some(raw) => match raw.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(MetadataError::InvalidInput(format!(
                    "failed to parse value [{}] for setting [{}], expected true or false",
                    other, key
                ))),
            },
        }
    }

    /// Parse a value as a transport version id
    pub fn get_as_version(&self, key: &str, default: TransportVersion) -> Result<TransportVersion> {
        Ok(TransportVersion(
            self.get_as_u32(key, default.id())?,
        ))
    }

    /// Sub-bag of every key starting with `prefix`
    pub fn filter_by_prefix(&self, prefix: &str) -> Settings {
        Settings {
            map: self
                .map
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Merge `other` over `self` (other wins on conflicts)
    pub fn merged_with(&self, other: &Settings) -> Settings {
        let mut map = self.map.clone();
        for (k, v) in &other.map {
            map.insert(k.clone(), v.clone());
        }
        Settings { map }
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as a nested JSON object, splitting keys on `.`
    pub fn to_nested_json(&self) -> serde_json::Value {
        let mut root = serde_json::Map::new();
        for (key, value) in &self.map {
            let parts: Vec<&str> = key.split('.').collect();
            insert_nested(&mut root, &parts, value);
        }
        serde_json::Value::Object(root)
    }

    /// Parse a nested JSON object back into a flat bag
    pub fn from_nested_json(value: &serde_json::Value) -> Result<Settings> {
        let mut builder = Settings::builder();
        if let serde_json::Value::Object(map) = value {
            flatten_into(&mut builder, "", map)?;
        } else if !value.is_null() {
            return Err(MetadataError::CorruptMetadata(
                "settings must be an object".to_string(),
            ));
        }
        Ok(builder.build())
    }
}

fn insert_nested(target: &mut serde_json::Map<String, serde_json::Value>, parts: &[&str], value: &str) {
    if parts.len() == 1 {
        target.insert(parts[0].to_string(), serde_json::Value::String(value.to_string()));
        return;
    }
    let child = target
        .entry(parts[0].to_string())
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    if let serde_json::Value::Object(child_map) = child {
        insert_nested(child_map, &parts[1..], value);
    } else {
        // A leaf and an object collide on the same path; the object wins
        // and the leaf is re-seated one level down under an empty key.
        let mut child_map = serde_json::Map::new();
        insert_nested(&mut child_map, &parts[1..], value);
        *child = serde_json::Value::Object(child_map);
    }
}

fn flatten_into(
    builder: &mut SettingsBuilder,
    prefix: &str,
    map: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    for (key, value) in map {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            serde_json::Value::Object(child) => flatten_into(builder, &full, child)?,
            serde_json::Value::String(s) => {
                builder.put(&full, s);
            }
            serde_json::Value::Number(n) => {
                builder.put(&full, &n.to_string());
            }
            serde_json::Value::Bool(b) => {
                builder.put(&full, if *b { "true" } else { "false" });
            }
            other => {
                return Err(MetadataError::CorruptMetadata(format!(
                    "unexpected settings value [{}] at [{}]",
                    other, full
                )))
            }
        }
    }
    Ok(())
}

impl WireWritable for Settings {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string_map(&self.map)
    }
}

impl WireReadable for Settings {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(Settings {
            map: input.read_string_map()?,
        })
    }
}

/// Builder for [`Settings`]
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    map: BTreeMap<String, String>,
}

impl SettingsBuilder {
    /// Set a string value
    pub fn put(&mut self, key: &str, value: &str) -> &mut Self {
        self.map.insert(key.to_string(), value.to_string());
        self
    }

    /// Set a numeric value
    pub fn put_u32(&mut self, key: &str, value: u32) -> &mut Self {
        self.put(key, &value.to_string())
    }

    /// Set an i64 value
    pub fn put_i64(&mut self, key: &str, value: i64) -> &mut Self {
        self.put(key, &value.to_string())
    }

    /// Set a bool value
    pub fn put_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.put(key, if value { "true" } else { "false" })
    }

    /// Copy every entry of `settings` into the builder
    pub fn put_all(&mut self, settings: &Settings) -> &mut Self {
        for (k, v) in settings.iter() {
            self.map.insert(k.to_string(), v.to_string());
        }
        self
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.map.remove(key);
        self
    }

    /// Freeze into an immutable bag
    pub fn build(&self) -> Settings {
        Settings {
            map: self.map.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
