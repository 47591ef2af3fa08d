// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Merging incoming attributes into a store's attribute mapping.
//!
//! Each key folds in according to its kind:
//!
//! - new keys are inserted
//! - lists gain the incoming elements they do not already hold
//! - mappings are updated key by key
//! - replace keys and scalars are overwritten
//! - timestamped collections drop incoming entries whose value already
//!   exists under another timestamp
//!
//! Timestamped collections come in two shapes. Prefixed collections are
//! top-level keys such as `profile_<ts>`; nested collections are a single
//! key holding `{field: {ts: value}}`, where the entries of one timestamp
//! across all fields form a column.

use fathom_core::{AttributeValue, StoreAttributes};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// How an attribute key folds into an existing value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Scalar,
    List,
    Mapping,
    TimestampedCollection,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixedCollection {
    pub prefix: String,
    /// Keys `<companion_prefix><ts>` dropped together with `<prefix><ts>`
    pub companion_prefix: Option<String>,
}

impl PrefixedCollection {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            companion_prefix: None,
        }
    }

    pub fn with_companion(mut self, prefix: impl Into<String>) -> Self {
        self.companion_prefix = Some(prefix.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeRules {
    pub prefixed_collections: Vec<PrefixedCollection>,
    pub nested_collections: Vec<String>,
    pub replace_keys: Vec<String>,
}

impl Default for MergeRules {
    fn default() -> Self {
        Self {
            prefixed_collections: vec![
                PrefixedCollection::new("profile_").with_companion("attributes_"),
                PrefixedCollection::new("install_"),
                PrefixedCollection::new("runtime_"),
            ],
            nested_collections: vec!["xyzrph".to_string()],
            replace_keys: vec!["status_lookup".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttributeMerger {
    rules: MergeRules,
}

impl AttributeMerger {
    pub fn new(rules: MergeRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &MergeRules {
        &self.rules
    }

    pub fn classify(&self, key: &str, value: &AttributeValue) -> AttributeKind {
        if self.rules.replace_keys.iter().any(|k| k == key) {
            return AttributeKind::Replace;
        }
        if self.rules.nested_collections.iter().any(|k| k == key)
            || self.prefixed_collection(key).is_some()
        {
            return AttributeKind::TimestampedCollection;
        }
        match value {
            AttributeValue::Scalar(_) => AttributeKind::Scalar,
            AttributeValue::List(_) => AttributeKind::List,
            AttributeValue::Mapping(_) => AttributeKind::Mapping,
        }
    }

    fn prefixed_collection(&self, key: &str) -> Option<&PrefixedCollection> {
        self.rules
            .prefixed_collections
            .iter()
            .find(|c| key.starts_with(&c.prefix) && key.len() > c.prefix.len())
    }

    /// Fold `incoming` into `existing`
    pub fn merge(&self, existing: &mut StoreAttributes, incoming: StoreAttributes) {
        let incoming = self.drop_duplicates(existing, incoming);

        for (key, value) in incoming {
            let kind = self.classify(&key, &value);
            if !existing.contains_key(&key) {
                existing.insert(key, value);
                continue;
            }
            let Some(current) = existing.get_mut(&key) else {
                continue;
            };
            match (kind, current, value) {
                (AttributeKind::List, AttributeValue::List(have), AttributeValue::List(new)) => {
                    for item in new {
                        if !have.contains(&item) {
                            have.push(item);
                        }
                    }
                }
                (
                    AttributeKind::Mapping | AttributeKind::TimestampedCollection,
                    AttributeValue::Mapping(have),
                    AttributeValue::Mapping(new),
                ) if self.rules.nested_collections.contains(&key) => {
                    merge_nested(have, new);
                }
                (
                    AttributeKind::Mapping,
                    AttributeValue::Mapping(have),
                    AttributeValue::Mapping(new),
                ) => {
                    for (k, v) in new {
                        have.insert(k, v);
                    }
                }
                (_, current, value) => *current = value,
            }
        }
    }

    fn drop_duplicates(
        &self,
        existing: &StoreAttributes,
        mut incoming: StoreAttributes,
    ) -> StoreAttributes {
        // prefixed collections: compare against every existing timestamp
        let mut dropped: Vec<String> = Vec::new();
        for (key, value) in &incoming {
            let Some(collection) = self.prefixed_collection(key) else {
                continue;
            };
            let duplicate = existing
                .iter()
                .filter(|(k, _)| k.starts_with(&collection.prefix))
                .any(|(_, v)| v == value);
            if duplicate {
                dropped.push(key.clone());
                if let Some(companion) = &collection.companion_prefix {
                    let stamp = &key[collection.prefix.len()..];
                    dropped.push(format!("{}{}", companion, stamp));
                }
            }
        }
        for key in &dropped {
            if incoming.remove(key).is_some() {
                tracing::debug!(key = %key, "Dropped duplicate attribute entry");
            }
        }

        for key in &self.rules.nested_collections {
            let Some(AttributeValue::Mapping(new)) = incoming.get_mut(key) else {
                continue;
            };
            if let Some(AttributeValue::Mapping(have)) = existing.get(key) {
                drop_duplicate_columns(have, new);
            }
            let empty = new
                .values()
                .all(|v| v.as_object().map(|o| o.is_empty()).unwrap_or(false));
            if empty {
                incoming.remove(key);
                tracing::debug!(key = %key, "Dropped collection with no new entries");
            }
        }

        incoming
    }
}

/// Timestamps present in any field of a nested collection
fn timestamps(collection: &Map<String, Value>) -> BTreeSet<String> {
    collection
        .values()
        .filter_map(|v| v.as_object())
        .flat_map(|o| o.keys().cloned())
        .collect()
}

/// The entries of one timestamp across all fields
fn column(collection: &Map<String, Value>, stamp: &str) -> BTreeMap<String, Value> {
    collection
        .iter()
        .filter_map(|(field, entries)| {
            entries
                .as_object()
                .and_then(|o| o.get(stamp))
                .map(|v| (field.clone(), v.clone()))
        })
        .collect()
}

fn drop_duplicate_columns(existing: &Map<String, Value>, incoming: &mut Map<String, Value>) {
    let known: Vec<BTreeMap<String, Value>> = timestamps(existing)
        .iter()
        .map(|stamp| column(existing, stamp))
        .collect();

    for stamp in timestamps(incoming) {
        let candidate = column(incoming, &stamp);
        if known.contains(&candidate) {
            for entries in incoming.values_mut() {
                if let Some(o) = entries.as_object_mut() {
                    o.remove(&stamp);
                }
            }
            tracing::debug!(timestamp = %stamp, "Dropped duplicate collection column");
        }
    }
}

fn merge_nested(existing: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (field, entries) in incoming {
        match (existing.get_mut(&field), entries) {
            (Some(Value::Object(have)), Value::Object(new)) => {
                for (stamp, value) in new {
                    have.insert(stamp, value);
                }
            }
            (_, entries) => {
                existing.insert(field, entries);
            }
        }
    }
}
