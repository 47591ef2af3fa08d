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

//! Store-level attribute values

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute mapping persisted alongside a store
pub type StoreAttributes = BTreeMap<String, AttributeValue>;

/// A single attribute value.
///
/// The variant decides how an incoming value folds into an existing one;
/// lists and mappings may hold arbitrary nested JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    List(Vec<Value>),
    Mapping(Map<String, Value>),
    Scalar(Value),
}

impl AttributeValue {
    pub fn as_mapping(&self) -> Option<&Map<String, Value>> {
        match self {
            AttributeValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            AttributeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            AttributeValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(list) => AttributeValue::List(list),
            Value::Object(map) => AttributeValue::Mapping(map),
            other => AttributeValue::Scalar(other),
        }
    }
}

impl From<AttributeValue> for Value {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::List(list) => Value::Array(list),
            AttributeValue::Mapping(map) => Value::Object(map),
            AttributeValue::Scalar(v) => v,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Scalar(Value::String(value.to_string()))
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Scalar(Value::String(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Scalar(Value::from(value))
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Scalar(Value::from(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Scalar(Value::Bool(value))
    }
}

/// Build a [`StoreAttributes`] map from a JSON object literal
pub fn attributes_from_json(value: Value) -> StoreAttributes {
    match value {
        Value::Object(map) => map.into_iter().map(|(k, v)| (k, v.into())).collect(),
        _ => StoreAttributes::new(),
    }
}
