//! Defaults merge for Kubernetes objects
//!
//! Objects are merged through their JSON form: `base` keeps every value it
//! already has and only takes values from `defaults` where it has none. Lists
//! of named objects (containers, volumes, claim templates) are matched by
//! name, so a generated container picks up defaults from the live container
//! of the same name without the lists ever growing.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{EngineError, Result};

/// What counts as "missing" in the base value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Absent, null, empty strings, empty lists and empty maps are all filled
    Empty,
    /// Only absent or null values are filled, and whole lists are never added
    Absent,
}

/// Merge `defaults` into a copy of `base`
pub fn merge_defaults<T>(what: &str, base: &T, defaults: &T, fill: Fill) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let to_json = |value: &T| {
        serde_json::to_value(value).map_err(|source| EngineError::Merge {
            what: what.to_string(),
            source,
        })
    };

    let mut merged = to_json(base)?;
    fill_value(&mut merged, &to_json(defaults)?, fill);

    serde_json::from_value(merged).map_err(|source| EngineError::Merge {
        what: what.to_string(),
        source,
    })
}

fn fill_value(base: &mut JsonValue, defaults: &JsonValue, fill: Fill) {
    if is_missing(base, fill) {
        *base = defaults.clone();
        return;
    }

    match (base, defaults) {
        (JsonValue::Object(base_map), JsonValue::Object(default_map)) => {
            for (key, default_value) in default_map {
                match base_map.get_mut(key) {
                    Some(base_value) => fill_value(base_value, default_value, fill),
                    None if fill == Fill::Absent && default_value.is_array() => {}
                    None => {
                        base_map.insert(key.clone(), default_value.clone());
                    }
                }
            }
        }
        (JsonValue::Array(base_items), JsonValue::Array(default_items)) => {
            for item in base_items.iter_mut() {
                let Some(name) = item_name(item).map(str::to_string) else {
                    continue;
                };
                if let Some(default_item) = default_items
                    .iter()
                    .find(|d| item_name(d) == Some(name.as_str()))
                {
                    fill_value(item, default_item, fill);
                }
            }
        }
        _ => {}
    }
}

fn is_missing(value: &JsonValue, fill: Fill) -> bool {
    match (value, fill) {
        (JsonValue::Null, _) => true,
        (JsonValue::String(s), Fill::Empty) => s.is_empty(),
        (JsonValue::Array(a), Fill::Empty) => a.is_empty(),
        (JsonValue::Object(o), Fill::Empty) => o.is_empty(),
        _ => false,
    }
}

/// `name`, or `metadata.name` for embedded objects such as claim templates
fn item_name(value: &JsonValue) -> Option<&str> {
    value
        .get("name")
        .or_else(|| value.pointer("/metadata/name"))
        .and_then(JsonValue::as_str)
}
