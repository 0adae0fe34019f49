//! Persisted state documents and typed access to their attributes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Untyped attribute mapping (sorted keys, so serialized state is stable).
pub type Attrs = serde_json::Map<String, Json>;

/// Key the resource id lives under in persisted attributes.
pub const ID_KEY: &str = "id";

/// A resource's last-persisted shape tagged with the schema version it was written at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDoc {
    pub version: u32,
    pub attrs: Attrs,
}

impl StateDoc {
    pub fn new(version: u32, attrs: Attrs) -> Self {
        Self { version, attrs }
    }

    /// Build from a JSON object literal; non-objects produce an empty document.
    pub fn from_json(version: u32, value: Json) -> Self {
        match value {
            Json::Object(attrs) => Self { version, attrs },
            _ => Self { version, attrs: Attrs::new() },
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attrs.str_attr(ID_KEY).filter(|s| !s.is_empty())
    }
}

/// Presence-checked getters over [`Attrs`]. Missing keys and `null` read the same.
pub trait AttrsExt {
    fn present(&self, key: &str) -> Option<&Json>;
    fn str_attr(&self, key: &str) -> Option<&str>;
    fn bool_attr(&self, key: &str) -> Option<bool>;
    fn string_list(&self, key: &str) -> Vec<String>;
    fn string_set(&self, key: &str) -> BTreeSet<String>;
    /// First element of a single-item block list (`vcs_repo = [{..}]`).
    fn block(&self, key: &str) -> Option<&Attrs>;
}

impl AttrsExt for Attrs {
    fn present(&self, key: &str) -> Option<&Json> {
        self.get(key).filter(|v| !v.is_null())
    }

    fn str_attr(&self, key: &str) -> Option<&str> {
        self.present(key).and_then(|v| v.as_str())
    }

    fn bool_attr(&self, key: &str) -> Option<bool> {
        self.present(key).and_then(|v| v.as_bool())
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        self.present(key)
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    fn string_set(&self, key: &str) -> BTreeSet<String> {
        self.string_list(key).into_iter().collect()
    }

    fn block(&self, key: &str) -> Option<&Attrs> {
        self.present(key)
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_object())
    }
}

/// JSON array of strings, the shape list and set attributes are stored in.
pub fn string_array<I, S>(items: I) -> Json
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Json::Array(items.into_iter().map(|s| Json::String(s.into())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn getters_treat_null_as_absent() {
        let doc = StateDoc::from_json(0, json!({
            "id": "env-1",
            "name": null,
            "enabled": true,
            "tag_ids": ["b", "a", "b"],
            "vcs_repo": [{ "identifier": "org/repo" }]
        }));
        assert_eq!(doc.id(), Some("env-1"));
        assert_eq!(doc.attrs.str_attr("name"), None);
        assert_eq!(doc.attrs.bool_attr("enabled"), Some(true));
        assert_eq!(doc.attrs.string_list("tag_ids"), vec!["b", "a", "b"]);
        assert_eq!(doc.attrs.string_set("tag_ids").len(), 2);
        assert_eq!(doc.attrs.block("vcs_repo").and_then(|b| b.str_attr("identifier")), Some("org/repo"));
    }

    #[test]
    fn empty_id_counts_as_absent() {
        let doc = StateDoc::from_json(1, json!({ "id": "" }));
        assert_eq!(doc.id(), None);
        assert!(StateDoc::from_json(1, json!([1, 2])).attrs.is_empty());
    }
}
