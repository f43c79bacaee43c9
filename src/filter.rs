//! Subscription filter model.

use std::collections::BTreeMap;

use serde_json::Value;

/// Caller-supplied set of optional match criteria describing which events a
/// subscription wants.
///
/// Every criterion is independently optional; an absent criterion is
/// unrestricted, while a present-but-empty one deliberately matches nothing
/// (see [`crate::query::plan`]). `since`/`until` are open time-range bounds
/// applied only when set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Candidate event identifiers (hex, untrusted until sanitized).
    pub ids: Option<Vec<String>>,
    /// Candidate author public keys (hex, untrusted until sanitized).
    pub authors: Option<Vec<String>>,
    /// Acceptable kind numbers.
    pub kinds: Option<Vec<u32>>,
    /// Tag criteria keyed by tag name without the `#` prefix. A `BTreeMap`
    /// keeps the flattened value order stable so the generated query text is
    /// deterministic.
    pub tags: BTreeMap<String, Vec<String>>,
    /// Only match events created strictly after this Unix timestamp.
    pub since: Option<i64>,
    /// Only match events created strictly before this Unix timestamp.
    pub until: Option<i64>,
}

impl Filter {
    /// Build a `Filter` from a Nostr filter JSON object.
    ///
    /// Decoding is tolerant: entries of the wrong JSON type are skipped and
    /// unknown keys are ignored, except that any key starting with `#` is
    /// treated as a tag criterion. Example input:
    ///
    /// ```json
    /// {"authors": ["ab..."], "kinds": [1, 30023], "#t": ["news"], "since": 1700000000}
    /// ```
    pub fn from_value(val: &Value) -> Self {
        let ids = str_array(val.get("ids"));
        let authors = str_array(val.get("authors"));
        let kinds = val.get("kinds").and_then(|v| v.as_array()).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_u64().map(|u| u as u32))
                .collect()
        });
        let mut tags = BTreeMap::new();
        if let Some(obj) = val.as_object() {
            for (key, v) in obj {
                if let Some(name) = key.strip_prefix('#') {
                    let values = v
                        .as_array()
                        .map(|arr| {
                            arr.iter()
                                .filter_map(|x| x.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    tags.insert(name.to_string(), values);
                }
            }
        }
        let since = val.get("since").and_then(|v| v.as_i64());
        let until = val.get("until").and_then(|v| v.as_i64());
        Filter {
            ids,
            authors,
            kinds,
            tags,
            since,
            until,
        }
    }
}

/// Parse an optional JSON array of strings, skipping non-string entries.
fn str_array(val: Option<&Value>) -> Option<Vec<String>> {
    val.and_then(|v| v.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}
