//! Filter clauses and the comparisons the synchronizer relies on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterStateStore {
    #[serde(rename = "appState")]
    AppState,
    #[serde(rename = "globalState")]
    GlobalState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub store: FilterStateStore,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub negate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlled_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// A single filter clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub meta: FilterMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default, rename = "$state", skip_serializing_if = "Option::is_none")]
    pub state: Option<FilterState>,
    /// Top-level clause bodies of older filters (`range`, `exists`, `script`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Filter {
    /// Pinned filters live in the global store and follow the user across apps.
    pub fn is_pinned(&self) -> bool {
        matches!(
            self.state,
            Some(FilterState {
                store: FilterStateStore::GlobalState
            })
        )
    }

    pub fn pin(mut self) -> Self {
        self.state = Some(FilterState {
            store: FilterStateStore::GlobalState,
        });
        self
    }

    pub fn unpin(mut self) -> Self {
        self.state = Some(FilterState {
            store: FilterStateStore::AppState,
        });
        self
    }
}

/// The parts of a filter that count when comparing with all options enabled.
///
/// Meta fields other than `index`, `negate`, `disabled` and `alias` are
/// display metadata and never make two filters differ.
#[derive(Debug, PartialEq)]
struct Fingerprint<'a> {
    query: Option<&'a Value>,
    extra: &'a Map<String, Value>,
    state: Option<FilterState>,
    index: Option<&'a str>,
    negate: bool,
    disabled: bool,
    alias: Option<&'a str>,
}

impl<'a> From<&'a Filter> for Fingerprint<'a> {
    fn from(filter: &'a Filter) -> Self {
        Fingerprint {
            query: filter.query.as_ref(),
            extra: &filter.extra,
            state: filter.state,
            index: filter.meta.index.as_deref(),
            negate: filter.meta.negate,
            disabled: filter.meta.disabled,
            alias: filter.meta.alias.as_deref(),
        }
    }
}

/// Compare two filter lists as multisets of fingerprints.
///
/// Order is ignored; duplicates must match in count.
pub fn compare_filters(first: &[Filter], second: &[Filter]) -> bool {
    if first.len() != second.len() {
        return false;
    }
    let mut unmatched: Vec<Fingerprint<'_>> = second.iter().map(Fingerprint::from).collect();
    for filter in first {
        let fingerprint = Fingerprint::from(filter);
        match unmatched.iter().position(|other| *other == fingerprint) {
            Some(idx) => {
                unmatched.swap_remove(idx);
            }
            None => return false,
        }
    }
    true
}

/// Filters without pinned entries, preserving order.
pub fn strip_pinned(filters: &[Filter]) -> Vec<Filter> {
    filters.iter().filter(|f| !f.is_pinned()).cloned().collect()
}

/// Only the pinned entries, preserving order.
pub fn pinned_only(filters: &[Filter]) -> Vec<Filter> {
    filters.iter().filter(|f| f.is_pinned()).cloned().collect()
}

/// `filters` preceded by the pinned entries of `from` it does not already
/// hold.
pub fn with_missing_pinned(filters: &[Filter], from: &[Filter]) -> Vec<Filter> {
    let mut merged: Vec<Filter> = from
        .iter()
        .filter(|candidate| {
            candidate.is_pinned()
                && !filters
                    .iter()
                    .any(|f| Fingerprint::from(f) == Fingerprint::from(*candidate))
        })
        .cloned()
        .collect();
    merged.extend(filters.iter().cloned());
    merged
}

/// Drop `meta.value`, which is derived display data and must not be stored.
pub fn clean_filters_for_serialize(filters: Vec<Filter>) -> Vec<Filter> {
    filters
        .into_iter()
        .map(|mut filter| {
            filter.meta.value = None;
            filter
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn phrase(field: &str, value: &str) -> Filter {
        Filter {
            meta: FilterMeta {
                key: Some(field.to_string()),
                index: Some("logs-*".to_string()),
                ..FilterMeta::default()
            },
            query: Some(json!({ "match_phrase": { field: value } })),
            ..Filter::default()
        }
    }

    #[test]
    fn pinned_means_global_store() {
        assert!(!phrase("host", "a").is_pinned());
        assert!(!phrase("host", "a").unpin().is_pinned());
        assert!(phrase("host", "a").pin().is_pinned());
    }

    #[test]
    fn compare_ignores_order_and_display_meta() {
        let mut labelled = phrase("host", "a");
        labelled.meta.value = Some(json!("a"));
        labelled.meta.key = Some("renamed".to_string());

        let left = vec![labelled, phrase("service", "api")];
        let right = vec![phrase("service", "api"), phrase("host", "a")];
        assert!(compare_filters(&left, &right));
    }

    #[test]
    fn compare_respects_negate_disabled_and_duplicates() {
        let mut negated = phrase("host", "a");
        negated.meta.negate = true;
        assert!(!compare_filters(&[negated], &[phrase("host", "a")]));

        let mut disabled = phrase("host", "a");
        disabled.meta.disabled = true;
        assert!(!compare_filters(&[disabled], &[phrase("host", "a")]));

        let twice = vec![phrase("host", "a"), phrase("host", "a")];
        let mixed = vec![phrase("host", "a"), phrase("host", "b")];
        assert!(!compare_filters(&twice, &mixed));
    }

    #[test]
    fn compare_sees_store_difference() {
        assert!(!compare_filters(
            &[phrase("host", "a").pin()],
            &[phrase("host", "a").unpin()]
        ));
    }

    #[test]
    fn clean_drops_meta_value_only() {
        let mut filter = phrase("host", "a");
        filter.meta.value = Some(json!("a"));
        let cleaned = clean_filters_for_serialize(vec![filter]);
        assert_eq!(cleaned, vec![phrase("host", "a")]);
    }

    #[test]
    fn missing_pinned_filters_are_prepended_once() {
        let local = vec![phrase("host", "a").pin(), phrase("service", "api")];
        let service = vec![
            phrase("host", "a").pin(),
            phrase("env", "prod").pin(),
            phrase("other", "x"),
        ];
        let merged = with_missing_pinned(&local, &service);
        assert_eq!(
            merged,
            vec![
                phrase("env", "prod").pin(),
                phrase("host", "a").pin(),
                phrase("service", "api"),
            ]
        );
    }

    #[test]
    fn legacy_top_level_clause_survives_and_counts() {
        let raw = json!({
            "meta": { "disabled": false, "negate": false },
            "range": { "bytes": { "gte": 10 } }
        });
        let parsed: Filter = serde_json::from_value(raw.clone()).expect("parse");
        assert_eq!(parsed.extra["range"], raw["range"]);
        assert_eq!(serde_json::to_value(&parsed).expect("encode")["range"], raw["range"]);

        let mut wider = parsed.clone();
        wider.extra["range"] = json!({ "bytes": { "gte": 20 } });
        assert!(!compare_filters(&[parsed], &[wider]));
    }

    #[test]
    fn state_field_round_trips_with_dollar_name() {
        let parsed: Filter = serde_json::from_value(json!({
            "meta": { "disabled": false, "negate": false },
            "$state": { "store": "globalState" }
        }))
        .expect("parse");
        assert!(parsed.is_pinned());
    }
}
