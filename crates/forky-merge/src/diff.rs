//! Pure semantic diff between two state records.
//!
//! Item equality is string equality after trimming and case-folding. The
//! "same item, rewritten" heuristic compares *handles*: the leading five
//! tokens after splitting on whitespace and punctuation. A base/side pair
//! whose handles match but whose texts differ becomes a `changed` entry
//! and is excluded from `added`/`removed`, so downstream conflict kinds
//! stay disjoint.

use std::collections::BTreeMap;

use forky_core::state::{Category, ChangedItem, StateDiff, StateRecord};

/// Canonical form used for item equality.
pub fn normalize(item: &str) -> String {
    item.trim().to_lowercase()
}

/// The leading five tokens of an item, lowercased; tokens are maximal runs
/// of alphanumeric characters.
pub fn handle(item: &str) -> String {
    item.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .take(5)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compute the per-category diff from `base` to `side`.
pub fn diff(base: &StateRecord, side: &StateRecord) -> StateDiff {
    let mut result = StateDiff::default();
    for category in Category::ALL {
        let (added, removed, changed) = diff_category(base.items(category), side.items(category));
        if !added.is_empty() {
            let _ = result.added.insert(category, added);
        }
        if !removed.is_empty() {
            let _ = result.removed.insert(category, removed);
        }
        if !changed.is_empty() {
            let _ = result.changed.insert(category, changed);
        }
    }
    result
}

fn diff_category(
    base: &[String],
    side: &[String],
) -> (Vec<String>, Vec<String>, Vec<ChangedItem>) {
    let base_norms: Vec<String> = base.iter().map(|s| normalize(s)).collect();
    let side_norms: Vec<String> = side.iter().map(|s| normalize(s)).collect();

    // Raw set differences first, preserving input order.
    let mut removed: Vec<&String> =
        base.iter().zip(&base_norms).filter(|(_, n)| !side_norms.contains(n)).map(|(s, _)| s).collect();
    let mut added: Vec<&String> =
        side.iter().zip(&side_norms).filter(|(_, n)| !base_norms.contains(n)).map(|(s, _)| s).collect();

    // Pair up removed/added items that share a handle: those are rewrites,
    // reported once as `changed`.
    let mut changed: Vec<ChangedItem> = Vec::new();
    let mut consumed: Vec<usize> = Vec::new();
    removed.retain(|base_item| {
        let base_handle = handle(base_item);
        for (i, side_item) in added.iter().enumerate() {
            if consumed.contains(&i) {
                continue;
            }
            if handle(side_item) == base_handle && normalize(side_item) != normalize(base_item) {
                changed.push(ChangedItem {
                    before: (*base_item).clone(),
                    after: (*side_item).clone(),
                });
                consumed.push(i);
                return false;
            }
        }
        true
    });
    let added: Vec<String> = added
        .iter()
        .enumerate()
        .filter(|(i, _)| !consumed.contains(i))
        .map(|(_, s)| (*s).clone())
        .collect();
    let removed: Vec<String> = removed.into_iter().cloned().collect();

    (added, removed, changed)
}

/// Render a diff as compact JSON for prompt synthesis.
pub fn to_prompt_json(diff: &StateDiff) -> serde_json::Value {
    let section = |map: &BTreeMap<Category, Vec<String>>| {
        map.iter()
            .map(|(cat, items)| (cat.as_str().to_string(), serde_json::json!(items)))
            .collect::<serde_json::Map<_, _>>()
    };
    serde_json::json!({
        "added": section(&diff.added),
        "removed": section(&diff.removed),
        "changed": diff
            .changed
            .iter()
            .map(|(cat, items)| {
                (
                    cat.as_str().to_string(),
                    serde_json::json!(items
                        .iter()
                        .map(|c| serde_json::json!({"before": c.before, "after": c.after}))
                        .collect::<Vec<_>>()),
                )
            })
            .collect::<serde_json::Map<_, _>>(),
    })
}
