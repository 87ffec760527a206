//! Conflict classification over the two branch diffs.
//!
//! Three kinds of overlap survive to the merge node:
//! - `both_modified`: both branches rewrote the same base item (matching
//!   `before` handles) to different texts.
//! - `contradicts`: one branch added what the other removed.
//! - `diverges`: both branches added different items about the same thing.
//!
//! One [`ConflictRecord`] is emitted per detection. The `left_item` always
//! carries the left branch's text and `right_item` the right branch's.

use forky_core::state::{Category, ConflictKind, ConflictRecord, StateDiff};

use crate::diff::{handle, normalize};

/// Classify the overlap between the left and right diffs.
pub fn classify(left: &StateDiff, right: &StateDiff) -> Vec<ConflictRecord> {
    let mut conflicts: Vec<ConflictRecord> = Vec::new();

    for category in Category::ALL {
        for lc in left.changed_in(category) {
            for rc in right.changed_in(category) {
                if handle(&lc.before) == handle(&rc.before)
                    && normalize(&lc.after) != normalize(&rc.after)
                {
                    conflicts.push(ConflictRecord {
                        category,
                        left_item: lc.after.clone(),
                        right_item: rc.after.clone(),
                        kind: ConflictKind::BothModified,
                    });
                }
            }
        }

        for la in left.added_in(category) {
            for rr in right.removed_in(category) {
                if handle(la) == handle(rr) {
                    conflicts.push(ConflictRecord {
                        category,
                        left_item: la.clone(),
                        right_item: rr.clone(),
                        kind: ConflictKind::Contradicts,
                    });
                }
            }
        }
        for ra in right.added_in(category) {
            for lr in left.removed_in(category) {
                if handle(ra) == handle(lr) {
                    conflicts.push(ConflictRecord {
                        category,
                        left_item: lr.clone(),
                        right_item: ra.clone(),
                        kind: ConflictKind::Contradicts,
                    });
                }
            }
        }

        for la in left.added_in(category) {
            for ra in right.added_in(category) {
                if handle(la) == handle(ra) && normalize(la) != normalize(ra) {
                    conflicts.push(ConflictRecord {
                        category,
                        left_item: la.clone(),
                        right_item: ra.clone(),
                        kind: ConflictKind::Diverges,
                    });
                }
            }
        }
    }

    conflicts
}
