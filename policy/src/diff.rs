//! Run-over-run set difference against the dedup snapshot.
//
//  This module is deliberately pure: no async, no IO.

use std::collections::{HashMap, HashSet};

/// Outcome of diffing the current qualifying set against the previous run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunDiff {
    pub newly_added: Vec<String>,
    pub newly_removed: Vec<String>,
}

/// newly-added = current − previous; newly-removed = previous − current,
/// minus the caller's exclusion set. Output is sorted so notification text
/// is stable across runs.
pub fn diff_against_previous(
    previous: &HashMap<String, i64>,
    current: &HashSet<String>,
    excluded: &HashSet<String>,
) -> RunDiff {
    let mut newly_added: Vec<String> = current
        .iter()
        .filter(|symbol| !previous.contains_key(*symbol))
        .cloned()
        .collect();

    let mut newly_removed: Vec<String> = previous
        .keys()
        .filter(|symbol| !current.contains(*symbol) && !excluded.contains(*symbol))
        .cloned()
        .collect();

    newly_added.sort();
    newly_removed.sort();

    RunDiff {
        newly_added,
        newly_removed,
    }
}
