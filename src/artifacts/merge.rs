//! Ancestor search and three-way merge
//!
//! The merge base is the first ancestor of THEIRS found inside the ancestor
//! set of OURS: a breadth-first walk collects every commit reachable from
//! OURS, then a second breadth-first walk from THEIRS stops at the first
//! member of that set. All walks carry visited sets, so malformed cyclic
//! histories terminate.
//!
//! The three-way content rule is applied per path over flat tree maps:
//! agreement wins, a side that moved away from BASE wins over one that
//! stayed, and two sides that both moved produce a conflict.

use crate::areas::database::Database;
use crate::areas::repository::TreeMap;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::TreeEntry;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;

/// Per-path outcome of the three-way rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeDecision {
    /// Path resolves cleanly to this entry
    Take(TreeEntry),
    /// Path resolves cleanly to absence (deleted on the winning side)
    Remove,
    /// Both sides changed; manual resolution required
    Conflict {
        ours: Option<TreeEntry>,
        theirs: Option<TreeEntry>,
    },
}

/// Find the lowest common ancestor of two commits
///
/// Collects the full ancestor set of `ours` (itself included), then walks
/// breadth-first from `theirs` and returns the first commit found in that
/// set. `None` means the histories share no root.
pub fn find_common_ancestor(
    database: &Database,
    ours: &ObjectId,
    theirs: &ObjectId,
) -> anyhow::Result<Option<ObjectId>> {
    let mut our_ancestors = HashSet::new();
    let mut queue = VecDeque::from([ours.clone()]);
    while let Some(current) = queue.pop_front() {
        if !our_ancestors.insert(current.clone()) {
            continue;
        }
        if let Ok(commit) = database.load_commit(&current) {
            queue.extend(commit.parents().iter().cloned());
        }
    }

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([theirs.clone()]);
    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        if our_ancestors.contains(&current) {
            return Ok(Some(current));
        }
        if let Ok(commit) = database.load_commit(&current) {
            queue.extend(commit.parents().iter().cloned());
        }
    }

    Ok(None)
}

/// Apply the three-way rule to every path appearing in any of the trees
pub fn merge_trees(
    base: &TreeMap,
    ours: &TreeMap,
    theirs: &TreeMap,
) -> BTreeMap<PathBuf, MergeDecision> {
    let mut paths: std::collections::BTreeSet<&PathBuf> = std::collections::BTreeSet::new();
    paths.extend(base.keys());
    paths.extend(ours.keys());
    paths.extend(theirs.keys());

    let mut decisions = BTreeMap::new();
    for path in paths {
        let base_entry = base.get(path);
        let our_entry = ours.get(path);
        let their_entry = theirs.get(path);

        let decision = if our_entry == their_entry {
            match our_entry {
                Some(entry) => MergeDecision::Take(entry.clone()),
                None => MergeDecision::Remove,
            }
        } else if our_entry == base_entry {
            match their_entry {
                Some(entry) => MergeDecision::Take(entry.clone()),
                None => MergeDecision::Remove,
            }
        } else if their_entry == base_entry {
            match our_entry {
                Some(entry) => MergeDecision::Take(entry.clone()),
                None => MergeDecision::Remove,
            }
        } else {
            MergeDecision::Conflict {
                ours: our_entry.cloned(),
                theirs: their_entry.cloned(),
            }
        };

        decisions.insert(path.clone(), decision);
    }

    decisions
}

/// Build conflict-marker file content from the two sides
///
/// An absent side contributes no lines between its marker and the
/// separator.
pub fn conflict_file_content(
    ours_label: &str,
    ours_lines: &[String],
    theirs_label: &str,
    theirs_lines: &[String],
) -> String {
    let mut content = String::new();
    content.push_str(&format!("<<<<<<< {}\n", ours_label));
    for line in ours_lines {
        content.push_str(line);
        content.push('\n');
    }
    content.push_str("=======\n");
    for line in theirs_lines {
        content.push_str(line);
        content.push('\n');
    }
    content.push_str(&format!(">>>>>>> {}\n", theirs_label));
    content
}
