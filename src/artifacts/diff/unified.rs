//! Unified diff rendering
//!
//! Turns an edit script into unified-format hunks with three lines of
//! context. Hunk headers follow `@@ -old_start,old_len +new_start,new_len @@`
//! with the usual conventions: starts are 1-based, and a side with zero
//! lines reports the line *before* the change (`0` for the top of the file,
//! so an addition into an empty file reads `-0,0`).

use crate::artifacts::diff::myers::{self, Edit};

/// Lines of unchanged context kept around each change
const CONTEXT_LINES: usize = 3;

/// One rendered line with its `' '` / `'-'` / `'+'` prefix
#[derive(Debug, Clone, PartialEq, Eq)]
struct HunkLine {
    origin: char,
    old_no: Option<usize>,
    new_no: Option<usize>,
    text: String,
}

/// Render the unified diff between two line sets
///
/// `old_label` and `new_label` become the `---`/`+++` header lines. Returns
/// an empty string when the sides are identical.
pub fn render(
    old_label: &str,
    new_label: &str,
    old_lines: &[String],
    new_lines: &[String],
) -> String {
    let edits = myers::diff_lines(old_lines, new_lines);

    let lines: Vec<HunkLine> = edits
        .iter()
        .map(|edit| match edit {
            Edit::Equal { old, new } => HunkLine {
                origin: ' ',
                old_no: Some(*old),
                new_no: Some(*new),
                text: old_lines[*old].clone(),
            },
            Edit::Delete { old } => HunkLine {
                origin: '-',
                old_no: Some(*old),
                new_no: None,
                text: old_lines[*old].clone(),
            },
            Edit::Insert { new } => HunkLine {
                origin: '+',
                old_no: None,
                new_no: Some(*new),
                text: new_lines[*new].clone(),
            },
        })
        .collect();

    let hunk_ranges = hunk_ranges(&lines);
    if hunk_ranges.is_empty() {
        return String::new();
    }

    let mut output = String::new();
    output.push_str(&format!("--- {}\n", old_label));
    output.push_str(&format!("+++ {}\n", new_label));

    for (start, end) in hunk_ranges {
        let hunk = &lines[start..end];
        output.push_str(&hunk_header(hunk));
        for line in hunk {
            output.push(line.origin);
            output.push_str(&line.text);
            output.push('\n');
        }
    }

    output
}

/// Index ranges of lines belonging to each hunk (changes plus context)
fn hunk_ranges(lines: &[HunkLine]) -> Vec<(usize, usize)> {
    let change_positions: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.origin != ' ')
        .map(|(index, _)| index)
        .collect();

    if change_positions.is_empty() {
        return Vec::new();
    }

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &position in &change_positions {
        let start = position.saturating_sub(CONTEXT_LINES);
        let end = (position + CONTEXT_LINES + 1).min(lines.len());
        match ranges.last_mut() {
            // adjacent or overlapping context merges into one hunk
            Some((_, last_end)) if start <= *last_end => {
                *last_end = (*last_end).max(end);
            }
            _ => ranges.push((start, end)),
        }
    }

    ranges
}

fn hunk_header(hunk: &[HunkLine]) -> String {
    let old_len = hunk.iter().filter(|l| l.origin != '+').count();
    let new_len = hunk.iter().filter(|l| l.origin != '-').count();

    // an empty side reports the line before the change: 0 at file top
    let old_start = match hunk.iter().find_map(|l| l.old_no) {
        Some(first) if old_len > 0 => first + 1,
        _ => 0,
    };
    let new_start = match hunk.iter().find_map(|l| l.new_no) {
        Some(first) if new_len > 0 => first + 1,
        _ => 0,
    };

    format!(
        "@@ -{},{} +{},{} @@\n",
        old_start, old_len, new_start, new_len
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(s: &[&str]) -> Vec<String> {
        s.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_identical_sides_render_nothing() {
        let a = lines(&["same", "lines"]);
        assert_eq!(render("a/f", "b/f", &a, &a), "");
    }

    #[test]
    fn test_addition_into_empty_file() {
        let a: Vec<String> = vec![];
        let b = lines(&["hello"]);
        let diff = render("a/f", "b/f", &a, &b);
        assert_eq!(diff, "--- a/f\n+++ b/f\n@@ -0,0 +1,1 @@\n+hello\n");
    }

    #[test]
    fn test_deletion_to_empty_file() {
        let a = lines(&["bye"]);
        let b: Vec<String> = vec![];
        let diff = render("a/f", "b/f", &a, &b);
        assert_eq!(diff, "--- a/f\n+++ b/f\n@@ -1,1 +0,0 @@\n-bye\n");
    }

    #[test]
    fn test_change_in_context() {
        let a = lines(&["1", "2", "3", "4", "old", "6", "7", "8", "9"]);
        let b = lines(&["1", "2", "3", "4", "new", "6", "7", "8", "9"]);
        let diff = render("a/f", "b/f", &a, &b);
        assert_eq!(
            diff,
            "--- a/f\n+++ b/f\n\
             @@ -2,7 +2,7 @@\n 2\n 3\n 4\n-old\n+new\n 6\n 7\n 8\n"
        );
    }

    #[test]
    fn test_nearby_changes_merge_into_one_hunk() {
        let a = lines(&["1", "x", "3", "4", "5", "y", "7"]);
        let b = lines(&["1", "X", "3", "4", "5", "Y", "7"]);
        let diff = render("a/f", "b/f", &a, &b);
        // two changes 4 lines apart share context, so one hunk
        assert_eq!(diff.matches("@@").count(), 2);
    }

    #[test]
    fn test_distant_changes_produce_two_hunks() {
        let mut a_vec: Vec<String> = (1..=30).map(|n| n.to_string()).collect();
        let mut b_vec = a_vec.clone();
        a_vec[1] = "old-top".into();
        b_vec[1] = "new-top".into();
        a_vec[25] = "old-bottom".into();
        b_vec[25] = "new-bottom".into();

        let diff = render("a/f", "b/f", &a_vec, &b_vec);
        assert_eq!(diff.matches("@@").count(), 4);
    }
}
