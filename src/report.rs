//! Human-readable ruleset comparison
//!
//! Renders the fetched and declared rule lists as a line diff for dry-run
//! output and debug logging. Purely presentational; the authoritative
//! comparison is [`crate::core::diff`].

use std::fmt::Write;

use crate::core::rule::Rule;

/// Renders a unified-style diff between two rule lists, one rule per line in
/// the remote config file notation. Returns an empty string when the lists
/// render identically.
pub fn render_ruleset_diff(existing: &[Rule], desired: &[Rule]) -> String {
    let old_text = ruleset_text(existing);
    let new_text = ruleset_text(desired);

    let diff = similar::TextDiff::from_lines(&old_text, &new_text);
    let mut result = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "- ",
            similar::ChangeTag::Insert => "+ ",
            similar::ChangeTag::Equal => "  ",
        };
        let _ = write!(result, "{sign}{change}");
    }
    if old_text == new_text { String::new() } else { result }
}

fn ruleset_text(rules: &[Rule]) -> String {
    let mut text = String::new();
    for rule in rules {
        let _ = writeln!(text, "{rule}");
    }
    text
}
