//! Text structure classification for generated summaries.
//!
//! A block of text is laid out as a numbered list, a bulleted list, or plain
//! paragraphs. Classification is all-or-nothing: every non-blank line has to
//! carry the same kind of marker, otherwise the whole block is prose and no
//! line is altered.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::{RenderUnit, UnitKind};

fn ordered_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]+\.\s").expect("valid ordered marker pattern"))
}

fn unordered_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-*•]\s").expect("valid unordered marker pattern"))
}

/// Classify `text` and return its display units.
///
/// Empty or whitespace-only input yields no units. Anything else yields a
/// single unit whose items preserve the input line order.
pub fn classify(text: &str) -> Vec<RenderUnit> {
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let unit = if all_match(&lines, ordered_marker()) {
        RenderUnit::new(UnitKind::Ordered, strip_all(&lines, ordered_marker()))
    } else if all_match(&lines, unordered_marker()) {
        RenderUnit::new(UnitKind::Unordered, strip_all(&lines, unordered_marker()))
    } else {
        RenderUnit::new(
            UnitKind::Paragraph,
            lines.iter().map(|line| line.to_string()).collect(),
        )
    };

    vec![unit]
}

fn all_match(lines: &[&str], marker: &Regex) -> bool {
    lines.iter().all(|line| marker.is_match(line.trim_start()))
}

fn strip_all(lines: &[&str], marker: &Regex) -> Vec<String> {
    lines
        .iter()
        .map(|line| marker.replace(line.trim_start(), "").into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(text: &str) -> RenderUnit {
        let mut units = classify(text);
        assert_eq!(units.len(), 1, "expected one unit for {text:?}");
        units.remove(0)
    }

    #[test]
    fn test_numbered_list() {
        let unit = single("1. Alpha\n2. Beta");
        assert_eq!(unit.kind, UnitKind::Ordered);
        assert_eq!(unit.items, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn test_mixed_bullet_markers() {
        let unit = single("- Alpha\n* Beta\n• Gamma");
        assert_eq!(unit.kind, UnitKind::Unordered);
        assert_eq!(unit.items, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn test_mixed_conformance_falls_back_to_paragraphs() {
        let unit = single("1. Alpha\nBeta");
        assert_eq!(unit.kind, UnitKind::Paragraph);
        assert_eq!(unit.items, vec!["1. Alpha", "Beta"]);
    }

    #[test]
    fn test_numbered_and_bulleted_lines_together_are_prose() {
        let unit = single("1. Alpha\n- Beta");
        assert_eq!(unit.kind, UnitKind::Paragraph);
        assert_eq!(unit.items, vec!["1. Alpha", "- Beta"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(classify("").is_empty());
        assert!(classify("\n\n").is_empty());
        assert!(classify("  \n\t\n").is_empty());
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let unit = single("\n1. Alpha\n\n   \n2. Beta\n");
        assert_eq!(unit.kind, UnitKind::Ordered);
        assert_eq!(unit.items, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn test_leading_indent_is_ignored_for_matching() {
        let unit = single("   * Alpha\n\t- Beta");
        assert_eq!(unit.kind, UnitKind::Unordered);
        assert_eq!(unit.items, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn test_paragraph_lines_are_unmodified() {
        let unit = single("  First line  \nSecond line");
        assert_eq!(unit.kind, UnitKind::Paragraph);
        assert_eq!(unit.items, vec!["  First line  ", "Second line"]);
    }

    #[test]
    fn test_marker_requires_whitespace() {
        let unit = single("1.Alpha\n2.Beta");
        assert_eq!(unit.kind, UnitKind::Paragraph);

        let unit = single("-Alpha\n-Beta");
        assert_eq!(unit.kind, UnitKind::Paragraph);
    }

    #[test]
    fn test_only_one_space_after_marker_is_stripped() {
        let unit = single("1.  Alpha\n2.\tBeta");
        assert_eq!(unit.kind, UnitKind::Ordered);
        assert_eq!(unit.items, vec![" Alpha", "Beta"]);

        let unit = single("-   Alpha\n- Beta");
        assert_eq!(unit.kind, UnitKind::Unordered);
        assert_eq!(unit.items, vec!["  Alpha", "Beta"]);
    }

    #[test]
    fn test_multi_digit_numbers() {
        let unit = single("9. Nine\n10. Ten\n11. Eleven");
        assert_eq!(unit.kind, UnitKind::Ordered);
        assert_eq!(unit.items, vec!["Nine", "Ten", "Eleven"]);
    }

    #[test]
    fn test_only_leading_marker_is_stripped() {
        let unit = single("- **Objective:** ship - fast\n- Uses React * Node");
        assert_eq!(unit.kind, UnitKind::Unordered);
        assert_eq!(
            unit.items,
            vec!["**Objective:** ship - fast", "Uses React * Node"]
        );
    }

    #[test]
    fn test_crlf_line_endings() {
        let unit = single("1. Alpha\r\n2. Beta\r\n");
        assert_eq!(unit.items, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn test_single_prose_line() {
        let unit = single("Just a sentence.");
        assert_eq!(unit.kind, UnitKind::Paragraph);
        assert_eq!(unit.items, vec!["Just a sentence."]);
    }
}
