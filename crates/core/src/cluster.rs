//! Bubble clustering
//!
//! Lines of one speech bubble sit close together vertically. Lines of
//! different bubbles are separated by artwork. Fragments are sorted
//! top-to-bottom and a new bubble starts wherever the gap to the previous
//! fragment reaches the threshold. Membership is chained: each fragment is
//! compared with its predecessor only, so a tall bubble of many lines stays
//! together however far its first and last lines are apart.

use bubble_common::{Bubble, Fragment};

/// Collapse every run of two or more whitespace characters into one space,
/// then trim
///
/// A lone whitespace character (including a tab or newline) is kept as is.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.trim().chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }

    out
}

/// Group fragments into bubbles in top-to-bottom order
///
/// Consecutive fragments (after a stable sort by position) join the same
/// bubble while `|position - previous position| < vertical_threshold`.
/// Groups whose merged text is empty are dropped.
pub fn cluster_fragments(fragments: &[Fragment], vertical_threshold: f64) -> Vec<Bubble> {
    if fragments.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&Fragment> = fragments.iter().collect();
    sorted.sort_by(|a, b| a.vertical_position.total_cmp(&b.vertical_position));

    let mut groups: Vec<Vec<&Fragment>> = Vec::new();
    let mut current: Vec<&Fragment> = Vec::new();
    for fragment in sorted {
        if let Some(last) = current.last() {
            if (fragment.vertical_position - last.vertical_position).abs() >= vertical_threshold {
                groups.push(std::mem::take(&mut current));
            }
        }
        current.push(fragment);
    }
    groups.push(current);

    groups.into_iter().filter_map(|group| merge_group(&group)).collect()
}

fn merge_group(group: &[&Fragment]) -> Option<Bubble> {
    let first = group.first()?;

    let joined = group
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let text = normalize_whitespace(&joined);
    if text.is_empty() {
        return None;
    }

    let average_confidence =
        group.iter().map(|f| f.confidence).sum::<f64>() / group.len() as f64;

    Some(Bubble {
        text,
        average_confidence,
        top: first.vertical_position,
        fragment_count: group.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str, position: f64, confidence: f64) -> Fragment {
        Fragment::new(text, position, confidence)
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_fragments(&[], 100.0).is_empty());
    }

    #[test]
    fn test_chaining_splits_on_gap() {
        let fragments: Vec<_> = [10.0, 50.0, 90.0, 300.0, 310.0]
            .iter()
            .enumerate()
            .map(|(i, &y)| frag(&format!("line{i}"), y, 0.9))
            .collect();

        let bubbles = cluster_fragments(&fragments, 100.0);
        assert_eq!(bubbles.len(), 2);
        assert_eq!(bubbles[0].text, "line0 line1 line2");
        assert_eq!(bubbles[0].fragment_count, 3);
        assert_eq!(bubbles[0].top, 10.0);
        assert_eq!(bubbles[1].text, "line3 line4");
        assert_eq!(bubbles[1].top, 300.0);
    }

    #[test]
    fn test_chain_spans_beyond_threshold() {
        // First and last are 240 px apart but each step is under 100
        let fragments = vec![
            frag("a1", 0.0, 0.9),
            frag("a2", 80.0, 0.9),
            frag("a3", 160.0, 0.9),
            frag("a4", 240.0, 0.9),
        ];
        let bubbles = cluster_fragments(&fragments, 100.0);
        assert_eq!(bubbles.len(), 1);
        assert_eq!(bubbles[0].text, "a1 a2 a3 a4");
    }

    #[test]
    fn test_gap_equal_to_threshold_splits() {
        let fragments = vec![frag("top", 0.0, 0.9), frag("bottom", 100.0, 0.9)];
        assert_eq!(cluster_fragments(&fragments, 100.0).len(), 2);
    }

    #[test]
    fn test_sorts_by_position_stably() {
        let fragments = vec![
            frag("third", 500.0, 0.9),
            frag("first", 20.0, 0.9),
            frag("second-a", 60.0, 0.9),
            frag("second-b", 60.0, 0.9),
        ];
        let bubbles = cluster_fragments(&fragments, 100.0);
        assert_eq!(bubbles.len(), 2);
        assert_eq!(bubbles[0].text, "first second-a second-b");
        assert_eq!(bubbles[1].text, "third");
    }

    #[test]
    fn test_average_confidence() {
        let fragments = vec![
            frag("가", 10.0, 0.8),
            frag("나", 20.0, 0.9),
            frag("다", 30.0, 1.0),
        ];
        let bubbles = cluster_fragments(&fragments, 100.0);
        assert_eq!(bubbles.len(), 1);
        assert!((bubbles[0].average_confidence - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_whitespace_only_group_dropped() {
        let fragments = vec![
            frag("   ", 10.0, 0.9),
            frag("\t", 20.0, 0.9),
            frag("real text", 400.0, 0.9),
        ];
        let bubbles = cluster_fragments(&fragments, 100.0);
        assert_eq!(bubbles.len(), 1);
        assert_eq!(bubbles[0].text, "real text");
    }

    #[test]
    fn test_merged_text_is_normalized() {
        let fragments = vec![frag("  정말  ", 10.0, 0.9), frag("\n괜찮아?", 40.0, 0.9)];
        let bubbles = cluster_fragments(&fragments, 100.0);
        assert_eq!(bubbles[0].text, "정말 괜찮아?");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a   b  "), "a b");
        assert_eq!(normalize_whitespace("a\t\tb"), "a b");
        assert_eq!(normalize_whitespace("a\nb"), "a\nb");
        assert_eq!(normalize_whitespace(" \n "), "");
        assert_eq!(normalize_whitespace("안녕 하세요"), "안녕 하세요");
    }

    #[test]
    fn test_normalize_whitespace_idempotent() {
        for input in ["  a   b  ", "x \t\n y", "single", "", " \u{3000} 가  나 ", "a\tb  c"] {
            let once = normalize_whitespace(input);
            assert_eq!(normalize_whitespace(&once), once, "input {input:?}");
        }
    }
}
