//! Deterministic content adjustment: pruning and summarization.
//!
//! Both operations are pure and idempotent on already-conforming input, so
//! the per-item loop can apply them repeatedly without oscillation.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::profiles::LayoutProfile;
use crate::core::types::ContentPlan;

const ELLIPSIS: char = '\u{2026}';

/// Matches figures worth keeping: counts, percentages, multipliers.
fn stat_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d+(?:[.,]\d+)?\s*(?:%|percent|x\b)?").expect("valid statistic pattern")
    })
}

/// Keep the `max_bullets` highest-value points, survivors in original order.
///
/// Scoring is deterministic: +3 for a numeric/statistic pattern, +2 per
/// title-keyword match (keywords longer than 3 chars), +1 per 30 chars of
/// length capped at +2, +1 for holding the first or last position.
pub fn prune_content(plan: &ContentPlan, max_bullets: usize) -> ContentPlan {
    if plan.key_points.len() <= max_bullets {
        return plan.clone();
    }

    let keywords = title_keywords(&plan.title);
    let last = plan.key_points.len() - 1;
    let mut ranked: Vec<(usize, i64)> = plan
        .key_points
        .iter()
        .enumerate()
        .map(|(idx, point)| (idx, score_point(point, &keywords, idx, last)))
        .collect();

    // Stable sort keeps original order among equal scores.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let mut keep: Vec<usize> = ranked.iter().take(max_bullets).map(|(idx, _)| *idx).collect();
    keep.sort_unstable();

    let mut pruned = plan.clone();
    pruned.key_points = keep
        .into_iter()
        .map(|idx| plan.key_points[idx].clone())
        .collect();
    pruned
}

/// Shorten every point exceeding the profile's per-point limit.
///
/// The result including the appended ellipsis fits the limit. The cut lands
/// on the last word boundary when that boundary falls beyond 70% of the
/// limit, otherwise the point is hard-truncated.
pub fn summarize_content(plan: &ContentPlan, profile: &LayoutProfile) -> ContentPlan {
    let mut adjusted = plan.clone();
    adjusted.key_points = plan
        .key_points
        .iter()
        .map(|point| shorten_point(point, profile.max_chars_per_point))
        .collect();
    adjusted
}

fn score_point(point: &str, keywords: &[String], idx: usize, last: usize) -> i64 {
    let mut score = 0i64;
    if stat_pattern().is_match(point) {
        score += 3;
    }
    let lowered = point.to_lowercase();
    for keyword in keywords {
        if lowered.contains(keyword.as_str()) {
            score += 2;
        }
    }
    let length_bonus = (point.chars().count() / 30).min(2) as i64;
    score += length_bonus;
    if idx == 0 || idx == last {
        score += 1;
    }
    score
}

fn title_keywords(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| word.len() > 3)
        .collect()
}

fn shorten_point(point: &str, limit: usize) -> String {
    let chars: Vec<char> = point.chars().collect();
    if chars.len() <= limit || limit == 0 {
        return point.to_string();
    }

    let budget = limit - 1; // room for the ellipsis
    let floor = limit * 7 / 10;
    let boundary = chars[..budget]
        .iter()
        .rposition(|c| c.is_whitespace())
        .filter(|&pos| pos >= floor);

    let cut = boundary.unwrap_or(budget);
    let mut shortened: String = chars[..cut].iter().collect();
    shortened.truncate(shortened.trim_end().len());
    shortened.push(ELLIPSIS);
    shortened
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(title: &str, points: Vec<&str>) -> ContentPlan {
        ContentPlan {
            title: title.to_string(),
            key_points: points.into_iter().map(str::to_string).collect(),
            data_points: Vec::new(),
            narrative: None,
        }
    }

    fn profile(max_per: usize) -> LayoutProfile {
        LayoutProfile {
            min_bullets: 1,
            max_bullets: 5,
            min_total_chars: 0,
            max_total_chars: 1000,
            min_chars_per_point: 0,
            max_chars_per_point: max_per,
            allow_empty: false,
        }
    }

    /// Pruning returns exactly min(n, original) points and re-pruning with
    /// the same n is a no-op.
    #[test]
    fn prune_returns_exact_count_and_is_idempotent() {
        let p = plan(
            "Revenue growth",
            vec![
                "revenue grew 14% year over year",
                "a generic statement",
                "another filler line",
                "margins expanded to 31%",
                "closing summary of growth drivers",
            ],
        );
        let pruned = prune_content(&p, 3);
        assert_eq!(pruned.key_points.len(), 3);

        let again = prune_content(&pruned, 3);
        assert_eq!(again, pruned);

        let under = prune_content(&p, 9);
        assert_eq!(under.key_points.len(), 5);
    }

    #[test]
    fn prune_prefers_statistics_and_title_keywords() {
        let p = plan(
            "Revenue growth",
            vec![
                "filler one",
                "revenue grew 14% year over year",
                "filler two",
                "filler three",
            ],
        );
        let pruned = prune_content(&p, 1);
        assert_eq!(pruned.key_points, vec!["revenue grew 14% year over year"]);
    }

    #[test]
    fn prune_keeps_survivors_in_original_order() {
        let p = plan(
            "Growth",
            vec![
                "growth reached 20% in Q3",
                "nothing notable",
                "growth slowed to 5% in Q4",
            ],
        );
        let pruned = prune_content(&p, 2);
        assert_eq!(
            pruned.key_points,
            vec!["growth reached 20% in Q3", "growth slowed to 5% in Q4"]
        );
    }

    /// Summarizing conforming content twice changes nothing.
    #[test]
    fn summarize_is_idempotent_on_conforming_content() {
        let p = plan("t", vec!["short point", "another short point"]);
        let once = summarize_content(&p, &profile(40));
        assert_eq!(once, p);
        let twice = summarize_content(&once, &profile(40));
        assert_eq!(twice, once);
    }

    #[test]
    fn summarize_cuts_at_word_boundary_when_late_enough() {
        let p = plan("t", vec!["alpha beta gamma delta epsilon zeta eta theta"]);
        let out = summarize_content(&p, &profile(30));
        let point = &out.key_points[0];
        assert!(point.chars().count() <= 30, "got {} chars", point.chars().count());
        assert!(point.ends_with(ELLIPSIS));
        // No mid-word cut: the char before the ellipsis ends a whole word.
        let body: String = point.chars().take(point.chars().count() - 1).collect();
        assert!(
            "alpha beta gamma delta epsilon zeta eta theta".starts_with(body.trim_end()),
            "unexpected body: {body:?}"
        );
    }

    #[test]
    fn summarize_hard_truncates_unbroken_text() {
        let long = "x".repeat(50);
        let p = plan("t", vec![long.as_str()]);
        let out = summarize_content(&p, &profile(20));
        let point = &out.key_points[0];
        assert_eq!(point.chars().count(), 20);
        assert!(point.ends_with(ELLIPSIS));
    }

    #[test]
    fn summarized_output_conforms_to_the_limit() {
        let p = plan(
            "t",
            vec!["a considerably longer point that keeps going well past the cap"],
        );
        let out = summarize_content(&p, &profile(24));
        assert!(out.key_points[0].chars().count() <= 24);
        // Second pass is a no-op once content conforms.
        assert_eq!(summarize_content(&out, &profile(24)), out);
    }
}
