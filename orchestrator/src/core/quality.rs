//! Pure quality scoring for item plans.
//!
//! Checks run in a fixed priority order with fat content checked before thin
//! content: overflow risks destructive layout failure, thinness only an
//! underwhelming item. The first failing check wins.

use crate::core::profiles::LayoutProfile;
use crate::core::types::{
    ContentPlan, ItemMeta, QualityIssue, QualityVerdict, SuggestedAction,
};

/// Evaluate a plan against its layout profile.
///
/// Hero items (title/closing) use inverted bounds: excess content fails,
/// absence is explicitly allowed.
pub fn evaluate(plan: &ContentPlan, meta: &ItemMeta, profile: &LayoutProfile) -> QualityVerdict {
    if meta.kind.is_hero() {
        return evaluate_hero(plan, profile);
    }
    evaluate_standard(plan, profile)
}

fn evaluate_hero(plan: &ContentPlan, profile: &LayoutProfile) -> QualityVerdict {
    let count = plan.key_points.len();
    if count > profile.max_bullets {
        return QualityVerdict::fail(
            QualityIssue::TooManyPoints,
            SuggestedAction::Prune,
            format!(
                "hero item carries {count} points, at most {} fit",
                profile.max_bullets
            ),
        );
    }
    if let Some(longest) = longest_point(plan)
        && longest > profile.max_chars_per_point
    {
        return QualityVerdict::fail(
            QualityIssue::TooVerbose,
            SuggestedAction::Summarize,
            format!(
                "hero point runs {longest} chars, limit {}",
                profile.max_chars_per_point
            ),
        );
    }
    let total = plan.total_chars();
    if total > profile.max_total_chars {
        let mut verdict = QualityVerdict::fail(
            QualityIssue::Overflow,
            SuggestedAction::Summarize,
            format!(
                "hero content totals {total} chars, limit {}",
                profile.max_total_chars
            ),
        );
        verdict.overflow_amount = Some(total - profile.max_total_chars);
        return verdict;
    }
    QualityVerdict::pass()
}

fn evaluate_standard(plan: &ContentPlan, profile: &LayoutProfile) -> QualityVerdict {
    let count = plan.key_points.len();
    let total = plan.total_chars();

    // Fat checks first.
    if count > profile.max_bullets {
        return QualityVerdict::fail(
            QualityIssue::TooManyPoints,
            SuggestedAction::Prune,
            format!("{count} points exceed the {} allowed", profile.max_bullets),
        );
    }
    if total > profile.max_total_chars {
        let mut verdict = QualityVerdict::fail(
            QualityIssue::Overflow,
            SuggestedAction::Summarize,
            format!(
                "content totals {total} chars, limit {}",
                profile.max_total_chars
            ),
        );
        verdict.overflow_amount = Some(total - profile.max_total_chars);
        return verdict;
    }
    if let Some(longest) = longest_point(plan)
        && longest > profile.max_chars_per_point
    {
        return QualityVerdict::fail(
            QualityIssue::TooVerbose,
            SuggestedAction::Summarize,
            format!(
                "longest point runs {longest} chars, limit {}",
                profile.max_chars_per_point
            ),
        );
    }

    // Thin checks. An empty plan is acceptable only when the profile says so.
    if profile.allow_empty && count == 0 {
        return QualityVerdict::pass();
    }
    if count < profile.min_bullets {
        return QualityVerdict::fail(
            QualityIssue::ThinContent,
            SuggestedAction::Enrich,
            format!("{count} points, at least {} needed", profile.min_bullets),
        );
    }
    if count > 0 {
        let average = total / count;
        if average < profile.min_chars_per_point {
            return QualityVerdict::fail(
                QualityIssue::TooGeneric,
                SuggestedAction::Enrich,
                format!(
                    "points average {average} chars, at least {} expected",
                    profile.min_chars_per_point
                ),
            );
        }
    }
    if total < profile.min_total_chars {
        return QualityVerdict::fail(
            QualityIssue::MissingSpecifics,
            SuggestedAction::Enrich,
            format!(
                "content totals {total} chars, at least {} expected",
                profile.min_total_chars
            ),
        );
    }

    QualityVerdict::pass()
}

fn longest_point(plan: &ContentPlan) -> Option<usize> {
    plan.key_points.iter().map(|p| p.chars().count()).max()
}
