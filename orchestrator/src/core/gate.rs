//! Cheap structural fit check run before spending on the critique oracle.
//!
//! The gate estimates whether planned content fits its layout from character
//! counts and element density alone. Failures map to a closed code set, each
//! carrying the remediation the per-item loop should take.

use serde::{Deserialize, Serialize};

use crate::core::profiles::LayoutProfile;
use crate::core::types::ContentPlan;

/// Structural estimation knobs shared by all layouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Estimated characters rendered per body line.
    pub chars_per_line: usize,
    /// Body lines the layout can absorb before wrapping breaks it.
    pub max_body_lines: usize,
    /// Renderable elements (title, points, data callouts) before crowding.
    pub max_elements: usize,
    /// Title length before it collides with the layout chrome.
    pub max_title_chars: usize,
    /// Combined fill pressure (0..1 scale) past which fit is unlikely.
    pub fit_pressure_limit: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            chars_per_line: 38,
            max_body_lines: 12,
            max_elements: 9,
            max_title_chars: 60,
            fit_pressure_limit: 0.95,
        }
    }
}

/// Closed set of structural failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateFailure {
    TitleOverflow,
    BulletTooLong,
    TotalCharsOverflow,
    BodyWrapExceeded,
    ElementDensityHigh,
    VisualFitFailed,
}

/// What the loop should do about a gate failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    Prune,
    Summarize,
    ChangeLayout,
}

impl GateFailure {
    /// Fixed failure-code to remediation mapping.
    pub fn remediation(self) -> Remediation {
        match self {
            GateFailure::TitleOverflow => Remediation::ChangeLayout,
            GateFailure::BulletTooLong => Remediation::Summarize,
            GateFailure::TotalCharsOverflow => Remediation::Summarize,
            GateFailure::BodyWrapExceeded => Remediation::ChangeLayout,
            GateFailure::ElementDensityHigh => Remediation::Prune,
            GateFailure::VisualFitFailed => Remediation::ChangeLayout,
        }
    }
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub fits: bool,
    pub failure: Option<GateFailure>,
    pub action: Option<Remediation>,
}

impl GateOutcome {
    fn fit() -> Self {
        Self {
            fits: true,
            failure: None,
            action: None,
        }
    }

    fn fail(failure: GateFailure) -> Self {
        Self {
            fits: false,
            failure: Some(failure),
            action: Some(failure.remediation()),
        }
    }
}

/// Estimate structural fit of a plan under its layout profile.
pub fn run_visual_gate(
    plan: &ContentPlan,
    profile: &LayoutProfile,
    config: &GateConfig,
) -> GateOutcome {
    if plan.title.chars().count() > config.max_title_chars {
        return GateOutcome::fail(GateFailure::TitleOverflow);
    }

    let wrap_limit = config.chars_per_line * 2;
    if plan
        .key_points
        .iter()
        .any(|point| point.chars().count() > wrap_limit)
    {
        return GateOutcome::fail(GateFailure::BulletTooLong);
    }

    let total = plan.total_chars();
    if total > profile.max_total_chars {
        return GateOutcome::fail(GateFailure::TotalCharsOverflow);
    }

    let body_lines = estimated_body_lines(plan, config.chars_per_line);
    if body_lines > config.max_body_lines {
        return GateOutcome::fail(GateFailure::BodyWrapExceeded);
    }

    let elements = plan.element_count();
    if elements > config.max_elements {
        return GateOutcome::fail(GateFailure::ElementDensityHigh);
    }

    // Borderline on every axis at once still breaks layouts that each axis
    // alone would survive.
    let char_pressure = if profile.max_total_chars > 0 {
        total as f64 / profile.max_total_chars as f64
    } else {
        0.0
    };
    let density_pressure = elements as f64 / config.max_elements as f64;
    let pressure = char_pressure * 0.6 + density_pressure * 0.4;
    if pressure > config.fit_pressure_limit {
        return GateOutcome::fail(GateFailure::VisualFitFailed);
    }

    GateOutcome::fit()
}

fn estimated_body_lines(plan: &ContentPlan, chars_per_line: usize) -> usize {
    let per_line = chars_per_line.max(1);
    let point_lines: usize = plan
        .key_points
        .iter()
        .map(|point| plan_lines(point.chars().count(), per_line))
        .sum();
    // Data callouts render one line each.
    point_lines + plan.data_points.len()
}

fn plan_lines(chars: usize, per_line: usize) -> usize {
    if chars == 0 { 1 } else { chars.div_ceil(per_line) }
}
