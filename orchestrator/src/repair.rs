//! "System 2" visual repair loop: iterative critique and repair with
//! convergence, stagnation, and budget guards.
//!
//! Each round renders the working item, asks the critique oracle for a
//! verdict, and either converges, aborts, or applies the requested repairs
//! and goes around again. Every exit path returns the same result shape.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ContentPlan, CritiqueIssue, CritiqueVerdict, RepairAction, RepairOp};
use crate::metrics::CostCategory;
use crate::oracle::breaker::{OracleKind, call_with_retries};
use crate::oracle::{CritiqueOracle, OracleEnv, RenderOracle, RenderProxy};

/// Policy for the repair loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepairConfig {
    /// Hard round cap, independent of every other stop condition.
    pub max_rounds: u32,
    /// Score at which the item converges without an accept verdict.
    pub target_score: f64,
    /// Minimum round-over-round gain to keep repairing.
    pub min_improvement_delta: f64,
    /// Per-item wall-clock budget.
    pub time_budget_ms: u64,
    /// Per-item cumulative oracle cost budget.
    pub cost_budget_units: f64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            target_score: 85.0,
            min_improvement_delta: 5.0,
            time_budget_ms: 60_000,
            cost_budget_units: 16.0,
        }
    }
}

/// Why the loop stopped short of convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAbort {
    TimeBudgetExceeded,
    CostBudgetExceeded,
    /// Repeated repair categories without progress; a structural change
    /// (different layout) is the recommended follow-up, not more cosmetics.
    Stagnation,
    InsufficientImprovement,
    RoundLimit,
    OracleFailure,
}

/// Uniform result shape across all exit paths.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub plan: ContentPlan,
    pub proxy: Option<RenderProxy>,
    pub rounds_run: u32,
    pub final_score: f64,
    pub repairs_applied: usize,
    pub converged: bool,
    pub abort_reason: Option<RepairAbort>,
    /// Last critique context, retained for the consensus engine.
    pub last_verdict: Option<CritiqueVerdict>,
    pub last_issues: Vec<CritiqueIssue>,
}

/// Run the repair loop for one item.
#[instrument(skip_all, fields(layout_id, max_rounds = config.max_rounds))]
pub fn run_repair_loop<C: CritiqueOracle, D: RenderOracle>(
    critique_oracle: &C,
    renderer: &D,
    env: &OracleEnv<'_>,
    config: &RepairConfig,
    plan: ContentPlan,
    layout_id: &str,
) -> RepairOutcome {
    let started = Instant::now();
    let time_budget = Duration::from_millis(config.time_budget_ms);

    let mut plan = plan;
    let mut working: Option<RenderProxy> = None;
    let mut previous_fingerprint: Option<String> = None;
    let mut previous_score: Option<f64> = None;
    let mut history: Vec<BTreeSet<RepairAction>> = Vec::new();
    let mut rounds_run = 0u32;
    let mut final_score = 0.0f64;
    let mut repairs_applied = 0usize;
    let mut spent = 0.0f64;
    let mut last_verdict = None;
    let mut last_issues = Vec::new();

    let (converged, abort_reason) = loop {
        // Budget circuit breaker, checked at the top of every round.
        if rounds_run >= config.max_rounds {
            break (false, Some(RepairAbort::RoundLimit));
        }
        if started.elapsed() > time_budget {
            warn!(rounds_run, "repair time budget exceeded");
            break (false, Some(RepairAbort::TimeBudgetExceeded));
        }
        if spent > config.cost_budget_units {
            warn!(rounds_run, spent, "repair cost budget exceeded");
            break (false, Some(RepairAbort::CostBudgetExceeded));
        }
        rounds_run += 1;

        let current = match &working {
            Some(proxy) => proxy.clone(),
            None => match renderer.render(&plan, layout_id) {
                Ok(proxy) => proxy,
                Err(err) => {
                    warn!(%err, "render collaborator failed");
                    rounds_run -= 1;
                    break (false, Some(RepairAbort::OracleFailure));
                }
            },
        };

        // Render-diff guard: identical structure means the previous round's
        // repairs were no-ops.
        let fingerprint = current.structural_fingerprint();
        if previous_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            info!(round = rounds_run, "rendered structure unchanged, stagnating");
            rounds_run -= 1;
            break (false, Some(RepairAbort::Stagnation));
        }

        let critique = match call_with_retries(
            env.breakers,
            OracleKind::Critique,
            env.retry,
            env.tiers,
            |tier| critique_oracle.critique(&current, tier),
        ) {
            Ok(critique) => critique,
            Err(err) => {
                warn!(%err, round = rounds_run, "critique oracle failed");
                break (false, Some(RepairAbort::OracleFailure));
            }
        };
        env.ledger
            .record(CostCategory::Critique, env.costs.critique_call);
        spent += env.costs.critique_call;

        final_score = critique.score;
        last_verdict = Some(critique.verdict);
        last_issues = critique.issues.clone();
        debug!(round = rounds_run, score = critique.score, verdict = ?critique.verdict, "critique round");

        if critique.verdict == CritiqueVerdict::Accept || critique.score >= config.target_score {
            break (true, None);
        }

        let categories: BTreeSet<RepairAction> =
            critique.repairs.iter().map(|r| r.action).collect();
        history.push(categories);

        if let Some(previous) = previous_score {
            let gain = critique.score - previous;
            if gain < config.min_improvement_delta {
                let reason = if repeats_previous_category(&history) {
                    RepairAbort::Stagnation
                } else {
                    RepairAbort::InsufficientImprovement
                };
                info!(round = rounds_run, gain, ?reason, "improvement stalled");
                break (false, Some(reason));
            }
        }
        if category_stuck_three_rounds(&history) {
            info!(round = rounds_run, "same repair category three rounds running");
            break (false, Some(RepairAbort::Stagnation));
        }

        let mut adjusted = current;
        repairs_applied += apply_repairs(&mut adjusted, &mut plan, &critique.repairs);
        previous_fingerprint = Some(fingerprint);
        previous_score = Some(critique.score);
        working = Some(adjusted);
    };

    RepairOutcome {
        plan,
        proxy: working,
        rounds_run,
        final_score,
        repairs_applied,
        converged,
        abort_reason,
        last_verdict,
        last_issues,
    }
}

/// The current round asks for a repair category the previous round already
/// tried.
fn repeats_previous_category(history: &[BTreeSet<RepairAction>]) -> bool {
    let len = history.len();
    if len < 2 {
        return false;
    }
    history[len - 1]
        .iter()
        .any(|action| history[len - 2].contains(action))
}

/// The same category shows up in the current round and both of the two
/// preceding rounds.
fn category_stuck_three_rounds(history: &[BTreeSet<RepairAction>]) -> bool {
    let len = history.len();
    if len < 3 {
        return false;
    }
    history[len - 1]
        .iter()
        .any(|action| history[len - 2].contains(action) && history[len - 3].contains(action))
}

/// Apply the oracle's repairs to the working proxy (and, for removals, the
/// plan). Returns how many repairs actually changed something; unknown
/// targets and parameters are ignored.
fn apply_repairs(proxy: &mut RenderProxy, plan: &mut ContentPlan, repairs: &[RepairOp]) -> usize {
    let mut applied = 0;
    for repair in repairs {
        match repair.action {
            RepairAction::RemoveItems => {
                if remove_element(proxy, plan, &repair.target_id) {
                    applied += 1;
                }
            }
            _ => {
                let Some(element) = proxy
                    .elements
                    .iter_mut()
                    .find(|e| e.id == repair.target_id)
                else {
                    continue;
                };
                let changed = match repair.action {
                    RepairAction::Reposition => {
                        element.frame.x += param(&repair.params, "dx");
                        element.frame.y += param(&repair.params, "dy");
                        has_param(&repair.params, "dx") || has_param(&repair.params, "dy")
                    }
                    RepairAction::Resize => {
                        let scale = param_or(&repair.params, "scale", 1.0);
                        element.frame.width *= scale;
                        element.frame.height *= scale;
                        scale != 1.0
                    }
                    RepairAction::Recolor => {
                        if let Some(color) =
                            repair.params.get("color").and_then(|v| v.as_str())
                        {
                            element.color = Some(color.to_string());
                            true
                        } else {
                            false
                        }
                    }
                    RepairAction::Respace => {
                        if has_param(&repair.params, "gap") {
                            element.gap = Some(param(&repair.params, "gap"));
                            true
                        } else {
                            false
                        }
                    }
                    RepairAction::RemoveItems => unreachable!("handled above"),
                };
                if changed {
                    applied += 1;
                }
            }
        }
    }
    applied
}

fn remove_element(proxy: &mut RenderProxy, plan: &mut ContentPlan, target_id: &str) -> bool {
    let Some(position) = proxy.elements.iter().position(|e| e.id == target_id) else {
        return false;
    };
    let removed = proxy.elements.remove(position);
    if let Some(point_index) = removed.point_index {
        if point_index < plan.key_points.len() {
            plan.key_points.remove(point_index);
        }
        // Keep bullet indices aligned with the shortened point list.
        for element in &mut proxy.elements {
            if let Some(idx) = element.point_index
                && idx > point_index
            {
                element.point_index = Some(idx - 1);
            }
        }
    }
    true
}

fn param(params: &serde_json::Value, key: &str) -> f64 {
    params.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn param_or(params: &serde_json::Value, key: &str, default: f64) -> f64 {
    params.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

fn has_param(params: &serde_json::Value, key: &str) -> bool {
    params.get(key).and_then(|v| v.as_f64()).is_some()
}
