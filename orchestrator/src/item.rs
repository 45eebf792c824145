//! Orchestration of the per-item adaptive loop.
//!
//! Drives the pure transition function in [`crate::core::state`] against the
//! quality evaluator, content adjuster, targeted enrichment, and the visual
//! gate. Attempt budgets guarantee termination; exhaustion accepts the
//! current content with an audit warning instead of failing the item.

use tracing::{debug, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::core::adjust::{prune_content, summarize_content};
use crate::core::gate::{GateFailure, Remediation, run_visual_gate};
use crate::core::profiles::{downgrade_layout, layout_spec, route_layout};
use crate::core::quality::evaluate;
use crate::core::sampling::should_validate_visually;
use crate::core::state::{ItemState, MachineEvent, MachineState, transition};
use crate::core::types::{ContentPlan, Fact, ItemMeta, QualityVerdict, SuggestedAction};
use crate::enrich::targeted_research;
use crate::metrics::CostCategory;
use crate::oracle::breaker::{OracleKind, call_with_retries};
use crate::oracle::normalize::{default_plan, normalize_plan};
use crate::oracle::{DensityHint, OracleEnv, PlanRequest, PlanningOracle, ResearchOracle};

/// Everything the driver needs besides the item itself.
pub struct ItemContext<'a, R, P> {
    pub research: &'a R,
    pub planner: &'a P,
    pub env: OracleEnv<'a>,
    pub config: &'a OrchestratorConfig,
    pub topic: &'a str,
    pub total_items: usize,
}

/// Result of one item's loop, folded into the final artifact by `produce`.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub state: ItemState,
    /// Terminated via the attempt ceiling rather than a clean accept.
    pub forced: bool,
    /// The verdict left standing when the ceiling hit.
    pub unresolved: Option<QualityVerdict>,
    /// Whether the sampling policy selected this item for visual validation.
    pub sampled: bool,
    pub enrichments: u32,
    pub prunes: u32,
    pub summarizes: u32,
    pub reroutes: u32,
    pub gate_checks: u32,
    pub gate_failures: u32,
}

/// Run the state machine for one item to a terminal state.
#[instrument(skip_all, fields(item = meta.index, kind = ?meta.kind))]
pub fn run_item<R: ResearchOracle, P: PlanningOracle>(
    ctx: &ItemContext<'_, R, P>,
    meta: &ItemMeta,
    facts: &mut Vec<Fact>,
    narrative: &[String],
) -> ItemOutcome {
    let budgets = &ctx.config.budgets;
    let initial = layout_spec(route_layout(meta));
    let mut state = ItemState::new(initial.id.to_string(), initial.risk);
    let mut machine = MachineState::Route;
    let mut hint = DensityHint::Balanced;

    let mut forced = false;
    let mut unresolved = None;
    let mut sampled = false;
    let mut prunes = 0u32;
    let mut summarizes = 0u32;
    let mut reroutes = 0u32;
    let mut gate_checks = 0u32;
    let mut gate_failures = 0u32;

    while !machine.is_terminal() {
        machine = match machine {
            MachineState::Route => transition(machine, MachineEvent::Routed),
            MachineState::Plan => {
                state.plan = draft_plan(ctx, meta, facts, narrative, hint);
                transition(machine, MachineEvent::Planned)
            }
            MachineState::Evaluate => {
                let spec = layout_spec(&state.layout_id);
                let verdict = evaluate(&state.plan, meta, &spec.profile);
                if verdict.passes {
                    sampled = should_validate_visually(
                        meta.index,
                        ctx.total_items,
                        spec.risk,
                        &state.plan.title,
                        &ctx.config.sampling,
                    );
                    transition(machine, MachineEvent::QualityPassed { sampled })
                } else {
                    let action = verdict
                        .suggested_action
                        .unwrap_or(SuggestedAction::Enrich);
                    if state.can_attempt(action, budgets) {
                        transition(machine, MachineEvent::QualityFailed { action })
                    } else {
                        warn!(
                            item = meta.index,
                            reason = ?verdict.reason,
                            "attempt budget exhausted, accepting as-is"
                        );
                        state
                            .warnings
                            .push(format!("quality exhausted: {}", verdict.details));
                        forced = true;
                        unresolved = Some(verdict);
                        transition(machine, MachineEvent::AttemptsExhausted)
                    }
                }
            }
            MachineState::Enrich => {
                state.record_attempt(SuggestedAction::Enrich);
                let query = format!("{} {}", ctx.topic, meta.heading);
                let gained = targeted_research(ctx.research, &ctx.env, &query, facts);
                facts.extend(gained);
                hint = DensityHint::MoreDetail;
                state.plan = draft_plan(ctx, meta, facts, narrative, hint);
                transition(machine, MachineEvent::Corrected)
            }
            MachineState::Prune => {
                state.record_attempt(SuggestedAction::Prune);
                prunes += 1;
                let spec = layout_spec(&state.layout_id);
                state.plan = prune_content(&state.plan, spec.profile.max_bullets);
                hint = DensityHint::Tighter;
                transition(machine, MachineEvent::Corrected)
            }
            MachineState::Summarize => {
                state.record_attempt(SuggestedAction::Summarize);
                summarizes += 1;
                let spec = layout_spec(&state.layout_id);
                state.plan = summarize_content(&state.plan, &spec.profile);
                hint = DensityHint::Tighter;
                transition(machine, MachineEvent::Corrected)
            }
            MachineState::VisualGate => {
                gate_checks += 1;
                let spec = layout_spec(&state.layout_id);
                let gate = run_visual_gate(&state.plan, &spec.profile, &ctx.config.gate);
                if gate.fits {
                    transition(machine, MachineEvent::GatePassed)
                } else {
                    gate_failures += 1;
                    let failure = gate.failure.unwrap_or(GateFailure::VisualFitFailed);
                    let remediation = gate.action.unwrap_or(Remediation::ChangeLayout);
                    debug!(item = meta.index, ?failure, ?remediation, "gate failed");
                    match resolve_gate_failure(&mut state, ctx, remediation, failure, &mut reroutes)
                    {
                        GateResolution::Remediate(event) => transition(machine, event),
                        GateResolution::GiveUp(warning) => {
                            state.warnings.push(warning);
                            forced = true;
                            transition(machine, MachineEvent::AttemptsExhausted)
                        }
                    }
                }
            }
            MachineState::Accept | MachineState::ForcedAccept => machine,
        };
    }

    // An empty plan on a layout that forbids it falls back to deterministic
    // placeholder content rather than shipping a blank item.
    let spec = layout_spec(&state.layout_id);
    if state.plan.key_points.is_empty() && !spec.profile.allow_empty {
        state
            .plan
            .key_points
            .push(format!("{} (content pending)", meta.heading));
        state
            .warnings
            .push("placeholder content substituted".to_string());
    }

    if machine == MachineState::ForcedAccept {
        forced = true;
    }

    ItemOutcome {
        enrichments: state.enrichment_attempts,
        state,
        forced,
        unresolved,
        sampled,
        prunes,
        summarizes,
        reroutes,
        gate_checks,
        gate_failures,
    }
}

enum GateResolution {
    Remediate(MachineEvent),
    GiveUp(String),
}

fn resolve_gate_failure<R, P>(
    state: &mut ItemState,
    ctx: &ItemContext<'_, R, P>,
    remediation: Remediation,
    failure: GateFailure,
    reroutes: &mut u32,
) -> GateResolution {
    let budgets = &ctx.config.budgets;
    match remediation {
        Remediation::Prune => {
            if state.can_attempt(SuggestedAction::Prune, budgets) {
                GateResolution::Remediate(MachineEvent::GateFailed { remediation })
            } else {
                GateResolution::GiveUp(format!("visual gate unresolved: {failure:?}"))
            }
        }
        Remediation::Summarize => {
            if state.can_attempt(SuggestedAction::Summarize, budgets) {
                GateResolution::Remediate(MachineEvent::GateFailed { remediation })
            } else {
                GateResolution::GiveUp(format!("visual gate unresolved: {failure:?}"))
            }
        }
        Remediation::ChangeLayout => match downgrade_layout(&state.layout_id) {
            Some(next) if state.can_reroute(budgets) => {
                state.record_reroute();
                *reroutes += 1;
                let spec = layout_spec(next);
                state.layout_id = spec.id.to_string();
                state.risk = spec.risk;
                GateResolution::Remediate(MachineEvent::GateFailed { remediation })
            }
            _ => GateResolution::GiveUp(format!("visual gate unresolved: {failure:?}")),
        },
    }
}

/// Plan through the oracle with normalization; local deterministic fallback
/// when the planner is out.
fn draft_plan<R, P: PlanningOracle>(
    ctx: &ItemContext<'_, R, P>,
    meta: &ItemMeta,
    facts: &[Fact],
    narrative: &[String],
    hint: DensityHint,
) -> ContentPlan {
    let request = PlanRequest {
        meta,
        facts,
        narrative,
        hint,
    };
    match call_with_retries(
        ctx.env.breakers,
        OracleKind::Planning,
        ctx.env.retry,
        ctx.env.tiers,
        |tier| ctx.planner.draft_plan(&request, tier),
    ) {
        Ok(raw) => {
            ctx.env
                .ledger
                .record(CostCategory::Planning, ctx.env.costs.plan_call);
            normalize_plan(&raw, meta)
        }
        Err(err) => {
            warn!(item = meta.index, %err, "planner failed, using local fallback");
            fallback_plan(meta, facts)
        }
    }
}

/// Deterministic scaffolding built from whatever facts exist.
fn fallback_plan(meta: &ItemMeta, facts: &[Fact]) -> ContentPlan {
    let mut plan = default_plan(meta);
    if !meta.kind.is_hero() {
        plan.key_points = facts
            .iter()
            .take(3)
            .map(|fact| fact.claim.clone())
            .collect();
    }
    plan
}
