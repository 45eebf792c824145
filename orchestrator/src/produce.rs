//! End-to-end production of the multi-item artifact.
//!
//! One strictly sequential per-item loop (narrative context carries between
//! items) plus two bounded-parallel fan-outs: speculative asset prefetch and
//! consensus score gathering, both gated by the concurrency limiter. No
//! single item's failure aborts the run.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use anyhow::{Result, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::assets::{bind_asset, extract_asset_needs, prefetch_assets};
use crate::config::OrchestratorConfig;
use crate::core::consensus::{
    ConsensusConfig, ExecutionMode, ScoreSample, build_report, execution_mode,
};
use crate::core::state::ItemState;
use crate::core::types::{
    ContentPlan, CritiqueIssue, CritiqueVerdict, Fact, IssueCategory, ItemKind, ItemMeta,
};
use crate::enrich::targeted_research;
use crate::item::{ItemContext, run_item};
use crate::limiter::ConcurrencyLimiter;
use crate::metrics::{CostCategory, CostLedger, RunMetrics};
use crate::oracle::breaker::{BreakerSet, OracleKind, call_with_retries};
use crate::oracle::{
    AssetOracle, CritiqueOracle, GeneratedAsset, OracleEnv, PlanningOracle, RenderOracle,
    ResearchOracle,
};
use crate::repair::{RepairAbort, run_repair_loop};

/// The consumed collaborators, bundled.
///
/// The asset oracle is shared (`Arc`) because prefetch workers may outlive
/// their caller's deadline.
pub struct Oracles<R, P, C, A, D> {
    pub research: R,
    pub planner: P,
    pub critique: C,
    pub assets: Arc<A>,
    pub renderer: D,
}

/// Caller-facing options for one run.
#[derive(Debug, Clone, Default)]
pub struct ProduceOptions {
    /// Overrides `run.item_count_default` when set.
    pub item_count: Option<usize>,
    pub config: OrchestratorConfig,
}

/// Visual validation summary attached to sampled items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualSummary {
    pub score: f64,
    pub verdict: Option<CritiqueVerdict>,
    pub rounds_run: u32,
    pub repairs_applied: usize,
    pub converged: bool,
    pub abort_reason: Option<RepairAbort>,
    pub spatial_issues: usize,
}

/// One finished item of the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalItem {
    pub index: usize,
    pub kind: ItemKind,
    pub layout_id: String,
    pub plan: ContentPlan,
    pub warnings: Vec<String>,
    /// Accepted via the attempt ceiling rather than a clean pass.
    pub forced: bool,
    pub visual: Option<VisualSummary>,
    pub asset: Option<GeneratedAsset>,
}

/// Everything `produce` returns.
#[derive(Debug, Clone)]
pub struct Production {
    pub items: Vec<FinalItem>,
    pub metrics: RunMetrics,
}

/// Produce a complete artifact for `topic`.
///
/// Fails only on invalid input; oracle failures degrade per item and the
/// run completes with warnings and fallback content instead of erroring.
#[instrument(skip_all, fields(topic))]
pub fn produce<R, P, C, A, D>(
    topic: &str,
    options: &ProduceOptions,
    oracles: &Oracles<R, P, C, A, D>,
) -> Result<Production>
where
    R: ResearchOracle,
    P: PlanningOracle,
    C: CritiqueOracle + Sync,
    A: AssetOracle + Send + Sync + 'static,
    D: RenderOracle + Sync,
{
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(anyhow!("topic must not be empty"));
    }
    let config = &options.config;
    config.validate()?;

    let run_started = Instant::now();
    let run_id = format!("deck-{}", Utc::now().format("%Y%m%d_%H%M%S"));
    let mut metrics = RunMetrics::new(run_id.clone(), Utc::now().to_rfc3339());
    info!(%run_id, topic, "production started");

    let breakers = BreakerSet::new();
    let ledger = CostLedger::new();
    let limiter = Arc::new(ConcurrencyLimiter::new(config.concurrency.max_parallel_calls));
    let env = OracleEnv {
        breakers: &breakers,
        ledger: &ledger,
        retry: &config.retry,
        tiers: &config.run.tiers,
        costs: &config.costs,
    };

    // Research phase. Total failure degrades to default scaffolding.
    let research_started = Instant::now();
    let mut facts = initial_research(&oracles.research, &env, topic);
    metrics.timings.research_ms = elapsed_ms(research_started);

    let item_count = options
        .item_count
        .unwrap_or(config.run.item_count_default)
        .max(1);
    let outline = build_outline(topic, &facts, item_count);

    // Speculative asset prefetch, hidden behind the per-item loop.
    let prefetch_handle = {
        let oracle = Arc::clone(&oracles.assets);
        let limiter = Arc::clone(&limiter);
        let ledger = ledger.clone();
        let costs = config.costs.clone();
        let tier = config
            .run
            .tiers
            .first()
            .cloned()
            .unwrap_or_else(|| "standard".to_string());
        let needs = extract_asset_needs(&outline);
        let deadline_ms = config.concurrency.prefetch_deadline_ms;
        thread::spawn(move || {
            let started = Instant::now();
            let result =
                prefetch_assets(&oracle, &limiter, &ledger, &costs, &tier, needs, deadline_ms);
            (result, elapsed_ms(started))
        })
    };

    // Sequential per-item loop.
    let items_started = Instant::now();
    let mut narrative: Vec<String> = Vec::new();
    let mut worked: Vec<WorkedItem> = Vec::with_capacity(outline.len());
    let mut visual_ms = 0u64;
    for meta in &outline {
        let ctx = ItemContext {
            research: &oracles.research,
            planner: &oracles.planner,
            env,
            config,
            topic,
            total_items: outline.len(),
        };
        let outcome = run_item(&ctx, meta, &mut facts, &narrative);

        metrics.enrichments += outcome.enrichments;
        metrics.prunes += outcome.prunes;
        metrics.summarizes += outcome.summarizes;
        metrics.reroutes += outcome.reroutes;
        metrics.gate_checks += outcome.gate_checks;
        metrics.gate_failures += outcome.gate_failures;
        if outcome.forced {
            metrics.forced_accepts += 1;
        }

        let mut state = outcome.state;
        let mut visual = None;
        if outcome.sampled {
            metrics.visual_validations += 1;
            let visual_started = Instant::now();
            let repair = run_repair_loop(
                &oracles.critique,
                &oracles.renderer,
                &env,
                &config.repair,
                state.plan.clone(),
                &state.layout_id,
            );
            visual_ms += elapsed_ms(visual_started);
            metrics.repair_rounds += repair.rounds_run;
            if !repair.converged {
                metrics.visual_failures += 1;
            }
            if let Some(reason) = repair.abort_reason {
                state.warnings.push(format!("visual repair aborted: {reason:?}"));
            }
            state.plan = repair.plan.clone();
            visual = Some(VisualSummary {
                score: repair.final_score,
                verdict: repair.last_verdict,
                rounds_run: repair.rounds_run,
                repairs_applied: repair.repairs_applied,
                converged: repair.converged,
                abort_reason: repair.abort_reason,
                spatial_issues: count_spatial(&repair.last_issues),
            });
        }

        narrative.push(state.plan.title.clone());
        worked.push(WorkedItem {
            meta: meta.clone(),
            state,
            forced: outcome.forced,
            visual,
        });
    }
    metrics.timings.items_ms = elapsed_ms(items_started);
    metrics.timings.visual_ms = visual_ms;

    // Join the prefetch collector (bounded by its own deadline) and bind
    // assets to final content through the drift detector.
    let (prefetch, assets_ms) = match prefetch_handle.join() {
        Ok(result) => result,
        Err(_) => {
            warn!("asset prefetch thread panicked, continuing without assets");
            (Default::default(), 0)
        }
    };
    metrics.timings.assets_ms = assets_ms;
    metrics.assets_generated = prefetch.generated;
    metrics.assets_abandoned = prefetch.abandoned;

    let mut items = Vec::with_capacity(worked.len());
    for item in &worked {
        let asset = match prefetch.assets.get(&item.meta.index) {
            Some(candidate) => {
                match bind_asset(candidate, &item.state.plan.title, &item.meta.purpose) {
                    Some(bound) => {
                        metrics.assets_used += 1;
                        Some(bound)
                    }
                    None => {
                        metrics.assets_stale += 1;
                        None
                    }
                }
            }
            None => None,
        };
        items.push(FinalItem {
            index: item.meta.index,
            kind: item.meta.kind,
            layout_id: item.state.layout_id.clone(),
            plan: item.state.plan.clone(),
            warnings: item.state.warnings.clone(),
            forced: item.forced,
            visual: item.visual.clone(),
            asset,
        });
    }

    // Consensus over sampled scores, topping up to the configured minimum.
    let consensus_started = Instant::now();
    let samples = gather_samples(
        &worked,
        &oracles.critique,
        &oracles.renderer,
        &env,
        &limiter,
        &config.consensus,
    );
    metrics.consensus = build_report(&samples, &config.consensus);
    metrics.timings.consensus_ms = elapsed_ms(consensus_started);

    metrics.cost = ledger.snapshot();
    metrics.timings.total_ms = elapsed_ms(run_started);
    metrics.finished_at = Utc::now().to_rfc3339();
    info!(
        %run_id,
        items = items.len(),
        cost = metrics.cost.total(),
        "production complete"
    );

    Ok(Production { items, metrics })
}

struct WorkedItem {
    meta: ItemMeta,
    state: ItemState,
    forced: bool,
    visual: Option<VisualSummary>,
}

fn initial_research<R: ResearchOracle>(
    oracle: &R,
    env: &OracleEnv<'_>,
    topic: &str,
) -> Vec<Fact> {
    let facts = targeted_research(oracle, env, topic, &[]);
    if facts.is_empty() {
        warn!(topic, "research yielded nothing, producing from scaffolding");
    }
    facts
}

/// Derive the item outline from the topic and whatever facts exist.
fn build_outline(topic: &str, facts: &[Fact], count: usize) -> Vec<ItemMeta> {
    let mut outline = Vec::with_capacity(count);
    outline.push(ItemMeta {
        index: 0,
        kind: ItemKind::Title,
        heading: topic.to_string(),
        purpose: "opening".to_string(),
    });
    if count == 1 {
        return outline;
    }

    for index in 1..count - 1 {
        let anchor = facts.get(index - 1);
        let heading = anchor
            .map(|fact| heading_from_claim(&fact.claim))
            .unwrap_or_else(|| format!("{topic}: part {index}"));
        let purpose = match anchor {
            Some(fact) if fact.claim.chars().any(|c| c.is_ascii_digit()) => {
                "key data highlights".to_string()
            }
            _ => "supporting detail".to_string(),
        };
        outline.push(ItemMeta {
            index,
            kind: ItemKind::Standard,
            heading,
            purpose,
        });
    }

    outline.push(ItemMeta {
        index: count - 1,
        kind: ItemKind::Closing,
        heading: format!("{topic}: takeaways"),
        purpose: "summary".to_string(),
    });
    outline
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn heading_from_claim(claim: &str) -> String {
    claim
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join(" ")
}

fn count_spatial(issues: &[CritiqueIssue]) -> usize {
    issues
        .iter()
        .filter(|issue| issue.category == IssueCategory::Spatial)
        .count()
}

/// Collect score samples: reuse repair-loop critiques, then top up items
/// without one until the configured minimum, sequentially or in parallel
/// depending on the estimated latency.
fn gather_samples<C, D>(
    worked: &[WorkedItem],
    critique: &C,
    renderer: &D,
    env: &OracleEnv<'_>,
    limiter: &Arc<ConcurrencyLimiter>,
    config: &ConsensusConfig,
) -> Vec<ScoreSample>
where
    C: CritiqueOracle + Sync,
    D: RenderOracle + Sync,
{
    let mut samples: Vec<ScoreSample> = worked
        .iter()
        .filter_map(|item| {
            item.visual.as_ref().map(|visual| ScoreSample {
                item_index: item.meta.index,
                score: visual.score,
                verdict: visual.verdict.unwrap_or(CritiqueVerdict::FlagForReview),
                spatial_issues: visual.spatial_issues,
            })
        })
        .collect();

    let missing: Vec<&WorkedItem> = worked
        .iter()
        .filter(|item| item.visual.is_none())
        .take(config.min_samples.saturating_sub(samples.len()))
        .collect();
    if missing.is_empty() {
        return samples;
    }

    let mode = execution_mode(missing.len(), config);
    debug!(pending = missing.len(), ?mode, "gathering consensus samples");
    match mode {
        ExecutionMode::Sequential => {
            for item in missing {
                if let Some(sample) = sample_item(item, critique, renderer, env) {
                    samples.push(sample);
                }
            }
        }
        ExecutionMode::Parallel => {
            let gathered: Mutex<Vec<ScoreSample>> = Mutex::new(Vec::new());
            thread::scope(|scope| {
                for item in missing {
                    let gathered = &gathered;
                    let limiter = Arc::clone(limiter);
                    scope.spawn(move || {
                        let _permit = limiter.acquire();
                        if let Some(sample) = sample_item(item, critique, renderer, env) {
                            gathered
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .push(sample);
                        }
                    });
                }
            });
            samples.extend(
                gathered
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner),
            );
        }
    }

    samples.sort_by_key(|sample| sample.item_index);
    samples
}

fn sample_item<C: CritiqueOracle, D: RenderOracle>(
    item: &WorkedItem,
    critique: &C,
    renderer: &D,
    env: &OracleEnv<'_>,
) -> Option<ScoreSample> {
    let rendered = match renderer.render(&item.state.plan, &item.state.layout_id) {
        Ok(proxy) => proxy,
        Err(err) => {
            warn!(item = item.meta.index, %err, "consensus render failed");
            return None;
        }
    };
    match call_with_retries(
        env.breakers,
        OracleKind::Critique,
        env.retry,
        env.tiers,
        |tier| critique.critique(&rendered, tier),
    ) {
        Ok(result) => {
            env.ledger
                .record(CostCategory::Critique, env.costs.critique_call);
            Some(ScoreSample {
                item_index: item.meta.index,
                score: result.score,
                verdict: result.verdict,
                spatial_issues: count_spatial(&result.issues),
            })
        }
        Err(err) => {
            warn!(item = item.meta.index, %err, "consensus critique failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(claim: &str) -> Fact {
        Fact {
            id: "f".to_string(),
            claim: claim.to_string(),
            source: None,
        }
    }

    #[test]
    fn outline_brackets_heroes_around_standard_items() {
        let facts = vec![
            fact("revenue grew 14% quarter over quarter and kept climbing"),
            fact("customer interviews highlighted onboarding friction"),
        ];
        let outline = build_outline("QBR", &facts, 4);

        assert_eq!(outline.len(), 4);
        assert_eq!(outline[0].kind, ItemKind::Title);
        assert_eq!(outline[3].kind, ItemKind::Closing);
        assert_eq!(outline[1].kind, ItemKind::Standard);
        // Numeric anchor fact routes toward a data purpose.
        assert_eq!(outline[1].purpose, "key data highlights");
        assert_eq!(outline[2].purpose, "supporting detail");
        assert_eq!(outline[1].heading, "revenue grew 14% quarter over quarter");
    }

    #[test]
    fn outline_pads_headings_when_facts_run_out() {
        let outline = build_outline("QBR", &[], 4);
        assert_eq!(outline[1].heading, "QBR: part 1");
        assert_eq!(outline[2].heading, "QBR: part 2");
    }

    #[test]
    fn single_item_outline_is_a_lone_title() {
        let outline = build_outline("QBR", &[], 1);
        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].kind, ItemKind::Title);
    }
}
