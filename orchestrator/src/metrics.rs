//! Run accounting: counters, per-phase timings, and the shared cost ledger.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::core::consensus::ConsensusReport;

/// Estimated cost units per oracle call, by kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleCosts {
    pub research_call: f64,
    pub plan_call: f64,
    pub critique_call: f64,
    pub asset_call: f64,
}

impl Default for OracleCosts {
    fn default() -> Self {
        Self {
            research_call: 1.0,
            plan_call: 1.0,
            critique_call: 4.0,
            asset_call: 2.0,
        }
    }
}

/// Where a recorded cost belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostCategory {
    Research,
    Planning,
    Critique,
    Assets,
    /// Completions of calls the orchestrator had already abandoned. Tracked
    /// separately so spend is never undercounted.
    Orphaned,
}

/// Cost totals by category, in oracle cost units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub research: f64,
    pub planning: f64,
    pub critique: f64,
    pub assets: f64,
    pub orphaned: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.research + self.planning + self.critique + self.assets + self.orphaned
    }
}

/// Thread-safe cost ledger shared across the run, including detached asset
/// workers that may outlive their caller's deadline.
#[derive(Debug, Clone, Default)]
pub struct CostLedger {
    inner: Arc<Mutex<CostBreakdown>>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, category: CostCategory, amount: f64) {
        let mut book = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match category {
            CostCategory::Research => book.research += amount,
            CostCategory::Planning => book.planning += amount,
            CostCategory::Critique => book.critique += amount,
            CostCategory::Assets => book.assets += amount,
            CostCategory::Orphaned => book.orphaned += amount,
        }
    }

    pub fn snapshot(&self) -> CostBreakdown {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Wall-clock spent per pipeline phase, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub research_ms: u64,
    pub assets_ms: u64,
    pub items_ms: u64,
    pub visual_ms: u64,
    pub consensus_ms: u64,
    pub total_ms: u64,
}

/// Everything `produce` reports about a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,

    pub enrichments: u32,
    pub prunes: u32,
    pub summarizes: u32,
    pub reroutes: u32,
    pub forced_accepts: u32,

    pub gate_checks: u32,
    pub gate_failures: u32,
    pub visual_validations: u32,
    pub visual_failures: u32,
    pub repair_rounds: u32,

    pub assets_generated: u32,
    pub assets_used: u32,
    pub assets_stale: u32,
    pub assets_abandoned: u32,

    pub timings: PhaseTimings,
    pub cost: CostBreakdown,
    pub consensus: ConsensusReport,
}

impl RunMetrics {
    pub fn new(run_id: String, started_at: String) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: String::new(),
            enrichments: 0,
            prunes: 0,
            summarizes: 0,
            reroutes: 0,
            forced_accepts: 0,
            gate_checks: 0,
            gate_failures: 0,
            visual_validations: 0,
            visual_failures: 0,
            repair_rounds: 0,
            assets_generated: 0,
            assets_used: 0,
            assets_stale: 0,
            assets_abandoned: 0,
            timings: PhaseTimings::default(),
            cost: CostBreakdown::default(),
            consensus: ConsensusReport::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_accumulates_by_category() {
        let ledger = CostLedger::new();
        ledger.record(CostCategory::Critique, 4.0);
        ledger.record(CostCategory::Critique, 4.0);
        ledger.record(CostCategory::Orphaned, 2.0);

        let book = ledger.snapshot();
        assert_eq!(book.critique, 8.0);
        assert_eq!(book.orphaned, 2.0);
        assert_eq!(book.total(), 10.0);
    }

    #[test]
    fn ledger_clones_share_one_book() {
        let ledger = CostLedger::new();
        let clone = ledger.clone();
        clone.record(CostCategory::Assets, 2.0);
        assert_eq!(ledger.snapshot().assets, 2.0);
    }
}
