//! Orchestrator configuration (TOML).
//!
//! Every numeric policy threshold in the pipeline is configuration, not a
//! hardcoded constant. Missing fields default to sensible values; the file
//! is intended to be edited by humans and must stay stable.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::consensus::ConsensusConfig;
use crate::core::gate::GateConfig;
use crate::core::sampling::SamplingConfig;
use crate::core::state::ItemBudgets;
use crate::metrics::OracleCosts;
use crate::oracle::breaker::RetryConfig;
use crate::repair::RepairConfig;

/// Bounds on parallel fan-out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Ceiling on simultaneous expensive oracle calls.
    pub max_parallel_calls: usize,
    /// Wall-clock deadline for speculative asset prefetch; slower calls are
    /// abandoned, not cancelled.
    pub prefetch_deadline_ms: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_parallel_calls: 3,
            prefetch_deadline_ms: 20_000,
        }
    }
}

/// Full configuration for one production run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub run: RunConfig,
    pub budgets: ItemBudgets,
    pub sampling: SamplingConfig,
    pub gate: GateConfig,
    pub repair: RepairConfig,
    pub consensus: ConsensusConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub costs: OracleCosts,
}

/// Run-shape knobs that are not per-component policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Items produced when the caller does not say otherwise.
    pub item_count_default: usize,
    /// Ordered model/tier fallback chain walked on transient failure.
    pub tiers: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            item_count_default: 6,
            tiers: vec!["standard".to_string(), "economy".to_string()],
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.run.item_count_default == 0 {
            return Err(anyhow!("run.item_count_default must be > 0"));
        }
        if self.run.tiers.is_empty() || self.run.tiers.iter().any(|t| t.trim().is_empty()) {
            return Err(anyhow!("run.tiers must be a non-empty list of tier names"));
        }
        if self.budgets.max_total_attempts == 0 {
            return Err(anyhow!("budgets.max_total_attempts must be > 0"));
        }
        if !(self.sampling.rate > 0.0 && self.sampling.rate <= 1.0) {
            return Err(anyhow!("sampling.rate must be within (0, 1]"));
        }
        if self.gate.chars_per_line == 0 {
            return Err(anyhow!("gate.chars_per_line must be > 0"));
        }
        if self.repair.max_rounds == 0 {
            return Err(anyhow!("repair.max_rounds must be > 0"));
        }
        if !(0.0..=100.0).contains(&self.repair.target_score) {
            return Err(anyhow!("repair.target_score must be within 0..=100"));
        }
        if self.concurrency.max_parallel_calls == 0 {
            return Err(anyhow!("concurrency.max_parallel_calls must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns the defaults.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let config = OrchestratorConfig::default();
        config.validate()?;
        return Ok(config);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let config: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, config: &OrchestratorConfig) -> Result<()> {
    config.validate()?;
    let mut buf = toml::to_string_pretty(config).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
