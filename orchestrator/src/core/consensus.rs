//! Cross-item consistency statistics over sampled critique scores.

use serde::{Deserialize, Serialize};

use crate::core::types::CritiqueVerdict;

/// Policy knobs for the consensus pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Deviation from the mean past which an item is an outlier.
    pub outlier_deviation: f64,
    /// Items scoring below this floor count toward layout simplification.
    pub low_score_floor: f64,
    /// Fraction of sampled items with spatial issues that triggers a global
    /// density recommendation.
    pub spatial_issue_ratio: f64,
    /// Minimum samples the engine gathers before computing statistics.
    pub min_samples: usize,
    /// Estimated latency of one critique call, for the mode decision.
    pub per_call_latency_ms: u64,
    /// Sequential-latency budget past which gathering goes parallel.
    pub latency_budget_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            outlier_deviation: 15.0,
            low_score_floor: 60.0,
            spatial_issue_ratio: 0.3,
            min_samples: 2,
            per_call_latency_ms: 2_000,
            latency_budget_ms: 6_000,
        }
    }
}

/// One sampled item score with the critique context consensus needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSample {
    pub item_index: usize,
    pub score: f64,
    pub verdict: CritiqueVerdict,
    pub spatial_issues: usize,
}

/// An item whose score sits far from the deck mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    pub item_index: usize,
    pub deviation: f64,
    pub reason: String,
}

/// Deck-level follow-up suggested by the consensus rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recommendation {
    ReduceGlobalDensity { affected: usize, sampled: usize },
    SimplifyLayouts { item_indexes: Vec<usize> },
    RevalidateItems { item_indexes: Vec<usize> },
}

/// Read-only report computed once after every item reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub average_score: f64,
    pub std_dev: f64,
    /// 100 for a perfectly even deck, eroded by score spread.
    pub consistency_score: f64,
    pub outliers: Vec<Outlier>,
    pub recommendations: Vec<Recommendation>,
}

impl ConsensusReport {
    pub fn empty() -> Self {
        Self {
            average_score: 0.0,
            std_dev: 0.0,
            consistency_score: 0.0,
            outliers: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

/// How consensus gathering should execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

/// Pick the gathering mode by comparing estimated sequential latency
/// (call count x per-call latency) against the configured budget.
pub fn execution_mode(pending_calls: usize, config: &ConsensusConfig) -> ExecutionMode {
    let estimated = pending_calls as u64 * config.per_call_latency_ms;
    if estimated > config.latency_budget_ms {
        ExecutionMode::Parallel
    } else {
        ExecutionMode::Sequential
    }
}

/// Compute the consensus report from sampled scores.
pub fn build_report(samples: &[ScoreSample], config: &ConsensusConfig) -> ConsensusReport {
    if samples.is_empty() {
        return ConsensusReport::empty();
    }

    let count = samples.len() as f64;
    let mean = samples.iter().map(|s| s.score).sum::<f64>() / count;
    let variance = samples
        .iter()
        .map(|s| {
            let d = s.score - mean;
            d * d
        })
        .sum::<f64>()
        / count;
    let std_dev = variance.sqrt();
    let consistency_score = (100.0 - 2.0 * std_dev).max(0.0);

    let mut outliers = Vec::new();
    for sample in samples {
        let deviation = (sample.score - mean).abs();
        if deviation > config.outlier_deviation {
            let reason = if sample.score < mean {
                "needs improvement".to_string()
            } else {
                "over-polished relative to deck".to_string()
            };
            outliers.push(Outlier {
                item_index: sample.item_index,
                deviation,
                reason,
            });
        }
    }

    let recommendations = build_recommendations(samples, config);

    ConsensusReport {
        average_score: mean,
        std_dev,
        consistency_score,
        outliers,
        recommendations,
    }
}

fn build_recommendations(samples: &[ScoreSample], config: &ConsensusConfig) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    let spatial = samples.iter().filter(|s| s.spatial_issues > 0).count();
    if spatial as f64 / samples.len() as f64 >= config.spatial_issue_ratio {
        recommendations.push(Recommendation::ReduceGlobalDensity {
            affected: spatial,
            sampled: samples.len(),
        });
    }

    let below_floor: Vec<usize> = samples
        .iter()
        .filter(|s| s.score < config.low_score_floor)
        .map(|s| s.item_index)
        .collect();
    if below_floor.len() >= 2 {
        recommendations.push(Recommendation::SimplifyLayouts {
            item_indexes: below_floor,
        });
    }

    let needs_repair: Vec<usize> = samples
        .iter()
        .filter(|s| s.verdict == CritiqueVerdict::RequiresRepair)
        .map(|s| s.item_index)
        .collect();
    if !needs_repair.is_empty() {
        recommendations.push(Recommendation::RevalidateItems {
            item_indexes: needs_repair,
        });
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(index: usize, score: f64) -> ScoreSample {
        ScoreSample {
            item_index: index,
            score,
            verdict: CritiqueVerdict::Accept,
            spatial_issues: 0,
        }
    }

    /// [80,82,79,81,30]: only the 30 deviates more than 15 from the mean.
    #[test]
    fn far_score_is_the_only_outlier() {
        let samples: Vec<ScoreSample> = [80.0, 82.0, 79.0, 81.0, 30.0]
            .iter()
            .enumerate()
            .map(|(i, &s)| sample(i, s))
            .collect();
        let report = build_report(&samples, &ConsensusConfig::default());

        assert!((report.average_score - 70.4).abs() < 1e-9);
        assert_eq!(report.outliers.len(), 1);
        assert_eq!(report.outliers[0].item_index, 4);
        assert_eq!(report.outliers[0].reason, "needs improvement");
        assert!(report.outliers[0].deviation > 15.0);
    }

    #[test]
    fn high_scorer_is_tagged_over_polished() {
        let samples: Vec<ScoreSample> = [50.0, 52.0, 48.0, 51.0, 95.0]
            .iter()
            .enumerate()
            .map(|(i, &s)| sample(i, s))
            .collect();
        let report = build_report(&samples, &ConsensusConfig::default());
        let outlier = report
            .outliers
            .iter()
            .find(|o| o.item_index == 4)
            .expect("outlier");
        assert_eq!(outlier.reason, "over-polished relative to deck");
    }

    #[test]
    fn even_scores_yield_high_consistency() {
        let samples: Vec<ScoreSample> = (0..4).map(|i| sample(i, 80.0)).collect();
        let report = build_report(&samples, &ConsensusConfig::default());
        assert_eq!(report.std_dev, 0.0);
        assert_eq!(report.consistency_score, 100.0);
        assert!(report.outliers.is_empty());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn spatial_issue_ratio_triggers_density_recommendation() {
        let mut samples: Vec<ScoreSample> = (0..10).map(|i| sample(i, 80.0)).collect();
        for s in samples.iter_mut().take(3) {
            s.spatial_issues = 2;
        }
        let report = build_report(&samples, &ConsensusConfig::default());
        assert!(matches!(
            report.recommendations[0],
            Recommendation::ReduceGlobalDensity {
                affected: 3,
                sampled: 10
            }
        ));
    }

    #[test]
    fn two_low_scores_trigger_layout_simplification() {
        let mut samples: Vec<ScoreSample> = (0..5).map(|i| sample(i, 80.0)).collect();
        samples[1].score = 55.0;
        samples[3].score = 40.0;
        let report = build_report(&samples, &ConsensusConfig::default());
        assert!(report.recommendations.iter().any(|r| matches!(
            r,
            Recommendation::SimplifyLayouts { item_indexes } if *item_indexes == vec![1, 3]
        )));

        samples[3].score = 80.0;
        let report = build_report(&samples, &ConsensusConfig::default());
        assert!(
            !report
                .recommendations
                .iter()
                .any(|r| matches!(r, Recommendation::SimplifyLayouts { .. }))
        );
    }

    #[test]
    fn requires_repair_triggers_revalidation() {
        let mut samples: Vec<ScoreSample> = (0..3).map(|i| sample(i, 80.0)).collect();
        samples[2].verdict = CritiqueVerdict::RequiresRepair;
        let report = build_report(&samples, &ConsensusConfig::default());
        assert!(report.recommendations.iter().any(|r| matches!(
            r,
            Recommendation::RevalidateItems { item_indexes } if *item_indexes == vec![2]
        )));
    }

    #[test]
    fn mode_goes_parallel_past_the_latency_budget() {
        let config = ConsensusConfig::default();
        assert_eq!(execution_mode(3, &config), ExecutionMode::Sequential);
        assert_eq!(execution_mode(4, &config), ExecutionMode::Parallel);
        assert_eq!(execution_mode(0, &config), ExecutionMode::Sequential);
    }

    #[test]
    fn no_samples_yield_the_empty_report() {
        let report = build_report(&[], &ConsensusConfig::default());
        assert_eq!(report, ConsensusReport::empty());
    }
}
