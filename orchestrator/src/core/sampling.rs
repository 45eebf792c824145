//! Risk-based sampling policy for expensive visual validation.

use serde::{Deserialize, Serialize};

use crate::core::profiles::RiskClass;

/// Policy knobs for visual sampling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Fraction of interior medium-risk items to validate (0, 1].
    pub rate: f64,
    /// Low-risk layouts validate only when the title exceeds this length.
    pub low_risk_title_threshold: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            rate: 0.3,
            low_risk_title_threshold: 40,
        }
    }
}

/// Decide whether an item warrants a visual validation pass.
///
/// High risk always validates. Low risk validates only on oversized titles.
/// Medium risk always validates the first and last item and samples interior
/// items deterministically at every N-th index, N = ceil(1/rate).
pub fn should_validate_visually(
    item_index: usize,
    total_items: usize,
    risk: RiskClass,
    title: &str,
    config: &SamplingConfig,
) -> bool {
    match risk {
        RiskClass::High => true,
        RiskClass::Low => title.chars().count() > config.low_risk_title_threshold,
        RiskClass::Medium => {
            if item_index == 0 || item_index + 1 == total_items {
                return true;
            }
            let stride = sampling_stride(config.rate);
            item_index % stride == 0
        }
    }
}

fn sampling_stride(rate: f64) -> usize {
    if rate <= 0.0 {
        return usize::MAX;
    }
    let stride = (1.0 / rate).ceil() as usize;
    stride.max(1)
}
