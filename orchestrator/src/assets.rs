//! Speculative asset prefetch and drift-checked binding.
//!
//! Asset synthesis is slow, so needs extracted from the outline fan out
//! under the concurrency limiter while the per-item loops run. Workers not
//! finished by the wall-clock deadline are abandoned, never cancelled: their
//! eventual completion still records cost, under the orphaned category.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::core::fingerprint::{content_fingerprint, fingerprints_match};
use crate::core::profiles::{layout_spec, route_layout};
use crate::core::types::ItemMeta;
use crate::limiter::ConcurrencyLimiter;
use crate::metrics::{CostCategory, CostLedger, OracleCosts};
use crate::oracle::{AssetNeed, AssetOracle, GeneratedAsset};

/// Kind string folded into asset fingerprints.
const ASSET_KIND: &str = "image";

/// What the prefetch pass produced.
#[derive(Debug, Default)]
pub struct PrefetchResult {
    /// Completed assets by item index.
    pub assets: HashMap<usize, GeneratedAsset>,
    pub generated: u32,
    pub failed: u32,
    /// Calls still in flight when the deadline passed.
    pub abandoned: u32,
}

/// Extract asset needs from the outline for layouts that reserve asset space.
pub fn extract_asset_needs(metas: &[ItemMeta]) -> Vec<AssetNeed> {
    metas
        .iter()
        .filter(|meta| layout_spec(route_layout(meta)).wants_asset)
        .map(|meta| AssetNeed {
            item_index: meta.index,
            content_id: content_fingerprint(&meta.heading, &meta.purpose, ASSET_KIND),
            prompt: format!("{}: {}", meta.heading, meta.purpose),
        })
        .collect()
}

/// Fan out asset synthesis under the limiter with a wall-clock deadline.
///
/// The oracle and its tier are fixed for the whole fan-out; the first tier
/// of the fallback chain applies (asset synthesis has no cheaper tier worth
/// falling back to mid-fanout).
#[instrument(skip_all, fields(needs = needs.len(), deadline_ms))]
pub fn prefetch_assets<A>(
    oracle: &Arc<A>,
    limiter: &Arc<ConcurrencyLimiter>,
    ledger: &CostLedger,
    costs: &OracleCosts,
    tier: &str,
    needs: Vec<AssetNeed>,
    deadline_ms: u64,
) -> PrefetchResult
where
    A: AssetOracle + Send + Sync + 'static,
{
    let mut result = PrefetchResult::default();
    if needs.is_empty() {
        return result;
    }

    let (tx, rx) = mpsc::channel::<(usize, Result<GeneratedAsset, String>)>();
    let mut pending: HashMap<usize, Arc<AtomicBool>> = HashMap::new();
    let asset_cost = costs.asset_call;
    let tier = tier.to_string();

    for need in needs {
        let abandoned = Arc::new(AtomicBool::new(false));
        pending.insert(need.item_index, Arc::clone(&abandoned));

        let oracle = Arc::clone(oracle);
        let limiter = Arc::clone(limiter);
        let ledger = ledger.clone();
        let tx = tx.clone();
        let tier = tier.clone();
        // Detached on purpose: an abandoned worker keeps running and settles
        // its own cost accounting when the oracle eventually returns.
        thread::spawn(move || {
            let _permit = limiter.acquire();
            let item_index = need.item_index;
            let outcome = oracle.synthesize(&need, &tier);
            if outcome.is_ok() {
                let category = if abandoned.load(Ordering::SeqCst) {
                    CostCategory::Orphaned
                } else {
                    CostCategory::Assets
                };
                ledger.record(category, asset_cost);
            }
            let _ = tx.send((item_index, outcome.map_err(|e| e.to_string())));
        });
    }
    drop(tx);

    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while !pending.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match rx.recv_timeout(remaining) {
            Ok((item_index, Ok(asset))) => {
                pending.remove(&item_index);
                debug!(item = item_index, "asset prefetched");
                result.assets.insert(item_index, asset);
                result.generated += 1;
            }
            Ok((item_index, Err(message))) => {
                pending.remove(&item_index);
                warn!(item = item_index, %message, "asset synthesis failed");
                result.failed += 1;
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for (item_index, flag) in pending {
        flag.store(true, Ordering::SeqCst);
        warn!(item = item_index, "asset call abandoned past deadline");
        result.abandoned += 1;
    }
    result
}

/// Bind a prefetched asset to an item's final content, discarding it as
/// stale when the fingerprints drifted apart.
pub fn bind_asset(
    asset: &GeneratedAsset,
    final_title: &str,
    purpose: &str,
) -> Option<GeneratedAsset> {
    let current = content_fingerprint(final_title, purpose, ASSET_KIND);
    if fingerprints_match(&asset.content_id, &current) {
        Some(asset.clone())
    } else {
        debug!(
            original = %asset.content_id,
            current = %current,
            "asset stale, discarding"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ItemKind;
    use crate::oracle::error::OracleError;

    struct InstantAssets;

    impl AssetOracle for InstantAssets {
        fn synthesize(&self, need: &AssetNeed, _tier: &str) -> Result<GeneratedAsset, OracleError> {
            Ok(GeneratedAsset {
                content_id: need.content_id.clone(),
                prompt: need.prompt.clone(),
                payload: Some(vec![0u8; 4]),
            })
        }
    }

    struct SlowAssets {
        delay: Duration,
    }

    impl AssetOracle for SlowAssets {
        fn synthesize(&self, need: &AssetNeed, _tier: &str) -> Result<GeneratedAsset, OracleError> {
            thread::sleep(self.delay);
            Ok(GeneratedAsset {
                content_id: need.content_id.clone(),
                prompt: need.prompt.clone(),
                payload: None,
            })
        }
    }

    struct FailingAssets;

    impl AssetOracle for FailingAssets {
        fn synthesize(
            &self,
            _need: &AssetNeed,
            _tier: &str,
        ) -> Result<GeneratedAsset, OracleError> {
            Err(OracleError::Transient("overloaded".to_string()))
        }
    }

    fn metas() -> Vec<ItemMeta> {
        vec![
            ItemMeta {
                index: 0,
                kind: ItemKind::Title,
                heading: "Quarterly Revenue Review".to_string(),
                purpose: "opening".to_string(),
            },
            ItemMeta {
                index: 1,
                kind: ItemKind::Standard,
                heading: "Growth metrics".to_string(),
                purpose: "key data highlights".to_string(),
            },
            ItemMeta {
                index: 2,
                kind: ItemKind::Standard,
                heading: "Outlook".to_string(),
                purpose: "supporting detail".to_string(),
            },
        ]
    }

    #[test]
    fn needs_extracted_only_for_asset_layouts() {
        let needs = extract_asset_needs(&metas());
        // hero-title and data-callout want assets; bullets-standard does not.
        let indexes: Vec<usize> = needs.iter().map(|n| n.item_index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert!(!needs[0].content_id.is_empty());
    }

    #[test]
    fn prefetch_collects_completed_assets() {
        let oracle = Arc::new(InstantAssets);
        let limiter = Arc::new(ConcurrencyLimiter::new(2));
        let ledger = CostLedger::new();
        let needs = extract_asset_needs(&metas());

        let result = prefetch_assets(
            &oracle,
            &limiter,
            &ledger,
            &OracleCosts::default(),
            "standard",
            needs,
            5_000,
        );

        assert_eq!(result.generated, 2);
        assert_eq!(result.abandoned, 0);
        assert!(result.assets.contains_key(&0));
        assert!(result.assets.contains_key(&1));
        assert_eq!(ledger.snapshot().assets, 4.0);
        assert_eq!(ledger.snapshot().orphaned, 0.0);
    }

    /// Slow calls are abandoned at the deadline but still billed, under the
    /// orphaned category, once they complete.
    #[test]
    fn slow_calls_are_abandoned_and_billed_as_orphaned() {
        let oracle = Arc::new(SlowAssets {
            delay: Duration::from_millis(150),
        });
        let limiter = Arc::new(ConcurrencyLimiter::new(2));
        let ledger = CostLedger::new();
        let needs = extract_asset_needs(&metas());

        let result = prefetch_assets(
            &oracle,
            &limiter,
            &ledger,
            &OracleCosts::default(),
            "standard",
            needs,
            10,
        );

        assert_eq!(result.generated, 0);
        assert_eq!(result.abandoned, 2);
        assert!(result.assets.is_empty());

        // The workers finish on their own schedule and settle the ledger.
        let settled = (0..100).any(|_| {
            thread::sleep(Duration::from_millis(10));
            ledger.snapshot().orphaned >= 4.0
        });
        assert!(settled, "orphaned cost never recorded");
        assert_eq!(ledger.snapshot().assets, 0.0);
    }

    #[test]
    fn failed_synthesis_is_counted_not_billed() {
        let oracle = Arc::new(FailingAssets);
        let limiter = Arc::new(ConcurrencyLimiter::new(2));
        let ledger = CostLedger::new();
        let needs = extract_asset_needs(&metas());

        let result = prefetch_assets(
            &oracle,
            &limiter,
            &ledger,
            &OracleCosts::default(),
            "standard",
            needs,
            5_000,
        );

        assert_eq!(result.failed, 2);
        assert_eq!(ledger.snapshot().total(), 0.0);
    }

    #[test]
    fn binding_respects_fingerprint_drift() {
        let asset = GeneratedAsset {
            content_id: content_fingerprint("Q3 Revenue Growth", "Financial highlights", "image"),
            prompt: "p".to_string(),
            payload: None,
        };

        assert!(bind_asset(&asset, "Q3 Revenue Overview", "Financial highlights").is_some());
        assert!(bind_asset(&asset, "Team Culture Values", "Financial highlights").is_none());
    }

    #[test]
    fn empty_needs_short_circuit() {
        let oracle = Arc::new(InstantAssets);
        let limiter = Arc::new(ConcurrencyLimiter::new(1));
        let ledger = CostLedger::new();
        let result = prefetch_assets(
            &oracle,
            &limiter,
            &ledger,
            &OracleCosts::default(),
            "standard",
            Vec::new(),
            1_000,
        );
        assert_eq!(result.generated, 0);
        assert_eq!(result.abandoned, 0);
    }
}
