//! Targeted enrichment: narrow research queries for thin items.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::core::types::Fact;
use crate::metrics::CostCategory;
use crate::oracle::breaker::{OracleKind, call_with_retries};
use crate::oracle::{OracleEnv, ResearchOracle};

/// Fetch net-new facts for a narrow query.
///
/// Facts whose claim text matches an existing fact case-insensitively are
/// dropped, as are duplicates within the response. Oracle failure logs a
/// warning and returns an empty list; callers must tolerate zero-gain
/// enrichment.
pub fn targeted_research<R: ResearchOracle>(
    oracle: &R,
    env: &OracleEnv<'_>,
    query: &str,
    existing: &[Fact],
) -> Vec<Fact> {
    let fetched = match call_with_retries(
        env.breakers,
        OracleKind::Research,
        env.retry,
        env.tiers,
        |tier| oracle.research(query, tier),
    ) {
        Ok(facts) => {
            env.ledger.record(CostCategory::Research, env.costs.research_call);
            facts
        }
        Err(err) => {
            warn!(%query, %err, "targeted research failed, continuing without");
            return Vec::new();
        }
    };

    let mut seen: HashSet<String> = existing
        .iter()
        .map(|fact| fact.claim.to_lowercase())
        .collect();

    let net_new: Vec<Fact> = fetched
        .into_iter()
        .filter(|fact| seen.insert(fact.claim.to_lowercase()))
        .collect();
    debug!(%query, gained = net_new.len(), "targeted research complete");
    net_new
}
