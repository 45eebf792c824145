//! Tagged-state transition function for the per-item adaptive loop.
//!
//! The transition function is pure (state + event -> next state); the
//! orchestration driver in [`crate::item`] owns all side effects. Attempt
//! budgets live here too so termination is decidable without I/O.

use serde::{Deserialize, Serialize};

use crate::core::gate::Remediation;
use crate::core::profiles::RiskClass;
use crate::core::types::{ContentPlan, SuggestedAction};

/// States of the per-item machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Route,
    Plan,
    Evaluate,
    Enrich,
    Prune,
    Summarize,
    VisualGate,
    Accept,
    ForcedAccept,
}

impl MachineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MachineState::Accept | MachineState::ForcedAccept)
    }
}

/// Events the driver feeds into the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineEvent {
    Routed,
    Planned,
    QualityPassed { sampled: bool },
    QualityFailed { action: SuggestedAction },
    Corrected,
    GatePassed,
    GateFailed { remediation: Remediation },
    AttemptsExhausted,
}

/// Pure transition function over the enumerated states.
///
/// Unknown state/event combinations force-accept: the loop must terminate on
/// a driver bug rather than spin.
pub fn transition(state: MachineState, event: MachineEvent) -> MachineState {
    match (state, event) {
        (MachineState::Route, MachineEvent::Routed) => MachineState::Plan,
        (MachineState::Plan, MachineEvent::Planned) => MachineState::Evaluate,
        (MachineState::Evaluate, MachineEvent::QualityPassed { sampled: true }) => {
            MachineState::VisualGate
        }
        (MachineState::Evaluate, MachineEvent::QualityPassed { sampled: false }) => {
            MachineState::Accept
        }
        (MachineState::Evaluate, MachineEvent::QualityFailed { action }) => match action {
            SuggestedAction::Enrich => MachineState::Enrich,
            SuggestedAction::Prune => MachineState::Prune,
            SuggestedAction::Summarize => MachineState::Summarize,
            SuggestedAction::Pass => MachineState::Accept,
        },
        (
            MachineState::Enrich | MachineState::Prune | MachineState::Summarize,
            MachineEvent::Corrected,
        ) => MachineState::Evaluate,
        (MachineState::VisualGate, MachineEvent::GatePassed) => MachineState::Accept,
        (MachineState::VisualGate, MachineEvent::GateFailed { remediation }) => match remediation {
            Remediation::Prune => MachineState::Prune,
            Remediation::Summarize => MachineState::Summarize,
            Remediation::ChangeLayout => MachineState::Route,
        },
        (_, MachineEvent::AttemptsExhausted) => MachineState::ForcedAccept,
        (state, _) if state.is_terminal() => state,
        _ => MachineState::ForcedAccept,
    }
}

/// Attempt ceilings guaranteeing loop termination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ItemBudgets {
    pub max_enrichment_attempts: u32,
    pub max_adjust_attempts: u32,
    pub max_total_attempts: u32,
}

impl Default for ItemBudgets {
    fn default() -> Self {
        Self {
            max_enrichment_attempts: 2,
            max_adjust_attempts: 2,
            max_total_attempts: 4,
        }
    }
}

/// Mutable record for one item, owned exclusively by its processing loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemState {
    pub plan: ContentPlan,
    pub enrichment_attempts: u32,
    pub prune_attempts: u32,
    pub total_attempts: u32,
    pub layout_id: String,
    pub risk: RiskClass,
    pub warnings: Vec<String>,
}

impl ItemState {
    pub fn new(layout_id: String, risk: RiskClass) -> Self {
        Self {
            plan: ContentPlan {
                title: String::new(),
                key_points: Vec::new(),
                data_points: Vec::new(),
                narrative: None,
            },
            enrichment_attempts: 0,
            prune_attempts: 0,
            total_attempts: 0,
            layout_id,
            risk,
            warnings: Vec::new(),
        }
    }

    /// Whether the budgets leave room for another corrective pass of `action`.
    pub fn can_attempt(&self, action: SuggestedAction, budgets: &ItemBudgets) -> bool {
        if self.total_attempts >= budgets.max_total_attempts {
            return false;
        }
        match action {
            SuggestedAction::Enrich => self.enrichment_attempts < budgets.max_enrichment_attempts,
            SuggestedAction::Prune | SuggestedAction::Summarize => {
                self.prune_attempts < budgets.max_adjust_attempts
            }
            SuggestedAction::Pass => true,
        }
    }

    /// Whether a layout reroute still fits the total ceiling.
    pub fn can_reroute(&self, budgets: &ItemBudgets) -> bool {
        self.total_attempts < budgets.max_total_attempts
    }

    pub fn record_attempt(&mut self, action: SuggestedAction) {
        match action {
            SuggestedAction::Enrich => self.enrichment_attempts += 1,
            SuggestedAction::Prune | SuggestedAction::Summarize => self.prune_attempts += 1,
            SuggestedAction::Pass => return,
        }
        self.total_attempts += 1;
    }

    pub fn record_reroute(&mut self) {
        self.total_attempts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_route_plan_evaluate_accept() {
        let mut state = MachineState::Route;
        state = transition(state, MachineEvent::Routed);
        assert_eq!(state, MachineState::Plan);
        state = transition(state, MachineEvent::Planned);
        assert_eq!(state, MachineState::Evaluate);
        state = transition(state, MachineEvent::QualityPassed { sampled: false });
        assert_eq!(state, MachineState::Accept);
        assert!(state.is_terminal());
    }

    #[test]
    fn sampled_pass_detours_through_the_gate() {
        let state = transition(
            MachineState::Evaluate,
            MachineEvent::QualityPassed { sampled: true },
        );
        assert_eq!(state, MachineState::VisualGate);
        assert_eq!(
            transition(state, MachineEvent::GatePassed),
            MachineState::Accept
        );
    }

    #[test]
    fn quality_failures_dispatch_to_corrective_states() {
        for (action, expected) in [
            (SuggestedAction::Enrich, MachineState::Enrich),
            (SuggestedAction::Prune, MachineState::Prune),
            (SuggestedAction::Summarize, MachineState::Summarize),
        ] {
            let next = transition(MachineState::Evaluate, MachineEvent::QualityFailed { action });
            assert_eq!(next, expected);
            assert_eq!(
                transition(next, MachineEvent::Corrected),
                MachineState::Evaluate
            );
        }
    }

    #[test]
    fn gate_failure_overrides_the_quality_pass() {
        for (remediation, expected) in [
            (Remediation::Prune, MachineState::Prune),
            (Remediation::Summarize, MachineState::Summarize),
            (Remediation::ChangeLayout, MachineState::Route),
        ] {
            assert_eq!(
                transition(MachineState::VisualGate, MachineEvent::GateFailed { remediation }),
                expected
            );
        }
    }

    #[test]
    fn exhaustion_forces_acceptance_from_any_state() {
        for state in [
            MachineState::Evaluate,
            MachineState::Enrich,
            MachineState::VisualGate,
        ] {
            assert_eq!(
                transition(state, MachineEvent::AttemptsExhausted),
                MachineState::ForcedAccept
            );
        }
    }

    #[test]
    fn terminal_states_absorb_all_events() {
        assert_eq!(
            transition(MachineState::Accept, MachineEvent::Routed),
            MachineState::Accept
        );
        assert_eq!(
            transition(MachineState::ForcedAccept, MachineEvent::Planned),
            MachineState::ForcedAccept
        );
    }

    #[test]
    fn budgets_cap_each_action_and_the_total() {
        let budgets = ItemBudgets::default();
        let mut state = ItemState::new("bullets-standard".to_string(), RiskClass::Medium);

        assert!(state.can_attempt(SuggestedAction::Enrich, &budgets));
        state.record_attempt(SuggestedAction::Enrich);
        state.record_attempt(SuggestedAction::Enrich);
        assert!(!state.can_attempt(SuggestedAction::Enrich, &budgets));
        // Adjust attempts still available under the total ceiling.
        assert!(state.can_attempt(SuggestedAction::Prune, &budgets));

        state.record_attempt(SuggestedAction::Prune);
        state.record_attempt(SuggestedAction::Summarize);
        assert_eq!(state.total_attempts, 4);
        assert!(!state.can_attempt(SuggestedAction::Prune, &budgets));
        assert!(!state.can_reroute(&budgets));
    }
}
