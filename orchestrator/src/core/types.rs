//! Shared deterministic types for the orchestration core.
//!
//! These types define stable contracts between components. They must not
//! depend on external state or I/O and must remain deterministic across runs.

use serde::{Deserialize, Serialize};

/// A single labelled figure carried by an item plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    pub label: String,
    pub value: String,
}

/// Structured content for one item of the artifact.
///
/// Produced by the planning oracle (after normalization) and refined by the
/// per-item loop. Invariant: `key_points` is non-empty unless the active
/// layout profile allows empty content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPlan {
    pub title: String,
    pub key_points: Vec<String>,
    #[serde(default)]
    pub data_points: Vec<DataPoint>,
    #[serde(default)]
    pub narrative: Option<String>,
}

impl ContentPlan {
    /// Total content length across key points, in Unicode scalar values.
    pub fn total_chars(&self) -> usize {
        self.key_points.iter().map(|p| p.chars().count()).sum()
    }

    /// Count of renderable elements (title + points + data points).
    pub fn element_count(&self) -> usize {
        1 + self.key_points.len() + self.data_points.len()
    }
}

/// Role of an item within the artifact.
///
/// Hero items (title/closing) carry inverted quality bounds: sparse content
/// is fine, excess content is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Title,
    Standard,
    Closing,
}

impl ItemKind {
    pub fn is_hero(self) -> bool {
        matches!(self, ItemKind::Title | ItemKind::Closing)
    }
}

/// Static metadata for one item, fixed before planning starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Zero-based position within the artifact.
    pub index: usize,
    pub kind: ItemKind,
    /// Seed heading the planner elaborates on.
    pub heading: String,
    /// What this item is for ("opening", "supporting detail", ...).
    pub purpose: String,
}

/// Why a plan failed quality evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    ThinContent,
    TooGeneric,
    MissingSpecifics,
    Overflow,
    TooManyPoints,
    TooVerbose,
}

/// Corrective action suggested by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedAction {
    Enrich,
    Prune,
    Summarize,
    Pass,
}

/// Outcome of a quality evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub passes: bool,
    pub reason: Option<QualityIssue>,
    pub suggested_action: Option<SuggestedAction>,
    pub details: String,
    /// Characters past the total budget, for overflow failures.
    pub overflow_amount: Option<usize>,
}

impl QualityVerdict {
    pub fn pass() -> Self {
        Self {
            passes: true,
            reason: None,
            suggested_action: Some(SuggestedAction::Pass),
            details: String::new(),
            overflow_amount: None,
        }
    }

    pub fn fail(reason: QualityIssue, action: SuggestedAction, details: String) -> Self {
        Self {
            passes: false,
            reason: Some(reason),
            suggested_action: Some(action),
            details,
            overflow_amount: None,
        }
    }
}

/// A single research finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub claim: String,
    pub source: Option<String>,
}

/// Verdict from the visual critique oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CritiqueVerdict {
    Accept,
    FlagForReview,
    RequiresRepair,
}

/// Category of a critique issue. Spatial issues feed the consensus engine's
/// density recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Spatial,
    Color,
    Typography,
    Content,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CritiqueIssue {
    pub category: IssueCategory,
    pub message: String,
}

/// Category of repair the critique oracle may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    Reposition,
    Resize,
    Recolor,
    Respace,
    RemoveItems,
}

/// One repair requested by the critique oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairOp {
    /// Id of the render element the repair targets.
    pub target_id: String,
    pub action: RepairAction,
    /// Action-specific parameters; read defensively, unknown fields ignored.
    pub params: serde_json::Value,
    pub reason: String,
}

/// Full output of one critique oracle invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualCritique {
    /// 0–100.
    pub score: f64,
    pub verdict: CritiqueVerdict,
    #[serde(default)]
    pub issues: Vec<CritiqueIssue>,
    #[serde(default)]
    pub repairs: Vec<RepairOp>,
}
