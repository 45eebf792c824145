//! Test-only scripted oracles and builders.
//!
//! Scripted oracles return predetermined responses in order, then fall back
//! to a benign default, so tests script the interesting rounds and ignore
//! the rest. All of them are thread-safe: asset and consensus fan-outs call
//! oracles from worker threads.

use std::sync::Mutex;

use serde_json::{Value, json};

use crate::core::types::{
    CritiqueIssue, CritiqueVerdict, Fact, IssueCategory, ItemKind, ItemMeta, RepairAction,
    RepairOp, VisualCritique,
};
use crate::oracle::error::OracleError;
use crate::oracle::{
    AssetNeed, AssetOracle, CritiqueOracle, GeneratedAsset, PlanRequest, PlanningOracle,
    RenderProxy, ResearchOracle,
};

/// Research oracle replaying scripted responses; empty script returns no
/// facts.
pub struct ScriptedResearch {
    responses: Mutex<Vec<Result<Vec<Fact>, OracleError>>>,
}

impl ScriptedResearch {
    pub fn new(mut responses: Vec<Result<Vec<Fact>, OracleError>>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
        }
    }
}

impl ResearchOracle for ScriptedResearch {
    fn research(&self, _query: &str, _tier: &str) -> Result<Vec<Fact>, OracleError> {
        self.responses
            .lock()
            .expect("responses")
            .pop()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Planning oracle replaying scripted raw JSON; empty script repeats the
/// configured fallthrough value.
pub struct ScriptedPlanner {
    responses: Mutex<Vec<Result<Value, OracleError>>>,
    fallthrough: Value,
}

impl ScriptedPlanner {
    pub fn new(mut responses: Vec<Result<Value, OracleError>>, fallthrough: Value) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            fallthrough,
        }
    }

    pub fn repeating(value: Value) -> Self {
        Self::new(Vec::new(), value)
    }
}

impl PlanningOracle for ScriptedPlanner {
    fn draft_plan(&self, _request: &PlanRequest<'_>, _tier: &str) -> Result<Value, OracleError> {
        self.responses
            .lock()
            .expect("responses")
            .pop()
            .unwrap_or_else(|| Ok(self.fallthrough.clone()))
    }
}

/// Critique oracle replaying scripted critiques; empty script accepts with a
/// fixed score.
pub struct ScriptedCritique {
    responses: Mutex<Vec<Result<VisualCritique, OracleError>>>,
    fallthrough_score: f64,
}

impl ScriptedCritique {
    pub fn new(mut responses: Vec<Result<VisualCritique, OracleError>>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            fallthrough_score: 90.0,
        }
    }

    pub fn accepting(score: f64) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fallthrough_score: score,
        }
    }
}

impl CritiqueOracle for ScriptedCritique {
    fn critique(&self, _rendered: &RenderProxy, _tier: &str) -> Result<VisualCritique, OracleError> {
        self.responses
            .lock()
            .expect("responses")
            .pop()
            .unwrap_or_else(|| Ok(accepting_critique(self.fallthrough_score)))
    }
}

/// Asset oracle echoing each need back as a tiny payload.
pub struct EchoAssets;

impl AssetOracle for EchoAssets {
    fn synthesize(&self, need: &AssetNeed, _tier: &str) -> Result<GeneratedAsset, OracleError> {
        Ok(GeneratedAsset {
            content_id: need.content_id.clone(),
            prompt: need.prompt.clone(),
            payload: Some(vec![1, 2, 3]),
        })
    }
}

/// Asset oracle that always fails.
pub struct UnavailableAssets;

impl AssetOracle for UnavailableAssets {
    fn synthesize(&self, _need: &AssetNeed, _tier: &str) -> Result<GeneratedAsset, OracleError> {
        Err(OracleError::Unavailable("no asset backend".to_string()))
    }
}

pub fn fact(id: &str, claim: &str) -> Fact {
    Fact {
        id: id.to_string(),
        claim: claim.to_string(),
        source: None,
    }
}

pub fn meta(index: usize, kind: ItemKind, heading: &str) -> ItemMeta {
    ItemMeta {
        index,
        kind,
        heading: heading.to_string(),
        purpose: "supporting detail".to_string(),
    }
}

/// A planner payload that passes the standard profile untouched.
pub fn conforming_plan_value(title: &str) -> Value {
    json!({
        "title": title,
        "key_points": [
            "revenue grew 14% quarter over quarter",
            "net retention reached 118% in March",
            "expansion pipeline doubled since January",
        ],
    })
}

pub fn accepting_critique(score: f64) -> VisualCritique {
    VisualCritique {
        score,
        verdict: CritiqueVerdict::Accept,
        issues: Vec::new(),
        repairs: Vec::new(),
    }
}

pub fn repair_critique(score: f64, action: RepairAction, target: &str) -> VisualCritique {
    VisualCritique {
        score,
        verdict: CritiqueVerdict::RequiresRepair,
        issues: vec![CritiqueIssue {
            category: IssueCategory::Spatial,
            message: "elements crowd the safe area".to_string(),
        }],
        repairs: vec![RepairOp {
            target_id: target.to_string(),
            action,
            params: json!({"dx": 6.0, "dy": -3.0, "scale": 0.92, "gap": 9.0}),
            reason: "rebalance".to_string(),
        }],
    }
}
