//! Oracle abstractions for the generative collaborators.
//!
//! Traits decouple orchestration from the actual model backends. Tests use
//! scripted oracles that return predetermined outputs without network calls.
//! Every method takes the active tier so the fallback chain stays inside the
//! orchestrator (see [`breaker`]).

pub mod breaker;
pub mod error;
pub mod normalize;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::types::{ContentPlan, Fact, ItemMeta, VisualCritique};
use crate::metrics::{CostLedger, OracleCosts};
use crate::oracle::breaker::{BreakerSet, RetryConfig};
use crate::oracle::error::OracleError;

/// How dense the planner should aim for, derived from the last verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityHint {
    Balanced,
    MoreDetail,
    Tighter,
}

/// Inputs for one planning-oracle invocation.
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub meta: &'a ItemMeta,
    pub facts: &'a [Fact],
    /// Titles of items already accepted, carried for narrative continuity.
    pub narrative: &'a [String],
    pub hint: DensityHint,
}

/// One asset the pipeline wants synthesized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetNeed {
    pub item_index: usize,
    /// Normalized fingerprint of title+purpose+type at extraction time.
    pub content_id: String,
    pub prompt: String,
}

/// A synthesized asset, bound to content by fingerprint at assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedAsset {
    pub content_id: String,
    pub prompt: String,
    pub payload: Option<Vec<u8>>,
}

/// Fetches facts for a topic or narrow query. May return empty on failure.
pub trait ResearchOracle {
    fn research(&self, query: &str, tier: &str) -> Result<Vec<Fact>, OracleError>;
}

/// Drafts an item plan. Output is raw JSON: it may be malformed and must go
/// through [`normalize::normalize_plan`] before use.
pub trait PlanningOracle {
    fn draft_plan(&self, request: &PlanRequest<'_>, tier: &str)
    -> Result<serde_json::Value, OracleError>;
}

/// Judges a rendered item. Expensive and rate limited; invoked only per the
/// sampling policy.
pub trait CritiqueOracle {
    fn critique(&self, rendered: &RenderProxy, tier: &str) -> Result<VisualCritique, OracleError>;
}

/// Synthesizes a binary asset. Invoked only through the concurrency limiter.
pub trait AssetOracle {
    fn synthesize(&self, need: &AssetNeed, tier: &str) -> Result<GeneratedAsset, OracleError>;
}

/// Produces a renderable proxy for the critique oracle. Pixel rendering is
/// out of scope; the proxy carries structure and geometry only.
pub trait RenderOracle {
    fn render(&self, plan: &ContentPlan, layout_id: &str) -> Result<RenderProxy, OracleError>;
}

/// Role a render element plays in the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementRole {
    Title,
    Bullet,
    DataCallout,
    Image,
}

/// Geometry of one render element, in layout units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One element of a rendered item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderElement {
    pub id: String,
    pub role: ElementRole,
    /// Index into the plan's key points for bullet elements.
    pub point_index: Option<usize>,
    pub frame: Frame,
    pub color: Option<String>,
    /// Vertical gap to the next element.
    pub gap: Option<f64>,
}

/// Renderable stand-in for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderProxy {
    pub layout_id: String,
    pub elements: Vec<RenderElement>,
}

impl RenderProxy {
    /// Stable digest of the proxy's structure, used by the repair loop to
    /// detect rounds whose repairs were no-ops.
    pub fn structural_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.layout_id.as_bytes());
        for element in &self.elements {
            hasher.update(element.id.as_bytes());
            hasher.update(format!(
                "|{:?}|{:?}|{:.1}|{:.1}|{:.1}|{:.1}|{}|{:.1}\n",
                element.role,
                element.point_index,
                element.frame.x,
                element.frame.y,
                element.frame.width,
                element.frame.height,
                element.color.as_deref().unwrap_or("-"),
                element.gap.unwrap_or(0.0),
            ));
        }
        hex::encode(hasher.finalize())
    }
}

/// Deterministic structural renderer: estimates geometry from character
/// counts. Serves as the default render collaborator where no richer
/// renderer is wired in.
#[derive(Debug, Clone, Default)]
pub struct StructuralRenderer;

impl RenderOracle for StructuralRenderer {
    fn render(&self, plan: &ContentPlan, layout_id: &str) -> Result<RenderProxy, OracleError> {
        let mut elements = Vec::with_capacity(plan.element_count());
        elements.push(RenderElement {
            id: "title".to_string(),
            role: ElementRole::Title,
            point_index: None,
            frame: Frame {
                x: 40.0,
                y: 30.0,
                width: 640.0,
                height: 60.0,
            },
            color: None,
            gap: Some(24.0),
        });

        let mut y = 120.0;
        for (idx, point) in plan.key_points.iter().enumerate() {
            let lines = (point.chars().count().max(1)).div_ceil(38) as f64;
            let height = 28.0 * lines;
            elements.push(RenderElement {
                id: format!("bullet-{idx}"),
                role: ElementRole::Bullet,
                point_index: Some(idx),
                frame: Frame {
                    x: 60.0,
                    y,
                    width: 600.0,
                    height,
                },
                color: None,
                gap: Some(12.0),
            });
            y += height + 12.0;
        }

        for (idx, _) in plan.data_points.iter().enumerate() {
            elements.push(RenderElement {
                id: format!("callout-{idx}"),
                role: ElementRole::DataCallout,
                point_index: None,
                frame: Frame {
                    x: 60.0,
                    y,
                    width: 280.0,
                    height: 48.0,
                },
                color: None,
                gap: Some(12.0),
            });
            y += 60.0;
        }

        Ok(RenderProxy {
            layout_id: layout_id.to_string(),
            elements,
        })
    }
}

/// Shared plumbing handed to every oracle call site.
#[derive(Debug, Clone, Copy)]
pub struct OracleEnv<'a> {
    pub breakers: &'a BreakerSet,
    pub ledger: &'a CostLedger,
    pub retry: &'a RetryConfig,
    pub tiers: &'a [String],
    pub costs: &'a OracleCosts,
}
