//! Defensive normalization of raw planning-oracle output.
//!
//! Raw oracle JSON never crosses the component boundary unchecked. The happy
//! path validates against the plan schema and deserializes; failing that, a
//! lenient salvage pass pulls what it can field by field; failing that, the
//! caller gets a minimal typed default built from the item metadata.

use std::sync::OnceLock;

use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::types::{ContentPlan, DataPoint, ItemMeta};

const PLAN_SCHEMA: &str = include_str!("../../schemas/content_plan.schema.json");

fn plan_validator() -> &'static Validator {
    static VALIDATOR: OnceLock<Validator> = OnceLock::new();
    VALIDATOR.get_or_init(|| {
        let schema: Value =
            serde_json::from_str(PLAN_SCHEMA).expect("embedded plan schema parses");
        validator_for(&schema).expect("embedded plan schema compiles")
    })
}

/// Turn raw oracle output into a guaranteed-valid plan.
///
/// Never fails: the worst input yields the metadata-derived default.
pub fn normalize_plan(raw: &Value, meta: &ItemMeta) -> ContentPlan {
    if plan_validator().is_valid(raw)
        && let Ok(plan) = serde_json::from_value::<ContentPlan>(raw.clone())
    {
        return sanitize(plan, meta);
    }

    debug!(item = meta.index, "plan failed schema validation, salvaging");
    if let Some(plan) = salvage_plan(raw) {
        return sanitize(plan, meta);
    }

    warn!(item = meta.index, "plan unusable, substituting default");
    default_plan(meta)
}

/// Minimal deterministic plan used when every normalization step fails.
pub fn default_plan(meta: &ItemMeta) -> ContentPlan {
    ContentPlan {
        title: meta.heading.clone(),
        key_points: Vec::new(),
        data_points: Vec::new(),
        narrative: None,
    }
}

/// Lenient field-by-field extraction for near-miss shapes.
fn salvage_plan(raw: &Value) -> Option<ContentPlan> {
    let object = raw.as_object()?;

    let title = object
        .get("title")
        .and_then(coerce_text)
        .filter(|t| !t.is_empty())?;

    let key_points = object
        .get("key_points")
        .or_else(|| object.get("keyPoints"))
        .or_else(|| object.get("bullets"))
        .and_then(Value::as_array)
        .map(|points| points.iter().filter_map(coerce_text).collect())
        .unwrap_or_default();

    let data_points = object
        .get("data_points")
        .or_else(|| object.get("dataPoints"))
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(coerce_data_point).collect())
        .unwrap_or_default();

    let narrative = object.get("narrative").and_then(coerce_text);

    Some(ContentPlan {
        title,
        key_points,
        data_points,
        narrative: narrative.filter(|n| !n.is_empty()),
    })
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        // Some models wrap bullet text in {"text": ...} objects.
        Value::Object(map) => map.get("text").and_then(coerce_text),
        _ => None,
    }
}

fn coerce_data_point(value: &Value) -> Option<DataPoint> {
    let object = value.as_object()?;
    let label = object.get("label").and_then(coerce_text)?;
    let point_value = object.get("value").and_then(coerce_text)?;
    Some(DataPoint {
        label,
        value: point_value,
    })
}

/// Enforce plan invariants on whatever survived parsing.
fn sanitize(mut plan: ContentPlan, meta: &ItemMeta) -> ContentPlan {
    plan.title = plan.title.trim().to_string();
    if plan.title.is_empty() {
        plan.title = meta.heading.clone();
    }
    plan.key_points = plan
        .key_points
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    plan.data_points
        .retain(|d| !d.label.trim().is_empty() && !d.value.trim().is_empty());
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ItemKind;
    use serde_json::json;

    fn meta() -> ItemMeta {
        ItemMeta {
            index: 2,
            kind: ItemKind::Standard,
            heading: "Fallback heading".to_string(),
            purpose: "detail".to_string(),
        }
    }

    #[test]
    fn well_formed_output_passes_through() {
        let raw = json!({
            "title": "Revenue",
            "key_points": ["grew 14%", "churn flat"],
            "data_points": [{"label": "ARR", "value": "$12M"}],
            "narrative": "steady quarter"
        });
        let plan = normalize_plan(&raw, &meta());
        assert_eq!(plan.title, "Revenue");
        assert_eq!(plan.key_points.len(), 2);
        assert_eq!(plan.data_points[0].label, "ARR");
        assert_eq!(plan.narrative.as_deref(), Some("steady quarter"));
    }

    #[test]
    fn camel_case_and_wrapped_bullets_are_salvaged() {
        let raw = json!({
            "title": "Revenue",
            "keyPoints": [{"text": "grew 14%"}, 2024, null],
            "dataPoints": [{"label": "ARR", "value": 12}]
        });
        let plan = normalize_plan(&raw, &meta());
        assert_eq!(plan.key_points, vec!["grew 14%", "2024"]);
        assert_eq!(plan.data_points[0].value, "12");
    }

    #[test]
    fn blank_points_are_dropped_and_title_backfilled() {
        let raw = json!({
            "title": "   ",
            "key_points": ["  ", "kept point"]
        });
        let plan = normalize_plan(&raw, &meta());
        assert_eq!(plan.title, "Fallback heading");
        assert_eq!(plan.key_points, vec!["kept point"]);
    }

    #[test]
    fn unusable_output_yields_the_metadata_default() {
        for raw in [json!("not an object"), json!({"bullets": ["no title"]}), json!(null)] {
            let plan = normalize_plan(&raw, &meta());
            assert_eq!(plan.title, "Fallback heading");
            assert!(plan.key_points.is_empty());
        }
    }
}
