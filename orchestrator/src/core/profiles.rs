//! Static layout registry: per-variant content bounds and risk classes.

use serde::{Deserialize, Serialize};

use crate::core::types::{ItemKind, ItemMeta};

/// Static content bounds for one layout variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutProfile {
    pub min_bullets: usize,
    pub max_bullets: usize,
    pub min_total_chars: usize,
    pub max_total_chars: usize,
    pub min_chars_per_point: usize,
    pub max_chars_per_point: usize,
    /// When set, an empty point list is acceptable (hero layouts).
    pub allow_empty: bool,
}

/// How likely a layout is to break visually, driving the sampling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskClass {
    High,
    Medium,
    Low,
}

/// One registered layout variant.
#[derive(Debug, Clone, Copy)]
pub struct LayoutSpec {
    pub id: &'static str,
    pub risk: RiskClass,
    /// Whether the layout reserves space for a synthesized asset.
    pub wants_asset: bool,
    pub profile: LayoutProfile,
}

pub const DEFAULT_LAYOUT: &str = "bullets-standard";

static LAYOUTS: &[LayoutSpec] = &[
    LayoutSpec {
        id: "hero-title",
        risk: RiskClass::Low,
        wants_asset: true,
        profile: LayoutProfile {
            min_bullets: 0,
            max_bullets: 2,
            min_total_chars: 0,
            max_total_chars: 120,
            min_chars_per_point: 0,
            max_chars_per_point: 60,
            allow_empty: true,
        },
    },
    LayoutSpec {
        id: "hero-closing",
        risk: RiskClass::Low,
        wants_asset: false,
        profile: LayoutProfile {
            min_bullets: 0,
            max_bullets: 3,
            min_total_chars: 0,
            max_total_chars: 160,
            min_chars_per_point: 0,
            max_chars_per_point: 64,
            allow_empty: true,
        },
    },
    LayoutSpec {
        id: "bullets-standard",
        risk: RiskClass::Medium,
        wants_asset: false,
        profile: LayoutProfile {
            min_bullets: 2,
            max_bullets: 5,
            min_total_chars: 80,
            max_total_chars: 420,
            min_chars_per_point: 20,
            max_chars_per_point: 84,
            allow_empty: false,
        },
    },
    LayoutSpec {
        id: "data-callout",
        risk: RiskClass::High,
        wants_asset: true,
        profile: LayoutProfile {
            min_bullets: 1,
            max_bullets: 4,
            min_total_chars: 40,
            max_total_chars: 300,
            min_chars_per_point: 16,
            max_chars_per_point: 70,
            allow_empty: false,
        },
    },
    LayoutSpec {
        id: "minimal",
        risk: RiskClass::Low,
        wants_asset: false,
        profile: LayoutProfile {
            min_bullets: 1,
            max_bullets: 3,
            min_total_chars: 20,
            max_total_chars: 240,
            min_chars_per_point: 12,
            max_chars_per_point: 72,
            allow_empty: false,
        },
    },
];

/// Look up a layout by id. Unknown ids resolve to the default layout so a
/// stale id can never leave the loop without bounds.
pub fn layout_spec(id: &str) -> &'static LayoutSpec {
    LAYOUTS
        .iter()
        .find(|spec| spec.id == id)
        .or_else(|| LAYOUTS.iter().find(|spec| spec.id == DEFAULT_LAYOUT))
        .expect("default layout registered")
}

/// Initial layout for an item, chosen from its metadata.
pub fn route_layout(meta: &ItemMeta) -> &'static str {
    match meta.kind {
        ItemKind::Title => "hero-title",
        ItemKind::Closing => "hero-closing",
        ItemKind::Standard => {
            let purpose = meta.purpose.to_lowercase();
            if purpose.contains("data") || purpose.contains("metric") {
                "data-callout"
            } else {
                DEFAULT_LAYOUT
            }
        }
    }
}

/// Next lower-density layout when the visual gate asks for a layout change.
///
/// Returns `None` when no safer variant exists (hero layouts, minimal).
pub fn downgrade_layout(id: &str) -> Option<&'static str> {
    match id {
        "data-callout" => Some("bullets-standard"),
        "bullets-standard" => Some("minimal"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ItemKind;

    fn meta(kind: ItemKind, purpose: &str) -> ItemMeta {
        ItemMeta {
            index: 1,
            kind,
            heading: "h".to_string(),
            purpose: purpose.to_string(),
        }
    }

    #[test]
    fn unknown_layout_falls_back_to_default() {
        assert_eq!(layout_spec("no-such-layout").id, DEFAULT_LAYOUT);
    }

    #[test]
    fn routing_prefers_data_layout_for_metric_purposes() {
        assert_eq!(
            route_layout(&meta(ItemKind::Standard, "key data highlights")),
            "data-callout"
        );
        assert_eq!(
            route_layout(&meta(ItemKind::Standard, "supporting detail")),
            DEFAULT_LAYOUT
        );
        assert_eq!(route_layout(&meta(ItemKind::Title, "opening")), "hero-title");
    }

    #[test]
    fn downgrade_chain_terminates_at_minimal() {
        let mut id = "data-callout";
        let mut hops = 0;
        while let Some(next) = downgrade_layout(id) {
            id = next;
            hops += 1;
            assert!(hops < 10, "downgrade chain must not cycle");
        }
        assert_eq!(id, "minimal");
    }

    #[test]
    fn hero_layouts_allow_empty_content() {
        assert!(layout_spec("hero-title").profile.allow_empty);
        assert!(!layout_spec("bullets-standard").profile.allow_empty);
    }
}
