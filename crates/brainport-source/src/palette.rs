//! Default colors and labels keyed by entity type.
//!
//! Used only when a thought carries no explicit value of its own.

/// Color for entity types missing from [`ENTITY_COLORS`].
pub const FALLBACK_COLOR: &str = "#9ca3af";

pub const ENTITY_COLORS: &[(&str, &str)] = &[
    ("company", "#3b82f6"),
    ("product", "#22c55e"),
    ("feature", "#14b8a6"),
    ("technology", "#8b5cf6"),
    ("person", "#ef4444"),
    ("market", "#6b7280"),
    ("pricing", "#f59e0b"),
    ("capability", "#10b981"),
    ("concept", "#ec4899"),
    ("technology category", "#a855f7"),
];

pub fn color_for_entity_type(entity_type: &str) -> &'static str {
    let key = entity_type.trim().to_ascii_lowercase();
    ENTITY_COLORS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, color)| *color)
        .unwrap_or(FALLBACK_COLOR)
}

pub fn label_for_entity_type(entity_type: &str) -> String {
    entity_type.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_are_case_insensitive() {
        assert_eq!(color_for_entity_type("Company"), "#3b82f6");
        assert_eq!(color_for_entity_type("technology category"), "#a855f7");
    }

    #[test]
    fn unknown_types_fall_back() {
        assert_eq!(color_for_entity_type("spaceship"), FALLBACK_COLOR);
        assert_eq!(label_for_entity_type(" product "), "PRODUCT");
    }
}
