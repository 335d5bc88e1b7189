use std::path::PathBuf;

use pretty_assertions::assert_eq;

use super::*;

fn registration(name: &str, class_name: &str, category: &str) -> CapturedRegistration {
    CapturedRegistration {
        name: name.to_string(),
        category: category.to_string(),
        metadata: serde_json::json!({ "label": name }),
        class_ref: ClassRef {
            module: PathBuf::from("/processed/x/index.mjs"),
            class_name: class_name.to_string(),
        },
    }
}

#[test]
fn test_get_and_get_by_category() {
    let registry = InMemoryEffectRegistry::new();
    registry.register_global("a", registration("Glow", "Glow", "primary"));
    registry.register_global("a", registration("Blur", "Blur", "filter"));
    registry.register_global("b", registration("Bloom", "Bloom", "primary"));

    let names: Vec<String> = registry
        .get_by_category("primary")
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["Bloom".to_string(), "Glow".to_string()]);
    assert_eq!(registry.get("Blur").unwrap().category, "filter");
    assert!(registry.get("Missing").is_none());
}

#[test]
fn test_register_same_name_replaces() {
    let registry = InMemoryEffectRegistry::new();
    registry.register_global("a", registration("Glow", "Glow", "primary"));
    registry.register_global("a", registration("Glow", "Glow", "secondary"));

    assert_eq!(registry.effects().len(), 1);
    assert_eq!(registry.get("Glow").unwrap().category, "secondary");
}

#[test]
fn test_link_configs_by_name_or_class() {
    let registry = InMemoryEffectRegistry::new();
    registry.register_global("a", registration("Glow", "GlowEffect", "primary"));
    registry.register_global("a", registration("Blur", "BlurEffect", "primary"));
    registry.register_global("a", registration("Wave", "Wave", "primary"));
    registry.register_config("a", registration("GlowConfig", "Whatever", "config"));
    registry.register_config("a", registration("blur-settings", "BlurEffectConfig", "config"));

    assert_eq!(registry.link_configs(), 2);
    assert_eq!(registry.get("Glow").unwrap().config.as_deref(), Some("GlowConfig"));
    assert_eq!(registry.get("Blur").unwrap().config.as_deref(), Some("blur-settings"));
    assert_eq!(registry.get("Wave").unwrap().config, None);

    assert_eq!(registry.link_configs(), 0);
}

#[test]
fn test_unregister_owner() {
    let registry = InMemoryEffectRegistry::new();
    registry.register_global("a", registration("Glow", "Glow", "primary"));
    registry.register_config("b", registration("GlowConfig", "GlowConfig", "config"));
    registry.register_position("a", registration("Center", "Center", "position"));
    registry.register_global("b", registration("Blur", "Blur", "primary"));
    registry.link_configs();

    assert_eq!(registry.unregister_owner("b"), 2);
    assert!(registry.get("Blur").is_none());
    assert_eq!(registry.get("Glow").unwrap().config, None);

    assert_eq!(registry.unregister_owner("a"), 2);
    assert!(registry.effects().is_empty());
    assert!(registry.positions().is_empty());
    assert_eq!(registry.unregister_owner("a"), 0);
}
