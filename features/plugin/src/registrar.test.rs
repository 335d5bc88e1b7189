use pretty_assertions::assert_eq;

use super::*;
use crate::registry::InMemoryEffectRegistry;

fn registration(name: &str, category: &str) -> CapturedRegistration {
    CapturedRegistration {
        name: name.to_string(),
        category: category.to_string(),
        metadata: serde_json::json!({}),
        class_ref: ClassRef {
            module: PathBuf::from("/processed/glow/index.mjs"),
            class_name: name.to_string(),
        },
    }
}

#[test]
fn test_capturing_registrar_records_by_kind() {
    let mut capture = CapturingRegistrar::new();
    assert!(capture.is_empty());

    capture.register(RegistrationKind::Effect, registration("Glow", "primary"));
    capture.register(RegistrationKind::Config, registration("GlowConfig", "config"));
    capture.register(RegistrationKind::Position, registration("Center", "position"));

    assert_eq!(capture.effects, vec![registration("Glow", "primary")]);
    assert_eq!(capture.configs, vec![registration("GlowConfig", "config")]);
    assert_eq!(capture.positions, vec![registration("Center", "position")]);
}

#[test]
fn test_capture_does_not_touch_registry() {
    let registry = Arc::new(InMemoryEffectRegistry::new());
    let mut capture = CapturingRegistrar::new();
    capture.register_effect(registration("Glow", "primary"));

    assert!(registry.get("Glow").is_none());
    assert!(registry.effects().is_empty());
}

#[test]
fn test_replay_commits_under_owner() {
    let registry = Arc::new(InMemoryEffectRegistry::new());
    let mut capture = CapturingRegistrar::new();
    capture.register_effect(registration("Glow", "primary"));
    capture.register_config(registration("GlowConfig", "config"));

    let mut committing = CommittingRegistrar::new(registry.clone(), "glow-plugin");
    capture.replay_into(&mut committing);

    assert_eq!(committing.committed(), 2);
    let entry = registry.get("Glow").unwrap();
    assert_eq!(entry.owner, "glow-plugin");
    assert_eq!(entry.category, "primary");
    assert!(registry.config("GlowConfig").is_some());
}
