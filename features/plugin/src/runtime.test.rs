use pretty_assertions::assert_eq;

use super::*;
use crate::error::PluginError;

#[test]
fn test_harness_reports_with_marker() {
    assert!(HARNESS.contains(REPORT_MARKER));
    assert!(HARNESS.contains(ENTRY_ENV));
}

#[test]
fn test_parse_report_takes_last_marker_line() {
    let stdout = format!(
        "plugin log line\n{REPORT_MARKER}[]\n{REPORT_MARKER}[{{\"kind\":\"effect\",\"name\":\"Glow\",\"category\":\"primary\",\"metadata\":{{}},\"class_name\":\"Glow\"}}]\n"
    );
    let calls = parse_report(Path::new("/p/index.mjs"), &stdout).unwrap();
    assert_eq!(
        calls,
        vec![RegistrationCall {
            kind: RegistrationKind::Effect,
            name: "Glow".to_string(),
            category: "primary".to_string(),
            metadata: serde_json::json!({}),
            class_name: "Glow".to_string(),
        }]
    );
}

#[test]
fn test_parse_report_without_marker_is_load_error() {
    let err = parse_report(Path::new("/p/index.mjs"), "hello\n").unwrap_err();
    assert!(matches!(err, PluginError::Load { .. }));

    let err = parse_report(Path::new("/p/index.mjs"), &format!("{REPORT_MARKER}{{oops")).unwrap_err();
    assert!(err.to_string().contains("Malformed registration report"));
}

#[test]
fn test_summarize_stderr() {
    assert_eq!(summarize_stderr(""), "plugin module exited with an error");
    assert_eq!(summarize_stderr("  Error: boom \n"), "Error: boom");
    assert_eq!(
        summarize_stderr("ReferenceError: x is not defined\n    at a\n    at b\n"),
        "ReferenceError: x is not defined (+2 more lines)"
    );
}

#[tokio::test]
async fn test_missing_runtime_binary_is_load_error() {
    let runtime = NodeRuntime::new("/nonexistent/lumen-node-binary");
    let err = runtime
        .import_and_register(Path::new("/tmp/index.mjs"))
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::Load { .. }));
    assert!(err.to_string().contains("Failed to start"));
}

async fn run_module(dir_name: &str, source: &str) -> Result<Vec<RegistrationCall>> {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join(dir_name);
    std::fs::create_dir_all(&dir).unwrap();
    let entry = dir.join("index.mjs");
    std::fs::write(&entry, source).unwrap();
    NodeRuntime::new("node").import_and_register(&entry).await
}

fn call(kind: RegistrationKind, name: &str, category: &str, metadata: Value, class_name: &str) -> RegistrationCall {
    RegistrationCall {
        kind,
        name: name.to_string(),
        category: category.to_string(),
        metadata,
        class_name: class_name.to_string(),
    }
}

#[tokio::test]
async fn test_node_prefers_named_register_export() {
    if !crate::testing::node_available() {
        return;
    }
    let source = r#"
export function register(effects, configs) {
  class Glow {}
  effects.registerGlobal(Glow, 'primary', {});
  configs.register(class GlowConfig {}, undefined, { name: 'glow-config' });
}
export default function () { throw new Error('default should not run'); }
"#;

    let calls = run_module("it's a plugin", source).await.unwrap();

    assert_eq!(
        calls,
        vec![
            call(RegistrationKind::Effect, "Glow", "primary", serde_json::json!({}), "Glow"),
            call(
                RegistrationKind::Config,
                "glow-config",
                "",
                serde_json::json!({"name": "glow-config"}),
                "GlowConfig"
            ),
        ]
    );
}

#[tokio::test]
async fn test_node_default_function_export() {
    if !crate::testing::node_available() {
        return;
    }
    let source = r#"
export default async function (effects, _configs, positions) {
  effects.register(class Ripple {}, 'secondary', { name: 'ripple-fx', speed: 2 });
  positions.register(class Corner {}, 'hud', { id: 'corner' });
}
"#;

    let calls = run_module("plugin", source).await.unwrap();

    assert_eq!(
        calls,
        vec![
            call(
                RegistrationKind::Effect,
                "ripple-fx",
                "secondary",
                serde_json::json!({"name": "ripple-fx", "speed": 2}),
                "Ripple"
            ),
            call(
                RegistrationKind::Position,
                "corner",
                "hud",
                serde_json::json!({"id": "corner"}),
                "Corner"
            ),
        ]
    );
}

#[tokio::test]
async fn test_node_default_object_export_keeps_receiver() {
    if !crate::testing::node_available() {
        return;
    }
    let source = r#"
export default {
  fallback: 'overlay',
  register(effects) {
    effects.register(class Veil {}, this.fallback);
    effects.register(class Tint {}, undefined, { category: 'color' });
  },
};
"#;

    let calls = run_module("plugin", source).await.unwrap();

    assert_eq!(
        calls,
        vec![
            call(RegistrationKind::Effect, "Veil", "overlay", serde_json::json!({}), "Veil"),
            call(
                RegistrationKind::Effect,
                "Tint",
                "color",
                serde_json::json!({"category": "color"}),
                "Tint"
            ),
        ]
    );
}

#[tokio::test]
async fn test_node_module_without_register_is_load_error() {
    if !crate::testing::node_available() {
        return;
    }
    let err = run_module("plugin", "export const answer = 42;\n").await.unwrap_err();

    assert!(matches!(err, PluginError::Load { .. }));
    assert!(err.to_string().contains("no register function"), "{err}");
}

#[tokio::test]
async fn test_node_throwing_module_is_load_error() {
    if !crate::testing::node_available() {
        return;
    }
    let err = run_module("plugin", "throw new Error('kaboom');\n").await.unwrap_err();

    assert!(matches!(err, PluginError::Load { .. }));
    assert!(err.to_string().contains("kaboom"), "{err}");
}
