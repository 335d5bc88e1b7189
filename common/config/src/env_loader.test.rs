use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_no_env_leaves_logging_untouched() {
    let mut config = AppConfig::default();
    apply_overrides_from(&mut config, |_| None);
    assert!(config.logging.is_none());
    assert_eq!(config.plugins, Some(PluginSection::default()));
}

#[test]
fn test_overrides_applied() {
    let mut config = AppConfig::default();
    apply_overrides_from(
        &mut config,
        lookup_from(&[
            (ENV_NODE_BINARY, "/usr/bin/node"),
            (ENV_LOAD_TIMEOUT, "7"),
            (ENV_LOG_LEVEL, "debug"),
        ]),
    );

    let plugins = config.plugins.unwrap();
    assert_eq!(plugins.node_binary, Some(PathBuf::from("/usr/bin/node")));
    assert_eq!(plugins.load_timeout_secs, Some(7));
    assert_eq!(config.logging.unwrap().level.as_deref(), Some("debug"));
}

#[test]
fn test_invalid_timeout_ignored() {
    let mut config = AppConfig::default();
    config.plugins = Some(PluginSection {
        load_timeout_secs: Some(30),
        ..PluginSection::default()
    });
    apply_overrides_from(&mut config, lookup_from(&[(ENV_LOAD_TIMEOUT, "soon")]));
    assert_eq!(config.plugins.unwrap().load_timeout_secs, Some(30));
}
