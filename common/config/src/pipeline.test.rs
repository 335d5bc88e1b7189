use super::*;
use crate::json_config::PluginSection;
use pretty_assertions::assert_eq;

#[test]
fn test_unpacked_dir_derived_from_archive() {
    let mut roots = StorageRoots::from_working_dir("/work");
    assert_eq!(roots.unpacked_dir(), None);

    roots.archive = Some(PathBuf::from("/opt/lumen/app.asar"));
    assert_eq!(
        roots.unpacked_dir(),
        Some(PathBuf::from("/opt/lumen/app.asar.unpacked"))
    );

    roots.unpacked = Some(PathBuf::from("/opt/lumen/native"));
    assert_eq!(roots.unpacked_dir(), Some(PathBuf::from("/opt/lumen/native")));
}

#[test]
fn test_defaults_from_empty_config() {
    let config = PluginPipelineConfig::from_app_config(Path::new("/home/u/.lumen"), &AppConfig::default());
    assert_eq!(config.data_dir, PathBuf::from("/home/u/.lumen"));
    assert_eq!(config.engine_package, DEFAULT_ENGINE_PACKAGE);
    assert_eq!(config.load_timeout, Duration::from_secs(DEFAULT_LOAD_TIMEOUT_SECS));
    assert_eq!(config.store_path(), PathBuf::from("/home/u/.lumen/plugins.json"));
    assert_eq!(config.processed_root(), PathBuf::from("/home/u/.lumen/processed"));
}

#[test]
fn test_section_values_override_defaults() {
    let app = AppConfig {
        logging: None,
        plugins: Some(PluginSection {
            load_timeout_secs: Some(3),
            orphan_retention_hours: Some(2),
            engine_package: Some("fx-core".to_string()),
            shared_packages: Some(vec!["fx-core".to_string(), "three".to_string()]),
            archive_path: Some(PathBuf::from("/app.asar")),
            ..PluginSection::default()
        }),
    };
    let config = PluginPipelineConfig::from_app_config(Path::new("/data"), &app);

    assert_eq!(config.load_timeout, Duration::from_secs(3));
    assert_eq!(config.orphan_retention, Duration::from_secs(7200));
    assert_eq!(
        config.all_shared_packages(),
        vec!["fx-core".to_string(), "three".to_string()]
    );
    assert_eq!(config.roots.read_only_roots(), vec![PathBuf::from("/app.asar")]);
}
