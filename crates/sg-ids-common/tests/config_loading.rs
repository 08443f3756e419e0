//! ---
//! ids_section: "15-testing-qa-runbook"
//! ids_subsection: "integration"
//! ids_type: "source"
//! ids_scope: "test"
//! ids_description: "Configuration discovery and validation from disk."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use std::io::Write;
use std::time::Duration;

use sg_ids_common::AppConfig;
use tempfile::NamedTempFile;

#[test]
fn first_existing_candidate_wins() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[simulation]
default_topology = "ieee30"
neighbor_limit = 3
detection_delay_min = 20
detection_delay_max = 40
"#
    )
    .unwrap();

    let missing = file.path().with_extension("missing");
    let loaded = AppConfig::load_with_source(&[missing.as_path(), file.path()]).unwrap();
    assert_eq!(loaded.source.as_deref(), Some(file.path()));
    assert_eq!(loaded.config.simulation.default_topology, "ieee30");
    assert_eq!(loaded.config.simulation.neighbor_limit, 3);
    assert_eq!(
        loaded.config.simulation.detection_delay_max,
        Duration::from_millis(40)
    );
}

#[test]
fn defaults_are_used_without_any_file() {
    let dir = tempfile::tempdir().unwrap();
    let candidate = dir.path().join("absent.toml");
    let loaded = AppConfig::load_with_source(&[candidate]).unwrap();
    assert!(loaded.source.is_none());
    assert_eq!(loaded.config.simulation.max_sessions, 64);
}

#[test]
fn invalid_file_reports_its_path() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[simulation]\nmax_sessions = 0").unwrap();
    let err = AppConfig::load(&[file.path()]).unwrap_err();
    assert!(format!("{err:#}").contains("max_sessions"));
}

#[test]
fn shipped_example_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/sg-ids.toml");
    let config = AppConfig::load(&[path]).unwrap();
    assert_eq!(config.simulation.default_topology, "ieee14");
    assert_ne!(config.api.listen, config.metrics.listen);
}
