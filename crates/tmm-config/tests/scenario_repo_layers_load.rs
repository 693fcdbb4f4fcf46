//! Scenario: the layers shipped in config/ load cleanly
//!
//! GREEN when base + postgres merge into a postgres config with no unused
//! keys and no secret literals.

use std::path::PathBuf;

use tmm_config::{load_layered_yaml, report_unused_keys, StoreBackend, UnusedKeyPolicy};

fn repo_config(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../config")
        .join(name)
        .to_string_lossy()
        .to_string()
}

#[test]
fn shipped_layers_are_clean() {
    let base = repo_config("base.yaml");
    let pg = repo_config("postgres.yaml");

    let loaded = load_layered_yaml(&[base.as_str(), pg.as_str()]).unwrap();
    report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();

    let cfg = loaded.app_config().unwrap();
    assert_eq!(cfg.store.backend, StoreBackend::Postgres);
    assert_eq!(cfg.service.environment, "production");
    assert_eq!(cfg.api_prefix(), "/api");
    assert_eq!(cfg.bind_addr().unwrap().port(), 6000);
}
