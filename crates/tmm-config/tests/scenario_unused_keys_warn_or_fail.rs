//! Scenario: unknown config keys are reported
//!
//! GREEN when:
//! - A config using only known keys is clean.
//! - A typo'd key is reported under Warn and refused under Fail.

use tmm_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

#[test]
fn known_keys_are_clean() {
    let yaml = r#"
service:
  api_prefix: "/api"
cors:
  origins: ["*"]
auth:
  tokens_env: "TMM_API_TOKENS"
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}

#[test]
fn typo_is_reported() {
    let yaml = r#"
store:
  max_conections: 4
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(report.unused_leaf_pointers, vec!["/store/max_conections".to_string()]);

    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    assert!(err.to_string().contains("CONFIG_UNUSED_KEYS"), "{err}");
}
