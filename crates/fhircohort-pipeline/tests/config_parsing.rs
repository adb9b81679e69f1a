use std::{env, fs};

use fhircohort_client::{Credentials, MedicationJoin};
use fhircohort_pipeline::FileNaming;
use fhircohort_pipeline::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("fhircohort.toml");

    let toml_content = r#"
[server]
base_url = "https://fhir.example.org/fhir"
timeout_secs = 30

[auth]
type = "basic"
username = "reader"
password = "secret"

[fetch]
max_workers = 4
condition_batch_size = 20
medication_join = "inline"

[retry]
max_attempts = 5
initial_delay_ms = 500
max_delay_ms = 8000
multiplier = 2.0

[vocabularies]
icd = "http://hl7.org/fhir/sid/icd-10"

[output]
root = "out"
naming = "completion_order"

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.base_url, "https://fhir.example.org/fhir");
    assert_eq!(cfg.fetch.max_workers, 4);
    assert_eq!(cfg.fetch.condition_batch_size, 20);
    assert_eq!(cfg.fetch.page_size, 1000);
    assert_eq!(cfg.fetch.medication_join, MedicationJoin::Inline);
    assert_eq!(cfg.retry.max_attempts, Some(5));
    assert_eq!(cfg.vocabularies.icd, "http://hl7.org/fhir/sid/icd-10");
    assert_eq!(cfg.vocabularies.loinc, "http://loinc.org");
    assert_eq!(cfg.output.naming, FileNaming::CompletionOrder);
    assert_eq!(cfg.logging.level, "debug");
    assert!(matches!(cfg.auth, Credentials::Basic { ref username, .. } if username == "reader"));

    // 2) Env override should win over file
    unsafe {
        env::set_var("FHIRCOHORT__FETCH__MAX_WORKERS", "16");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.fetch.max_workers, 16);
    unsafe {
        env::remove_var("FHIRCOHORT__FETCH__MAX_WORKERS");
    }

    // 3) Invalid config should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[fetch]
max_workers = 0
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("max_workers"));

    // 4) An explicit path that does not exist is an error
    let missing = dir.path().join("missing.toml");
    let err = load_config(missing.to_str()).expect_err("missing file");
    assert!(err.contains("not found"));
}
