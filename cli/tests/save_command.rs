use std::path::Path;

use clap::Parser;
use restsync_cli::{Cli, exit_code, run};
use serde_json::{Value, json};

fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_vec(value).unwrap()).unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).expect("read json")).expect("parse json")
}

fn save(config: &Path, extra: &[&str]) -> anyhow::Result<restsync::save::SaveReport> {
    let mut args = vec!["restsync", "--config", config.to_str().unwrap(), "save"];
    args.extend_from_slice(extra);
    run(Cli::try_parse_from(args).expect("parse args"))
}

#[test]
fn supplied_list_is_saved_with_secrets_moved_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("restsync.toml");
    std::fs::write(&config, "secrets_file = \"vault/secrets.json\"\n").unwrap();
    let input = dir.path().join("customers.json");
    write_json(
        &input,
        &json!([{"id": "b", "password": "hunter2"}, {"id": "a", "password": "swordfish"}]),
    );
    let input = input.to_str().unwrap();

    let err = save(&config, &["/customers", "--input", input]).unwrap_err();
    assert_eq!(exit_code(&err), 2);
    assert!(!dir.path().join("resources").exists());

    let report = save(&config, &["/customers", "--input", input, "--handle-secrets"])
        .expect("handled save");
    assert_eq!(report.saved, vec!["/customers/a", "/customers/b"]);

    assert_eq!(
        read_json(&dir.path().join("resources/customers/a/resource.json")),
        json!({"id": "a", "password": "{{secret .}}"})
    );
    assert_eq!(
        read_json(&dir.path().join("vault/secrets.json")),
        json!({"/customers/a:password": "swordfish", "/customers/b:password": "hunter2"})
    );
    assert_eq!(
        read_json(&dir.path().join("metadata/customers/metadata.json")),
        json!({"secretsFromAttributes": ["password"]})
    );

    let err = save(&config, &["/customers", "--input", input]).unwrap_err();
    assert_eq!(exit_code(&err), 2);
    assert!(err.to_string().contains("already exists"));

    let report = save(&config, &["/customers", "--input", input, "--overwrite"])
        .expect("declared secrets are handled automatically");
    assert_eq!(report.saved.len(), 2);
    assert_eq!(
        read_json(&dir.path().join("resources/customers/b/resource.json")),
        json!({"id": "b", "password": "{{secret .}}"})
    );
}

#[test]
fn remote_reads_need_a_base_url() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("restsync.toml");
    std::fs::write(&config, "").unwrap();

    let err = save(&config, &["/customers"]).unwrap_err();
    assert_eq!(exit_code(&err), 2);
    assert!(err.to_string().contains("base_url"));
}

#[test]
fn invalid_input_json_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("restsync.json");
    std::fs::write(&config, "{}").unwrap();
    let input = dir.path().join("broken.json");
    std::fs::write(&input, "{not json").unwrap();

    let err = save(&config, &["/customers/a", "--input", input.to_str().unwrap()]).unwrap_err();
    assert_eq!(exit_code(&err), 2);
}
