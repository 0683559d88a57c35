//! CLI smoke tests for the `meshbeaconctl` binary.

use assert_cmd::Command;
use pretty_assertions::assert_eq;

#[test]
fn keygen_writes_a_key_to_the_keystore_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("meshbeacon.toml");
    let keystore_path = dir.path().join("keystore.json");

    std::fs::write(
        &config_path,
        format!("keystore_path = \"{}\"\n", keystore_path.display()),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("meshbeaconctl").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("keygen")
        .arg("--tag")
        .arg("laptop");
    cmd.assert().success();

    let contents = std::fs::read_to_string(&keystore_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    let keys = parsed["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["tag"], "laptop");
}

#[test]
fn config_view_prints_defaults_when_no_file_exists() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("meshbeacon.toml");

    let mut cmd = Command::cargo_bin("meshbeaconctl").unwrap();
    cmd.arg("--config").arg(&config_path).arg("config").arg("view");
    let output = cmd.assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("timesleep"));
    assert!(stdout.contains("bind_addr"));
}

#[test]
fn config_set_persists_a_field() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("meshbeacon.toml");

    let mut set_cmd = Command::cargo_bin("meshbeaconctl").unwrap();
    set_cmd
        .arg("--config")
        .arg(&config_path)
        .arg("config")
        .arg("set")
        .arg("timesleep")
        .arg("5");
    set_cmd.assert().success();

    let saved = std::fs::read_to_string(&config_path).unwrap();
    assert!(saved.contains("timesleep = 5"));
}
