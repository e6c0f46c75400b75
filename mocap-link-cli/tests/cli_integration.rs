use assert_cmd::Command;
use predicates::prelude::*;

fn mocap_link() -> Command {
    Command::cargo_bin("mocap-link").unwrap()
}

#[test]
fn test_help_flag() {
    mocap_link()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("motion capture"));
}

#[test]
fn test_version_flag() {
    mocap_link()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mocap-link"));
}

#[test]
fn test_unsupported_angle_is_rejected() {
    mocap_link()
        .args(["--angle", "30"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unsupported starting angle"));
}

#[test]
fn test_invalid_config_exit_code() {
    mocap_link()
        .args(["--port", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("port"));
}

#[test]
fn test_records_simulated_trial() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("trial");

    mocap_link()
        .args(["--sim-frames", "30", "--sim-rate", "200", "--angle", "-90", "--output"])
        .arg(&prefix)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("state: streaming"))
        .stdout(predicate::str::contains("state: stopped"))
        .stdout(predicate::str::contains("\"packet_count\": 30"));

    let skate = std::fs::read_to_string(dir.path().join("trial_skate.csv")).unwrap();
    assert!(skate.starts_with("timestamp,x,y,z,roll,pitch,yaw\n"));
    assert_eq!(skate.lines().count(), 31);
    assert!(dir.path().join("trial_toe.csv").exists());
    assert!(dir.path().join("trial.metadata.json").exists());
}
