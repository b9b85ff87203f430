//! End-to-end tests for the `sodium` binary.
//!
//! Device-facing commands run against replay corpora or a fake `adb`
//! script; the live section only runs when a real `adb` is on PATH.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
        .display()
        .to_string()
}

/// `sodium` isolated from the caller's config and environment.
fn sodium(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sodium").expect("sodium binary should exist");
    cmd.env("SODIUM_CONFIG_DIR", config_dir.path())
        .env_remove("ANDROID_SERIAL")
        .env_remove("SODIUM_ADB")
        .env_remove("SODIUM_TIMEOUT_MS")
        .env_remove("SODIUM_DEADLINE_MS")
        .env_remove("SODIUM_LOG")
        .env_remove("RUST_LOG");
    cmd
}

fn replay(config_dir: &TempDir, corpus: &str) -> Command {
    let mut cmd = sodium(config_dir);
    cmd.arg("--replay").arg(fixture(corpus));
    cmd
}

// ============================================================================
// Help and metadata
// ============================================================================

mod metadata {
    use super::*;

    #[test]
    fn help_lists_commands() {
        let dir = TempDir::new().unwrap();
        sodium(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("get"))
            .stdout(predicate::str::contains("snapshot"))
            .stdout(predicate::str::contains("app-info"))
            .stdout(predicate::str::contains("--replay"));
    }

    #[test]
    fn version_flag() {
        let dir = TempDir::new().unwrap();
        sodium(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("sodium"));
    }

    #[test]
    fn version_command_is_json() {
        let dir = TempDir::new().unwrap();
        let output = sodium(&dir).arg("version").output().unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["sodium_version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn list_names_every_property() {
        let dir = TempDir::new().unwrap();
        let output = sodium(&dir).arg("list").output().unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let names: Vec<&str> = json["properties"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 24);
        assert!(names.contains(&"current_ssid"));
        assert!(names.contains(&"max_notification_level"));
    }

    #[test]
    fn list_text() {
        let dir = TempDir::new().unwrap();
        sodium(&dir)
            .args(["list", "--format", "text"])
            .assert()
            .success()
            .stdout(predicate::str::contains("bluetooth_name"));
    }
}

// ============================================================================
// Reads against replay corpora
// ============================================================================

mod get {
    use super::*;

    #[test]
    fn json_values() {
        let dir = TempDir::new().unwrap();
        let output = replay(&dir, "pixel7_android14.json")
            .args(["get", "brand", "system-version", "wifi_on", "window_size"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["values"]["brand"], "Google");
        assert_eq!(json["values"]["system_version"], 14);
        assert_eq!(json["values"]["wifi_on"], true);
        assert_eq!(json["values"]["window_size"]["width"], 2400);
        assert!(json["run_id"].as_str().unwrap().starts_with("run-"));
    }

    #[test]
    fn single_text_value() {
        let dir = TempDir::new().unwrap();
        replay(&dir, "pixel7_android14.json")
            .args(["--format", "text", "get", "device_model"])
            .assert()
            .success()
            .stdout("Pixel 7\n");
    }

    #[test]
    fn absent_optional_exits_one() {
        let dir = TempDir::new().unwrap();
        let output = replay(&dir, "redmi_android8.json")
            .args(["get", "current_ssid"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert!(json["values"]["current_ssid"].is_null());
    }

    #[test]
    fn unavailable_property() {
        let dir = TempDir::new().unwrap();
        let output = replay(&dir, "redmi_android8.json")
            .args(["get", "bluetooth_name"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(11));
        let err: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
        assert_eq!(err["code"], 30);
        assert_eq!(err["context"]["property"], "bluetooth_name");
    }

    #[test]
    fn unavailable_property_text() {
        let dir = TempDir::new().unwrap();
        replay(&dir, "redmi_android8.json")
            .args(["--format", "text", "--no-color", "get", "screen_brightness"])
            .assert()
            .code(11)
            .stderr(predicate::str::contains("screen_brightness"));
    }

    #[test]
    fn unknown_property_is_an_argument_error() {
        let dir = TempDir::new().unwrap();
        replay(&dir, "pixel7_android14.json")
            .args(["get", "battery_level"])
            .assert()
            .code(10)
            .stderr(predicate::str::contains("battery_level"));
    }

    #[test]
    fn missing_replay_file() {
        let dir = TempDir::new().unwrap();
        sodium(&dir)
            .args(["--replay", "/nonexistent/corpus.json", "get", "brand"])
            .assert()
            .code(21);
    }
}

mod other_commands {
    use super::*;

    #[test]
    fn snapshot_reports_values_and_errors() {
        let dir = TempDir::new().unwrap();
        let output = replay(&dir, "redmi_android8.json")
            .arg("snapshot")
            .output()
            .unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["snapshot"]["values"]["brand"], "MIUI");
        assert_eq!(json["snapshot"]["errors"]["bluetooth_on"]["code"], 30);
    }

    #[test]
    fn shell_passthrough() {
        let dir = TempDir::new().unwrap();
        replay(&dir, "pixel7_android14.json")
            .args(["--format", "text", "shell", "getprop", "ro.product.model"])
            .assert()
            .success()
            .stdout("Pixel 7\n");
    }

    #[test]
    fn shell_failure_exits_thirteen() {
        let dir = TempDir::new().unwrap();
        replay(&dir, "pixel7_android14.json")
            .args(["shell", "dumpsys battery"])
            .assert()
            .code(13);
    }

    #[test]
    fn app_info() {
        let dir = TempDir::new().unwrap();
        let output = replay(&dir, "pixel7_android14.json")
            .args(["app-info", "com.example.shop"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["app"]["version_name"], "3.12.0");

        replay(&dir, "pixel7_android14.json")
            .args(["app-info", "com.not.installed"])
            .assert()
            .code(1);
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod config {
    use super::*;

    #[test]
    fn malformed_config_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        replay(&dir, "pixel7_android14.json")
            .args(["get", "brand"])
            .assert()
            .code(14);
    }

    #[test]
    fn zero_timeout_rejected() {
        let dir = TempDir::new().unwrap();
        replay(&dir, "pixel7_android14.json")
            .args(["--timeout-ms", "0", "get", "brand"])
            .assert()
            .code(14);
    }
}

// ============================================================================
// Fake adb client
// ============================================================================

#[cfg(unix)]
mod fake_adb {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("adb");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn falls_back_through_the_real_transport() {
        let dir = TempDir::new().unwrap();
        let adb = script(
            &dir,
            r#"case "$*" in
  *"getprop ro.product.model"*) echo "Pixel 7" ;;
  *) exit 1 ;;
esac"#,
        );
        sodium(&dir)
            .arg("--adb")
            .arg(&adb)
            .args(["--format", "text", "get", "device_model"])
            .assert()
            .success()
            .stdout("Pixel 7\n");
    }

    #[test]
    fn serial_is_passed_to_adb() {
        let dir = TempDir::new().unwrap();
        let adb = script(&dir, r#"echo "$@""#);
        sodium(&dir)
            .arg("--adb")
            .arg(&adb)
            .args(["-s", "emulator-5554", "--format", "text", "shell", "id"])
            .assert()
            .success()
            .stdout("-s emulator-5554 shell id\n");
    }

    #[test]
    fn offline_device() {
        let dir = TempDir::new().unwrap();
        let adb = script(&dir, "echo 'error: device offline' >&2\nexit 1");
        let output = sodium(&dir)
            .arg("--adb")
            .arg(&adb)
            .args(["shell", "id"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(13));
        let err: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
        assert_eq!(err["context"]["failure"]["kind"], "unreachable");
    }

    #[test]
    fn deadline_stops_a_hung_device() {
        let dir = TempDir::new().unwrap();
        let adb = script(&dir, "sleep 5");
        sodium(&dir)
            .arg("--adb")
            .arg(&adb)
            .args(["--deadline-ms", "200", "get", "brand"])
            .timeout(std::time::Duration::from_secs(4))
            .assert()
            .code(22);
    }
}

// ============================================================================
// Live device (skipped without adb)
// ============================================================================

mod live {
    use super::*;

    fn adb_available() -> bool {
        std::process::Command::new("adb")
            .arg("version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn list_packages_from_real_adb() {
        if !adb_available() {
            println!("Skipping: adb not on PATH");
            return;
        }
        let dir = TempDir::new().unwrap();
        let output = sodium(&dir).args(["get", "packages"]).output().unwrap();
        // Without an attached device this reports a command failure.
        assert!(matches!(output.status.code(), Some(0) | Some(13)));
    }
}
