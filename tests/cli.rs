use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use sluice::authority::root_ca_pem;
use tempfile::tempdir;

/// Run the binary with user config isolated to `home`.
fn sluice(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sluice"))
        .args(args)
        .env("XDG_CONFIG_HOME", home)
        .env("HOME", home)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run sluice")
}

#[test]
fn test_export_ca_to_stdout() {
    let home = tempdir().unwrap();
    let output = sluice(home.path(), &["export-ca"]);

    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), root_ca_pem());
}

#[test]
fn test_export_ca_to_file() {
    let home = tempdir().unwrap();
    let out = home.path().join("root.pem");
    let output = sluice(home.path(), &["export-ca", "--out", out.to_str().unwrap()]);

    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&out).unwrap(), root_ca_pem());
}

#[test]
fn test_show_config_reflects_flags() {
    let home = tempdir().unwrap();
    let output = sluice(
        home.path(),
        &["show-config", "--listen", "127.0.0.1:9191", "--no-cache"],
    );

    assert!(output.status.success());
    let rendered = String::from_utf8(output.stdout).unwrap();
    let parsed: toml::Value = toml::from_str(&rendered).unwrap();
    assert_eq!(parsed["server"]["listen_addr"].as_str(), Some("127.0.0.1:9191"));
    assert_eq!(parsed["certificates"]["cache"].as_str(), Some("none"));
}

#[test]
fn test_corrupt_root_fails_before_listening() {
    let home = tempdir().unwrap();
    let cert = home.path().join("root.pem");
    let key = home.path().join("root.key");
    fs::write(&cert, "-----BEGIN CERTIFICATE-----\nnot base64\n-----END CERTIFICATE-----\n").unwrap();
    fs::write(&key, "garbage").unwrap();

    let config = home.path().join("sluice.toml");
    fs::write(
        &config,
        format!(
            "[certificates]\nroot_cert_path = {:?}\nroot_key_path = {:?}\n",
            cert.to_str().unwrap(),
            key.to_str().unwrap()
        ),
    )
    .unwrap();

    let output = sluice(
        home.path(),
        &["--config", config.to_str().unwrap(), "--listen", "127.0.0.1:0", "run"],
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load root CA"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_file_fails() {
    let home = tempdir().unwrap();
    let missing = home.path().join("absent.toml");
    let output = sluice(home.path(), &["--config", missing.to_str().unwrap(), "show-config"]);

    assert!(!output.status.success());
}
