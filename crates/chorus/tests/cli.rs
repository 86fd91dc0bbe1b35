use std::fs;
use std::io::{BufRead as _, BufReader, Write as _};
use std::os::unix::net::UnixListener;
use std::thread;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn help_lists_commands() {
    let mut cmd = cargo_bin_cmd!("chorus");
    cmd.arg("--help");

    let has_cmd = |name: &str| predicate::str::is_match(format!(r"(?m)^\s{{2}}{name}\b")).unwrap();

    cmd.assert()
        .success()
        .stdout(has_cmd("tui"))
        .stdout(has_cmd("status"))
        .stdout(has_cmd("version"))
        .stdout(has_cmd("completion"))
        .stdout(has_cmd("ping").not());
}

#[test]
fn version_prints_package_version_and_creates_log() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("chorus");

    let mut cmd = cargo_bin_cmd!("chorus");
    cmd.env("CHORUS_DIR", &base);
    cmd.arg("version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));

    assert!(base.join("chorus.log").exists());
}

#[test]
fn status_without_daemon_fails_with_connect_error() {
    let dir = TempDir::new().unwrap();

    let mut cmd = cargo_bin_cmd!("chorus");
    cmd.env("CHORUS_DIR", dir.path());
    cmd.env("CHORUS_LOG", "off");
    cmd.arg("status");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("connect:"));
}

#[test]
fn malformed_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "[tui\n").unwrap();

    let mut cmd = cargo_bin_cmd!("chorus");
    cmd.env("CHORUS_DIR", dir.path());
    cmd.arg("version");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("config.toml"));
}

#[test]
fn status_prints_agents_from_daemon() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("daemon.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let req: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(req["type"], "agent.list");

        let resp = serde_json::json!({
            "type": "agent.list",
            "id": req["id"],
            "success": true,
            "payload": {
                "agents": [
                    {"id": "a-1", "project": "api", "role": "coding", "state": "running", "task": "fix login"},
                ],
            },
        });
        let mut stream = stream;
        writeln!(stream, "{resp}").unwrap();
    });

    let mut cmd = cargo_bin_cmd!("chorus");
    cmd.env("CHORUS_DIR", dir.path());
    cmd.env("CHORUS_LOG", "off");
    cmd.env("CHORUS_SOCKET_PATH", &socket);
    cmd.arg("status");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("a-1\tapi\tcoding\trunning\t-\tfix login"));

    server.join().unwrap();
}
