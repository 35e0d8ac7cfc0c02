#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run the binary with `HOME` redirected to `home`, feeding `stdin` and
/// setting `env` on top of a scrubbed environment.
pub fn run_cli(args: &[&str], stdin: &str, home: &Path, env: &[(&str, &str)]) -> (i32, String, String) {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hail-mary"));
    cmd.args(args)
        .env("HOME", home)
        .env_remove("HAIL_MARY_PARENT_PID")
        .env_remove("HAIL_MARY_FEATURE_PATH")
        .env_remove("HAIL_MARY_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        cmd.env(key, value);
    }
    let mut child = cmd.spawn().expect("failed to spawn binary");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Feed one hook event to `hail-mary hook`.
pub fn run_hook(stdin_json: &str, home: &Path, env: &[(&str, &str)]) -> (i32, String, String) {
    run_cli(&["hook"], stdin_json, home, env)
}

/// A hook payload with the base fields filled in.
pub fn event(kind: &str, session_id: &str, extra: serde_json::Value) -> String {
    let mut value = serde_json::json!({
        "session_id": session_id,
        "transcript_path": "/t/x.jsonl",
        "cwd": "/p",
        "hook_event_name": kind,
    });
    value
        .as_object_mut()
        .unwrap()
        .extend(extra.as_object().unwrap().clone());
    value.to_string()
}

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn read_json(path: &Path) -> serde_json::Value {
    let raw = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
    serde_json::from_str(&raw).unwrap()
}
