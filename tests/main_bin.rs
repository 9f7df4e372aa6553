//! Integration tests that lock replay-binary startup behavior and smoke paths.

use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_directory_file() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after epoch")
        .as_nanos();
    let path = env::temp_dir().join(format!("wayfinder-directory-{nanos}.toml"));
    fs::write(
        &path,
        r#"
overlay_id = "DM_15755"
[destinations]
"114" = { lat = 35.61533, lon = -82.56592 }
bathroom = { lat = 35.61540, lon = -82.56600 }
"#,
    )
    .expect("write directory file");
    path
}

fn run_script(args: &[&str], script: &str) -> (bool, Vec<serde_json::Value>) {
    let bin = env!("CARGO_BIN_EXE_wayfinder");
    let mut child = Command::new(bin)
        .args(args)
        .env_remove("WAYFINDER_DIRECTORY")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("run wayfinder");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(script.as_bytes())
        .expect("write script");
    let output = child.wait_with_output().expect("wait for wayfinder");
    let events = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line is JSON"))
        .collect();
    (output.status.success(), events)
}

fn has_event(events: &[serde_json::Value], event: &str, key: &str, value: &str) -> bool {
    events
        .iter()
        .any(|e| e["event"] == event && e[key].as_str() == Some(value))
}

#[test]
fn main_prints_help() {
    let bin = env!("CARGO_BIN_EXE_wayfinder");
    let output = Command::new(bin)
        .arg("--help")
        .output()
        .expect("run wayfinder");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--directory"));
    assert!(stdout.contains("--location-method"));
}

#[test]
fn main_rejects_zero_ready_timeout() {
    let bin = env!("CARGO_BIN_EXE_wayfinder");
    let output = Command::new(bin)
        .args(["--ready-timeout-ms", "0"])
        .stdin(Stdio::null())
        .output()
        .expect("run wayfinder");
    assert!(!output.status.success());
}

#[test]
fn replay_navigates_to_a_spoken_room() {
    let directory = temp_directory_file();
    let dir_arg = directory.to_string_lossy().to_string();
    let script = [
        r#"{"cmd":"fix","lat":35.6150,"lon":-82.5660}"#,
        r#"{"cmd":"tap"}"#,
        r#"{"cmd":"transcript","text":"take me to room 114"}"#,
        r#"{"cmd":"maneuver","text":"Turn left on Hall A"}"#,
        r#"{"cmd":"arrival"}"#,
    ]
    .join("\n");

    let (ok, events) = run_script(&["--directory", &dir_arg], &script);
    let _ = fs::remove_file(&directory);
    assert!(ok);
    assert!(has_event(&events, "speak", "text", "Position found"));
    assert!(events.iter().any(|e| e["event"] == "listen_start"));
    assert!(has_event(&events, "state", "state", "navigating"));
    assert!(events.iter().any(|e| e["event"] == "draw"));
    assert!(has_event(&events, "speak", "text", "Turn left"));
    assert!(has_event(&events, "speak", "text", "You have arrived"));
    assert!(events.iter().any(|e| e["event"] == "remove"));
}

#[test]
fn replay_reports_invalid_lines_and_keeps_going() {
    let script = [
        "not json",
        r#"{"cmd":"teleport"}"#,
        r#"{"cmd":"tap"}"#,
    ]
    .join("\n");
    let (ok, events) = run_script(&[], &script);
    assert!(ok);
    let errors = events.iter().filter(|e| e["event"] == "error").count();
    assert_eq!(errors, 2);
    assert!(has_event(&events, "speak", "text", "Waiting for position"));
}

#[test]
fn replay_announces_unknown_destination() {
    let script = [
        r#"{"cmd":"fix","lat":35.6150,"lon":-82.5660}"#,
        r#"{"cmd":"tap"}"#,
        r#"{"cmd":"transcript","text":"nothing here"}"#,
    ]
    .join("\n");
    let (ok, events) = run_script(&[], &script);
    assert!(ok);
    assert!(has_event(&events, "speak", "text", "No destination found"));
    assert!(!events.iter().any(|e| e["event"] == "draw"));
}

#[test]
fn replay_ignores_speech_once_capture_is_cancelled() {
    let directory = temp_directory_file();
    let dir_arg = directory.to_string_lossy().to_string();
    let script = [
        r#"{"cmd":"fix","lat":35.6150,"lon":-82.5660}"#,
        r#"{"cmd":"tap"}"#,
        r#"{"cmd":"tap"}"#,
        r#"{"cmd":"transcript","text":"room 114"}"#,
        r#"{"cmd":"tap"}"#,
        r#"{"cmd":"silence"}"#,
        r#"{"cmd":"arrival"}"#,
    ]
    .join("\n");

    let (ok, events) = run_script(&["--directory", &dir_arg], &script);
    let _ = fs::remove_file(&directory);
    assert!(ok);
    let starts = events.iter().filter(|e| e["event"] == "listen_start").count();
    assert_eq!(starts, 2);
    assert!(has_event(&events, "error", "message", "speech capture is not listening"));
    assert!(has_event(&events, "error", "message", "guidance is not active"));
    assert!(!events.iter().any(|e| e["event"] == "draw"));
    assert!(!has_event(&events, "state", "state", "navigating"));
}
