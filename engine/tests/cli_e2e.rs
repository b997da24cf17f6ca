//! End-to-end tests of the `engine` binary for runs that need no model.
//!
//! Each test points the XDG directories at a scratch location so no user
//! configuration or cached model leaks in.

use std::path::Path;
use std::process::{Command, Output};

use scriptgrab_common::{Sidecar, SidecarRequest};
use scriptgrab_proto::{Message, StreamValidator, parse_line};

const ENGINE: &str = env!("CARGO_BIN_EXE_engine");

fn engine(home: &Path) -> Command {
    let mut command = Command::new(ENGINE);
    command
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("SCRIPTGRAB_LOG");
    command
}

/// Parse stdout, asserting every line is a valid message in a valid order.
fn messages(output: &Output) -> Vec<Message> {
    let stdout = String::from_utf8(output.stdout.clone()).expect("stdout is not UTF-8");
    let mut validator = StreamValidator::new();
    let messages: Vec<Message> = stdout
        .lines()
        .map(|line| {
            parse_line(line)
                .unwrap_or_else(|e| panic!("invalid protocol line {line:?}: {e}"))
                .unwrap_or_else(|| panic!("blank protocol line in {stdout:?}"))
        })
        .collect();
    for message in &messages {
        validator.observe(message).unwrap();
    }
    validator.finish().unwrap();
    messages
}

#[test]
fn test_missing_file_reports_single_error() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("nope.wav");

    let output = engine(tmp.path()).arg(&missing).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        messages(&output),
        [Message::error(format!(
            "File not found: {}",
            missing.display()
        ))]
    );
}

#[test]
fn test_undecodable_audio_fails_while_loading() {
    let tmp = tempfile::tempdir().unwrap();
    let garbage = tmp.path().join("garbage.wav");
    std::fs::write(&garbage, b"this is not audio at all").unwrap();

    let output = engine(tmp.path()).arg(&garbage).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        messages(&output),
        [
            Message::progress(5, "Loading audio file..."),
            Message::error("Could not determine audio duration"),
        ]
    );
}

#[test]
fn test_invalid_model_is_a_protocol_error() {
    let tmp = tempfile::tempdir().unwrap();

    let output = engine(tmp.path())
        .args(["talk.wav", "--model", "huge"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    match messages(&output).as_slice() {
        [Message::Error { message }] => assert!(message.contains("huge"), "{message}"),
        other => panic!("expected a single error, got {other:?}"),
    }
}

#[test]
fn test_missing_config_file_is_a_protocol_error() {
    let tmp = tempfile::tempdir().unwrap();
    let audio = tmp.path().join("talk.wav");
    std::fs::write(&audio, b"").unwrap();

    let output = engine(tmp.path())
        .arg(&audio)
        .arg("--config")
        .arg(tmp.path().join("absent.toml"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    match messages(&output).as_slice() {
        [Message::Error { message }] => {
            assert!(message.starts_with("Config file not found"), "{message}")
        }
        other => panic!("expected a single error, got {other:?}"),
    }
}

#[test]
fn test_help_keeps_protocol_channel_empty() {
    let tmp = tempfile::tempdir().unwrap();

    let output = engine(tmp.path()).arg("--help").output().unwrap();

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--model"));
}

#[tokio::test]
async fn test_sidecar_client_surfaces_engine_error() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("nope.mp3");

    let mut command = tokio::process::Command::new(ENGINE);
    command
        .arg(&missing)
        .env("XDG_CONFIG_HOME", tmp.path().join("config"))
        .env("XDG_DATA_HOME", tmp.path().join("data"));
    let err = Sidecar::from_command(command)
        .unwrap()
        .collect()
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        format!("File not found: {}", missing.display())
    );
}

#[tokio::test]
async fn test_sidecar_spawn_passes_request_flags() {
    let request = SidecarRequest {
        model: Some("gigantic".to_string()),
        ..SidecarRequest::new("talk.wav")
    };

    let err = Sidecar::spawn(ENGINE, &request)
        .unwrap()
        .collect()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("gigantic"), "{err}");
}

#[cfg(unix)]
#[tokio::test]
async fn test_interrupt_while_loading_reports_cancellation() {
    use scriptgrab_common::SidecarEvent;

    let tmp = tempfile::tempdir().unwrap();
    // Opening a FIFO with no writer blocks, holding the run in the load stage.
    let fifo = tmp.path().join("stalled.wav");
    let status = Command::new("mkfifo").arg(&fifo).status().unwrap();
    assert!(status.success());

    let mut command = tokio::process::Command::new(ENGINE);
    command
        .arg(&fifo)
        .env("XDG_CONFIG_HOME", tmp.path().join("config"))
        .env("XDG_DATA_HOME", tmp.path().join("data"))
        .env_remove("SCRIPTGRAB_LOG");
    let mut sidecar = Sidecar::from_command(command).unwrap();

    assert_eq!(
        sidecar.next_event().await.unwrap(),
        SidecarEvent::Message(Message::progress(5, "Loading audio file..."))
    );
    sidecar.cancel().unwrap();

    let mut rest = Vec::new();
    let code = loop {
        match sidecar.next_event().await.unwrap() {
            SidecarEvent::Exited(code) => break code,
            event => rest.push(event),
        }
    };

    assert_eq!(
        rest,
        [SidecarEvent::Message(Message::error(
            "Transcription cancelled by user"
        ))]
    );
    assert_eq!(code, Some(130));
}
