//! Supervisor tests using small shell scripts in place of `hl-tunnel`
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use hl_core::{Credentials, TunnelError};
use hl_remote::tunnel::{ProcessLauncher, RunningTunnel, TunnelLauncher, TunnelSpec};

fn script(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("fake-tunnel.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn spec() -> TunnelSpec {
    TunnelSpec {
        credentials: Credentials::new("login.cluster", "alice").with_password("pw"),
        destination_host: "node07".into(),
        destination_port: 5000,
        local_port: 5000,
    }
}

#[tokio::test]
async fn test_ready_line_is_detected() {
    let dir = TempDir::new().unwrap();
    let program = script(
        &dir,
        "echo 'connecting' >&2\n\
         echo 'Tunnel listening on 127.0.0.1:5000 -> '\"$5:$6\"\n\
         exec sleep 30",
    );

    let tunnel = ProcessLauncher::new(program).launch(&spec()).await.unwrap();
    assert_eq!(tunnel.local_addr(), "127.0.0.1:5000".parse().unwrap());
    assert!(tunnel.is_alive());

    let started = Instant::now();
    tunnel.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_exit_before_ready_is_startup_failure() {
    let dir = TempDir::new().unwrap();
    let program = script(&dir, "echo 'Authentication failed for alice' >&2\nexit 3");

    let err = ProcessLauncher::new(program).launch(&spec()).await.err().unwrap();
    match err {
        TunnelError::ExitedBeforeReady { code, output } => {
            assert_eq!(code, Some(3));
            assert!(output.contains("Authentication failed"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_unexpected_exit_marks_tunnel_dead() {
    let dir = TempDir::new().unwrap();
    let program = script(
        &dir,
        "echo 'Tunnel listening on 127.0.0.1:5000 -> node07:5000'\nexit 0",
    );

    let tunnel = ProcessLauncher::new(program).launch(&spec()).await.unwrap();
    for _ in 0..100 {
        if !tunnel.is_alive() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!tunnel.is_alive());
    tunnel.shutdown().await;
}

#[tokio::test]
async fn test_missing_program_fails_to_spawn() {
    let launcher = ProcessLauncher::new("/nonexistent/hl-tunnel");
    let err = launcher.launch(&spec()).await.err().unwrap();
    assert!(matches!(err, TunnelError::Spawn { .. }));
}

#[tokio::test]
async fn test_connect_timeout_reaches_child() {
    let dir = TempDir::new().unwrap();
    let program = script(&dir, "echo \"args: $*\" >&2\nexit 2");

    let err = ProcessLauncher::new(program)
        .with_connect_timeout(Duration::from_secs(45))
        .launch(&spec())
        .await
        .err()
        .unwrap();
    match err {
        TunnelError::ExitedBeforeReady { output, .. } => {
            assert!(output.contains("login.cluster alice pw null node07 5000 5000"));
            assert!(output.contains("--connect-timeout 45"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}
