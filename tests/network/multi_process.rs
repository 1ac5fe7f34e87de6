//! Multi-process loopback tests.
//!
//! These tests spawn two `network_test_peer` processes, a host and a guest, and let them play
//! one round over real UDP sockets.
//!
//! # Requirements
//!
//! The binary must be built first:
//! ```bash
//! cargo build -p network-test-peer
//! ```
//! Without it the tests print a notice and return.

#![allow(clippy::print_stderr)]

use serde::Deserialize;
use serial_test::serial;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(windows)]
const PEER_BINARY_NAME: &str = "network_test_peer.exe";
#[cfg(not(windows))]
const PEER_BINARY_NAME: &str = "network_test_peer";

/// One JSON line printed by a peer when it exits.
#[derive(Debug, Deserialize)]
struct PeerResult {
    success: bool,
    role: String,
    frames: u64,
    outcome: Option<PeerOutcome>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PeerOutcome {
    cause: String,
    winner: String,
    local_won: bool,
}

/// Test executables live in `target/<profile>/deps/`, workspace binaries one level up.
fn find_peer_binary() -> Option<PathBuf> {
    let test_exe = std::env::current_exe().ok()?;
    let target_dir = test_exe.parent().and_then(|deps| deps.parent())?;
    let binary = target_dir.join(PEER_BINARY_NAME);
    binary.exists().then_some(binary)
}

macro_rules! skip_if_no_peer_binary {
    () => {
        if find_peer_binary().is_none() {
            eprintln!(
                "SKIP: {} not found; build it with `cargo build -p network-test-peer`",
                PEER_BINARY_NAME
            );
            return;
        }
    };
}

fn spawn_peer(args: &[&str]) -> Child {
    let binary = find_peer_binary().expect("peer binary checked by the caller");
    Command::new(binary)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn network_test_peer")
}

fn wait_for_peer(mut child: Child, name: &str, timeout: Duration) -> PeerResult {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if started.elapsed() > timeout => {
                let _ = child.kill();
                let _ = child.wait();
                panic!("{name} still running after {timeout:?}");
            }
            Ok(None) => thread::sleep(Duration::from_millis(100)),
            Err(e) => panic!("{name}: cannot poll the process: {e}"),
        }
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        let _ = pipe.read_to_string(&mut stdout);
    }
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr);
    }
    let last_line = stdout.lines().last().unwrap_or("");
    serde_json::from_str(last_line).unwrap_or_else(|e| {
        panic!("{name} printed no result ({e})\nstdout: {stdout}\nstderr: {stderr}")
    })
}

fn run_round(host_args: &[&str], guest_args: &[&str]) -> (PeerResult, PeerResult) {
    let host = spawn_peer(host_args);
    // let the host bind before the guest starts asking
    thread::sleep(Duration::from_millis(100));
    let guest = spawn_peer(guest_args);

    let limit = Duration::from_secs(45);
    let host = wait_for_peer(host, "host", limit);
    let guest = wait_for_peer(guest, "guest", limit);
    (host, guest)
}

fn assert_same_round(host: &PeerResult, guest: &PeerResult) {
    assert!(host.success, "host failed: {host:?}");
    assert!(guest.success, "guest failed: {guest:?}");
    assert_eq!(host.role, "host");
    assert_eq!(guest.role, "guest");
    assert!(host.frames > 0 && guest.frames > 0);

    let host_outcome = host.outcome.as_ref().expect("host outcome");
    let guest_outcome = guest.outcome.as_ref().expect("guest outcome");
    assert_eq!(host_outcome.cause, guest_outcome.cause);
    assert_eq!(host_outcome.winner, guest_outcome.winner);
    assert_ne!(host_outcome.local_won, guest_outcome.local_won);
    assert!(host.error.is_none() && guest.error.is_none());
}

#[test]
#[serial]
fn host_and_guest_play_one_round_over_loopback() {
    skip_if_no_peer_binary!();
    let (host, guest) = run_round(
        &[
            "--local-port", "17401", "--role", "host", "--character", "dragon",
            "--round-ms", "5000", "--timeout", "30",
        ],
        &[
            "--local-port", "17402", "--role", "guest", "--peer", "127.0.0.1:17401",
            "--character", "princess", "--round-ms", "5000", "--timeout", "30",
        ],
    );
    assert_same_round(&host, &guest);
}

#[test]
#[serial]
fn round_survives_lossy_loopback() {
    skip_if_no_peer_binary!();
    let (host, guest) = run_round(
        &[
            "--local-port", "17403", "--role", "host", "--round-ms", "5000",
            "--timeout", "30", "--packet-loss", "0.1", "--duplicate-rate", "0.05",
            "--seed", "42",
        ],
        &[
            "--local-port", "17404", "--role", "guest", "--peer", "127.0.0.1:17403",
            "--round-ms", "5000", "--timeout", "30", "--packet-loss", "0.1",
            "--reorder-rate", "0.1", "--seed", "43",
        ],
    );
    assert_same_round(&host, &guest);
}
