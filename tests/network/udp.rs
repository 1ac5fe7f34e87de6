//! Sessions over real loopback UDP sockets.
//!
//! These tests bind ports, so they run one at a time.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::test_utils::{loopback, PortAllocator};
use princess_of_fire::{
    GameEvent, GameSession, InputSample, LinkConfig, PlayerType, SessionBuilder,
    UdpNonBlockingSocket,
};
use serial_test::serial;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(2);
const MAX_ITERATIONS: usize = 1_000;

fn udp_pair() -> (GameSession<SocketAddr>, GameSession<SocketAddr>) {
    let (host_port, guest_port) = PortAllocator::next_pair();
    let host_socket = UdpNonBlockingSocket::bind_to_port(host_port).unwrap();
    let guest_socket = UdpNonBlockingSocket::bind_to_port(guest_port).unwrap();

    let host = SessionBuilder::new()
        .with_link_config(LinkConfig::deterministic(1))
        .start_host_session(host_socket)
        .unwrap();
    let guest = SessionBuilder::new()
        .with_link_config(LinkConfig::deterministic(2))
        .start_guest_session(guest_socket, loopback(host_port))
        .unwrap();
    (host, guest)
}

fn step(host: &mut GameSession<SocketAddr>, guest: &mut GameSession<SocketAddr>) {
    guest.advance_frame(&InputSample::neutral()).unwrap();
    host.advance_frame(&InputSample::neutral()).unwrap();
    thread::sleep(POLL_INTERVAL);
}

fn run_until(
    host: &mut GameSession<SocketAddr>,
    guest: &mut GameSession<SocketAddr>,
    what: &str,
    done: impl Fn(&GameSession<SocketAddr>, &GameSession<SocketAddr>) -> bool,
) {
    for _ in 0..MAX_ITERATIONS {
        if done(host, guest) {
            return;
        }
        step(host, guest);
    }
    panic!("gave up waiting for {what}");
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn sessions_connect_over_loopback() {
    let (mut host, mut guest) = udp_pair();
    run_until(&mut host, &mut guest, "connection", |host, guest| {
        host.is_connected() && guest.is_connected()
    });

    assert!(host.events().any(|e| e == GameEvent::Connected));
    assert!(guest.events().any(|e| e == GameEvent::Connected));
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn selections_cross_loopback() {
    let (mut host, mut guest) = udp_pair();
    run_until(&mut host, &mut guest, "connection", |host, guest| {
        host.is_connected() && guest.is_connected()
    });

    guest.choose_character(PlayerType::Dragon).unwrap();
    host.choose_character(PlayerType::Princess).unwrap();
    run_until(&mut host, &mut guest, "selections", |host, guest| {
        host.state().shared().peer_selection() == PlayerType::Dragon
            && guest.state().shared().peer_selection() == PlayerType::Princess
    });

    guest.disconnect();
    run_until(&mut host, &mut guest, "goodbye", |host, _| !host.is_connected());
}
