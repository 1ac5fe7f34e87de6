//! Shared test utilities for integration tests.
//!
//! # Port Allocation
//!
//! UDP tests bind real loopback sockets. `PortAllocator` hands out ports from a
//! process-specific range so parallel test binaries do not collide:
//!
//! ```ignore
//! use common::test_utils::PortAllocator;
//!
//! let (host_port, guest_port) = PortAllocator::next_pair();
//! ```

use princess_of_fire::{Buttons, InputSample};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// Starting port for the allocator, clear of well-known and most registered ports.
const PORT_ALLOCATOR_START: u16 = 30000;

/// Ports reserved per test process.
const PORTS_PER_PROCESS: u16 = 20;

static PORT_COUNTER: AtomicU16 = AtomicU16::new(0);
static PORT_COUNTER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Thread-safe port allocator for integration tests.
pub struct PortAllocator;

impl PortAllocator {
    fn initialize_counter() {
        if PORT_COUNTER_INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // nextest runs each test in its own process; the PID picks the range
            let pid = std::process::id();
            let max_offsets = (60000 - PORT_ALLOCATOR_START) / PORTS_PER_PROCESS;
            let offset_index = (pid as u16) % max_offsets;
            let start_port = PORT_ALLOCATOR_START + (offset_index * PORTS_PER_PROCESS);
            PORT_COUNTER.store(start_port, Ordering::SeqCst);
        }
    }

    /// Allocates the next port.
    ///
    /// # Panics
    ///
    /// Panics if the counter runs past the allocator range.
    #[must_use]
    pub fn next_port() -> u16 {
        Self::initialize_counter();
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        assert!(
            port < 60000,
            "Port allocator exhausted. This indicates a test suite issue."
        );
        port
    }

    /// Allocates a pair of ports for a host and a guest.
    #[must_use]
    pub fn next_pair() -> (u16, u16) {
        (Self::next_port(), Self::next_port())
    }
}

/// Loopback address for `port`.
#[must_use]
pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// Stick pushed fully left.
#[must_use]
pub const fn left() -> InputSample {
    InputSample {
        axis_x: 0,
        axis_y: InputSample::CENTER,
        buttons: Buttons::NONE,
    }
}

/// Stick pushed fully right.
#[must_use]
pub const fn right() -> InputSample {
    InputSample {
        axis_x: 1023,
        axis_y: InputSample::CENTER,
        buttons: Buttons::NONE,
    }
}
