//! Network integration tests.
//!
//! - Sessions behind a ChaosSocket (loss, duplication, delay, reordering)
//! - Sessions over real loopback UDP sockets
//! - Two `network_test_peer` processes playing a round

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

mod network {
    pub mod multi_process;
    pub mod resilience;
    pub mod udp;
}
