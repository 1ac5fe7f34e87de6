//! Session integration tests.
//!
//! Two sessions on an in-process network, driven frame by frame:
//! - connection, loss of the link and reconnection
//! - character selection and its conflicts
//! - whole rounds, from start to game over and back

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

mod sessions {
    pub mod connection;
    pub mod round;
    pub mod selection;
}
