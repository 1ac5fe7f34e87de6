//! A socket wrapper that injects link faults.
//!
//! [`ChaosSocket`] wraps any [`NonBlockingSocket`] and loses, duplicates, delays and reorders
//! datagrams. Every decision comes from a seeded [`Pcg32`], and delays are counted in receive
//! calls rather than wall time, so a seeded run replays exactly under a
//! [`ManualClock`](crate::ManualClock).
//!
//! # Example
//!
//! ```rust
//! use princess_of_fire::{ChaosConfig, ChaosSocket, MemoryNetwork};
//!
//! let network = MemoryNetwork::new();
//! let config = ChaosConfig::builder()
//!     .packet_loss_rate(0.2)
//!     .duplication_rate(0.1)
//!     .seed(42)
//!     .build();
//! assert!(config.validate().is_ok());
//! let socket = ChaosSocket::new(network.socket(1), config);
//! assert_eq!(socket.stats().packets_sent, 0);
//! ```

use crate::network::messages::Message;
use crate::rng::{Pcg32, Rng, SeedableRng};
use crate::{Address, GameError, NonBlockingSocket};

/// Fault rates for a [`ChaosSocket`]. Every rate is a probability in `[0.0, 1.0]`.
///
/// All rates default to 0.0 (no effect).
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "ChaosConfig has no effect unless passed to ChaosSocket::new()"]
pub struct ChaosConfig {
    /// Probability of dropping a datagram on send.
    pub send_loss_rate: f64,

    /// Probability of dropping a datagram on receive.
    pub receive_loss_rate: f64,

    /// Probability of sending a datagram twice.
    pub duplication_rate: f64,

    /// Probability of holding a received datagram back until a later receive call.
    pub delay_rate: f64,

    /// Maximum number of receive calls a delayed datagram waits.
    ///
    /// Default: 3
    pub max_delay_polls: u32,

    /// Probability of swapping a received datagram with another one of the same batch.
    pub reorder_rate: f64,

    /// Probability of starting a burst of consecutive send losses.
    pub burst_loss_probability: f64,

    /// Datagrams dropped by one burst.
    pub burst_loss_length: usize,

    /// Seed for every fault decision. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            send_loss_rate: 0.0,
            receive_loss_rate: 0.0,
            duplication_rate: 0.0,
            delay_rate: 0.0,
            max_delay_polls: 3,
            reorder_rate: 0.0,
            burst_loss_probability: 0.0,
            burst_loss_length: 0,
            seed: None,
        }
    }
}

impl ChaosConfig {
    /// Creates a new builder for fluent configuration.
    pub fn builder() -> ChaosConfigBuilder {
        ChaosConfigBuilder::new()
    }

    /// No faults at all.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Symmetric loss on send and receive.
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            send_loss_rate: loss_rate,
            receive_loss_rate: loss_rate,
            ..Self::default()
        }
    }

    /// A crowded 2.4 GHz band: some loss, some duplicates, frequent reordering.
    pub fn noisy_radio() -> Self {
        Self {
            send_loss_rate: 0.1,
            receive_loss_rate: 0.1,
            duplication_rate: 0.05,
            delay_rate: 0.2,
            reorder_rate: 0.2,
            ..Self::default()
        }
    }

    /// Validates the rates.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if a rate is outside `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<(), GameError> {
        let rates = [
            ("send_loss_rate", self.send_loss_rate),
            ("receive_loss_rate", self.receive_loss_rate),
            ("duplication_rate", self.duplication_rate),
            ("delay_rate", self.delay_rate),
            ("reorder_rate", self.reorder_rate),
            ("burst_loss_probability", self.burst_loss_probability),
        ];
        for (field, rate) in rates {
            if !(0.0..=1.0).contains(&rate) {
                return Err(GameError::InvalidConfig {
                    field,
                    reason: format!("{} is not a probability in [0.0, 1.0]", rate),
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`ChaosConfig`]. Rates are clamped into `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaosConfigBuilder {
    config: ChaosConfig,
}

impl ChaosConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets packet loss rate for both send and receive.
    pub fn packet_loss_rate(mut self, rate: f64) -> Self {
        self.config.send_loss_rate = rate.clamp(0.0, 1.0);
        self.config.receive_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets packet loss rate for sending only.
    pub fn send_loss_rate(mut self, rate: f64) -> Self {
        self.config.send_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets packet loss rate for receiving only.
    pub fn receive_loss_rate(mut self, rate: f64) -> Self {
        self.config.receive_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the packet duplication rate.
    pub fn duplication_rate(mut self, rate: f64) -> Self {
        self.config.duplication_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the delay rate and the longest delay in receive calls.
    pub fn delay(mut self, rate: f64, max_polls: u32) -> Self {
        self.config.delay_rate = rate.clamp(0.0, 1.0);
        self.config.max_delay_polls = max_polls;
        self
    }

    /// Sets the reorder rate.
    pub fn reorder_rate(mut self, rate: f64) -> Self {
        self.config.reorder_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// When a burst starts (with `probability`), `length` consecutive sends are dropped.
    pub fn burst_loss(mut self, probability: f64, length: usize) -> Self {
        self.config.burst_loss_probability = probability.clamp(0.0, 1.0);
        self.config.burst_loss_length = length;
        self
    }

    /// Sets the random seed for deterministic behavior.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ChaosConfig {
        self.config
    }
}

/// Counters of what the chaos socket did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChaosStats {
    /// Datagrams handed to `send_to`.
    pub packets_sent: u64,
    /// Datagrams dropped on send.
    pub packets_dropped_send: u64,
    /// Datagrams sent twice.
    pub packets_duplicated: u64,
    /// Datagrams handed back from `receive_all_messages`.
    pub packets_received: u64,
    /// Datagrams dropped on receive.
    pub packets_dropped_receive: u64,
    /// Datagrams held back for later receive calls.
    pub packets_delayed: u64,
    /// Swaps performed within a receive batch.
    pub packets_reordered: u64,
    /// Bursts started.
    pub burst_loss_events: u64,
    /// Datagrams dropped by bursts.
    pub packets_dropped_burst: u64,
}

#[derive(Debug, Clone)]
struct DelayedPacket<A> {
    addr: A,
    msg: Message,
    polls_left: u32,
}

/// A socket wrapper that injects seeded faults.
///
/// With the `sync-send` feature, `ChaosSocket` is `Send + Sync` if the inner socket is.
#[derive(Debug)]
pub struct ChaosSocket<A: Address, S: NonBlockingSocket<A>> {
    inner: S,
    config: ChaosConfig,
    rng: Pcg32,
    delayed: Vec<DelayedPacket<A>>,
    burst_loss_remaining: usize,
    stats: ChaosStats,
}

impl<A: Address, S: NonBlockingSocket<A>> ChaosSocket<A, S> {
    /// Wraps `inner`.
    pub fn new(inner: S, config: ChaosConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_entropy(),
        };

        Self {
            inner,
            config,
            rng,
            delayed: Vec::new(),
            burst_loss_remaining: 0,
            stats: ChaosStats::default(),
        }
    }

    /// Returns a reference to the inner socket.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner socket.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes the chaos socket and returns the inner socket.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    /// Replaces the configuration. The RNG keeps its state.
    pub fn set_config(&mut self, config: ChaosConfig) {
        self.config = config;
    }

    /// Returns what the socket did so far.
    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }

    /// Resets statistics counters.
    pub fn reset_stats(&mut self) {
        self.stats = ChaosStats::default();
    }

    /// Datagrams currently held back.
    pub fn packets_delayed(&self) -> usize {
        self.delayed.len()
    }

    fn roll(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            false
        } else if rate >= 1.0 {
            true
        } else {
            self.rng.gen_bool(rate)
        }
    }

    fn should_drop_burst(&mut self) -> bool {
        if self.burst_loss_remaining > 0 {
            self.burst_loss_remaining -= 1;
            self.stats.packets_dropped_burst += 1;
            return true;
        }

        if self.config.burst_loss_length > 0 && self.roll(self.config.burst_loss_probability) {
            self.stats.burst_loss_events += 1;
            self.burst_loss_remaining = self.config.burst_loss_length.saturating_sub(1);
            self.stats.packets_dropped_burst += 1;
            return true;
        }

        false
    }

    fn release_delayed(&mut self, ready: &mut Vec<(A, Message)>) {
        let mut still_waiting = Vec::with_capacity(self.delayed.len());
        for mut packet in self.delayed.drain(..) {
            if packet.polls_left == 0 {
                ready.push((packet.addr, packet.msg));
            } else {
                packet.polls_left -= 1;
                still_waiting.push(packet);
            }
        }
        self.delayed = still_waiting;
    }

    fn apply_reordering(&mut self, messages: &mut [(A, Message)]) {
        if messages.len() < 2 {
            return;
        }
        for i in 0..messages.len() {
            if self.roll(self.config.reorder_rate) {
                let j = self.rng.gen_range_usize(0..messages.len());
                if i != j {
                    messages.swap(i, j);
                    self.stats.packets_reordered += 1;
                }
            }
        }
    }

    fn chaotic_send(&mut self, msg: &Message, addr: &A) {
        self.stats.packets_sent += 1;

        // bursts take priority
        if self.should_drop_burst() {
            return;
        }

        if self.roll(self.config.send_loss_rate) {
            self.stats.packets_dropped_send += 1;
            return;
        }

        self.inner.send_to(msg, addr);

        if self.roll(self.config.duplication_rate) {
            self.stats.packets_duplicated += 1;
            self.inner.send_to(msg, addr);
        }
    }

    fn chaotic_receive(&mut self) -> Vec<(A, Message)> {
        let mut ready = Vec::new();
        self.release_delayed(&mut ready);

        for (addr, msg) in self.inner.receive_all_messages() {
            if self.roll(self.config.receive_loss_rate) {
                self.stats.packets_dropped_receive += 1;
                continue;
            }
            if self.config.max_delay_polls > 0 && self.roll(self.config.delay_rate) {
                let polls = self.rng.gen_range(0..self.config.max_delay_polls);
                self.stats.packets_delayed += 1;
                self.delayed.push(DelayedPacket {
                    addr,
                    msg,
                    polls_left: polls,
                });
                continue;
            }
            ready.push((addr, msg));
        }

        self.apply_reordering(&mut ready);
        self.stats.packets_received += ready.len() as u64;
        ready
    }
}

#[cfg(feature = "sync-send")]
impl<A, S> NonBlockingSocket<A> for ChaosSocket<A, S>
where
    A: Address,
    S: NonBlockingSocket<A> + Send + Sync,
{
    fn send_to(&mut self, msg: &Message, addr: &A) {
        self.chaotic_send(msg, addr);
    }

    fn receive_all_messages(&mut self) -> Vec<(A, Message)> {
        self.chaotic_receive()
    }
}

#[cfg(not(feature = "sync-send"))]
impl<A, S> NonBlockingSocket<A> for ChaosSocket<A, S>
where
    A: Address,
    S: NonBlockingSocket<A>,
{
    fn send_to(&mut self, msg: &Message, addr: &A) {
        self.chaotic_send(msg, addr);
    }

    fn receive_all_messages(&mut self) -> Vec<(A, Message)> {
        self.chaotic_receive()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::memory_socket::{MemoryAddr, MemoryNetwork, MemorySocket};
    use crate::network::messages::{MessageBody, MessageHeader};

    fn keepalive(magic: u16) -> Message {
        Message {
            header: MessageHeader { magic },
            body: MessageBody::KeepAlive,
        }
    }

    fn pair(
        config: ChaosConfig,
    ) -> (ChaosSocket<MemoryAddr, MemorySocket>, MemorySocket) {
        let network = MemoryNetwork::new();
        let chaotic = ChaosSocket::new(network.socket(1), config);
        (chaotic, network.socket(2))
    }

    #[test]
    fn passthrough_delivers_everything_in_order() {
        let (mut chaotic, mut plain) = pair(ChaosConfig::passthrough());
        for magic in 1..=5 {
            chaotic.send_to(&keepalive(magic), &MemoryAddr(2));
        }
        let magics: Vec<u16> = plain
            .receive_all_messages()
            .into_iter()
            .map(|(_, msg)| msg.header.magic)
            .collect();
        assert_eq!(magics, vec![1, 2, 3, 4, 5]);
        assert_eq!(chaotic.stats().packets_sent, 5);
    }

    #[test]
    fn full_send_loss_drops_everything() {
        let (mut chaotic, mut plain) = pair(ChaosConfig::builder().send_loss_rate(1.0).build());
        chaotic.send_to(&keepalive(1), &MemoryAddr(2));
        assert!(plain.receive_all_messages().is_empty());
        assert_eq!(chaotic.stats().packets_dropped_send, 1);
    }

    #[test]
    fn full_duplication_sends_twice() {
        let (mut chaotic, mut plain) =
            pair(ChaosConfig::builder().duplication_rate(1.0).seed(1).build());
        chaotic.send_to(&keepalive(1), &MemoryAddr(2));
        assert_eq!(plain.receive_all_messages().len(), 2);
        assert_eq!(chaotic.stats().packets_duplicated, 1);
    }

    #[test]
    fn burst_drops_consecutive_sends() {
        let (mut chaotic, mut plain) =
            pair(ChaosConfig::builder().burst_loss(1.0, 3).seed(1).build());
        for magic in 1..=3 {
            chaotic.send_to(&keepalive(magic), &MemoryAddr(2));
        }
        assert!(plain.receive_all_messages().is_empty());
        assert_eq!(chaotic.stats().burst_loss_events, 1);
        assert_eq!(chaotic.stats().packets_dropped_burst, 3);
    }

    #[test]
    fn delayed_packets_arrive_on_a_later_receive() {
        let network = MemoryNetwork::new();
        let mut sender = network.socket(1);
        let mut chaotic = ChaosSocket::new(
            network.socket(2),
            ChaosConfig::builder().delay(1.0, 1).seed(3).build(),
        );
        sender.send_to(&keepalive(7), &MemoryAddr(2));
        assert!(chaotic.receive_all_messages().is_empty());
        assert_eq!(chaotic.packets_delayed(), 1);
        let later = chaotic.receive_all_messages();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].0, MemoryAddr(1));
    }

    #[test]
    fn same_seed_same_faults() {
        let run = || {
            let (mut chaotic, mut plain) = pair(ChaosConfig {
                seed: Some(9),
                ..ChaosConfig::noisy_radio()
            });
            for magic in 1..=50 {
                chaotic.send_to(&keepalive(magic), &MemoryAddr(2));
            }
            plain
                .receive_all_messages()
                .into_iter()
                .map(|(_, msg)| msg.header.magic)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn validate_rejects_non_probabilities() {
        let config = ChaosConfig {
            reorder_rate: 1.5,
            ..ChaosConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GameError::InvalidConfig {
                field: "reorder_rate",
                ..
            })
        ));
        assert!(ChaosConfig::noisy_radio().validate().is_ok());
    }
}
