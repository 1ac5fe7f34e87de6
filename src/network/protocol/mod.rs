//! The session link: handshake, ordered attribute writes and liveness.
//!
//! A [`LinkProtocol`] sits between a [`NonBlockingSocket`] and the session. It turns local
//! attribute writes into sequenced `AttributeWrite` messages, resends them until the peer
//! acknowledges, and turns the peer's writes into [`LinkEvent::AttributeChanged`]
//! notifications in the order they were issued.

mod event;
mod state;

pub use event::LinkEvent;
pub use state::LinkState;

use crate::attributes::{format_uuid, Attribute, SERVICE_UUID};
use crate::network::codec;
use crate::network::messages::{Message, MessageBody, MessageHeader};
use crate::report_violation_to;
use crate::rng::{random, Pcg32, RandomValue, Rng, SeedableRng};
use crate::sessions::config::LinkConfig;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{Address, GameError, NonBlockingSocket, Role};
use tracing::{debug, trace};

use std::collections::vec_deque::Drain;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use web_time::{Duration, Instant};

/// A write the peer has not acknowledged yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingWrite {
    seq: u32,
    attribute: Attribute,
    value: i32,
}

/// One end of the session link.
///
/// The host waits for the guest to connect; the guest knows the host address and keeps
/// asking. Both ends then exchange writes until the link drops, after which they go back to
/// discovering with fresh sequence numbers.
///
/// ```
/// use princess_of_fire::network::protocol::{LinkProtocol, LinkState};
/// use princess_of_fire::LinkConfig;
/// use std::net::SocketAddr;
/// use web_time::Instant;
///
/// let host_addr: SocketAddr = "127.0.0.1:7000".parse().unwrap();
/// let mut guest = LinkProtocol::guest(host_addr, LinkConfig::default(), None);
/// guest.start(Instant::now()).unwrap();
/// assert_eq!(guest.state(), LinkState::Discovering);
/// ```
pub struct LinkProtocol<A: Address> {
    role: Role,
    config: LinkConfig,
    send_queue: VecDeque<Message>,
    event_queue: VecDeque<LinkEvent>,

    // state
    state: LinkState,
    closed: bool,
    connect_nonces: BTreeSet<u32>,
    disconnect_notify_sent: bool,
    pending_warning_sent: bool,
    magic: u16,

    // the other end
    host_addr: Option<A>,
    peer_addr: Option<A>,
    remote_magic: u16,

    // ordered writes
    next_send_seq: u32,
    pending_writes: VecDeque<PendingWrite>,
    last_recv_seq: u32,

    // timers
    last_send_time: Instant,
    last_recv_time: Instant,
    last_resend_time: Instant,
    last_connect_attempt: Instant,
    disconnected_at: Instant,

    /// Seeded from `LinkConfig::rng_seed`. When `None`, the thread-local RNG is used.
    rng: Option<Pcg32>,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl<A: Address> std::fmt::Debug for LinkProtocol<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkProtocol")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("peer_addr", &self.peer_addr)
            .field("magic", &self.magic)
            .field("remote_magic", &self.remote_magic)
            .field("next_send_seq", &self.next_send_seq)
            .field("last_recv_seq", &self.last_recv_seq)
            .field("pending_writes", &self.pending_writes.len())
            .finish_non_exhaustive()
    }
}

impl<A: Address> LinkProtocol<A> {
    /// Creates the host end. It accepts the first guest that asks for the session service.
    pub fn host(config: LinkConfig, observer: Option<Arc<dyn ViolationObserver>>) -> Self {
        Self::new(Role::Host, None, config, observer)
    }

    /// Creates the guest end, connecting to `host_addr`.
    pub fn guest(
        host_addr: A,
        config: LinkConfig,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        Self::new(Role::Guest, Some(host_addr), config, observer)
    }

    fn new(
        role: Role,
        host_addr: Option<A>,
        config: LinkConfig,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        let now = Instant::now();
        let mut link = Self {
            role,
            config,
            send_queue: VecDeque::new(),
            event_queue: VecDeque::new(),

            state: LinkState::Initializing,
            closed: false,
            connect_nonces: BTreeSet::new(),
            disconnect_notify_sent: false,
            pending_warning_sent: false,
            magic: 0,

            host_addr,
            peer_addr: None,
            remote_magic: 0,

            next_send_seq: 1,
            pending_writes: VecDeque::new(),
            last_recv_seq: 0,

            last_send_time: now,
            last_recv_time: now,
            last_resend_time: now,
            last_connect_attempt: now,
            disconnected_at: now,

            rng: config.rng_seed.map(Pcg32::seed_from_u64),
            observer,
        };
        link.magic = link.fresh_magic();
        link
    }

    fn gen<T: RandomValue>(&mut self) -> T {
        match &mut self.rng {
            Some(rng) => rng.gen(),
            None => random(),
        }
    }

    fn fresh_magic(&mut self) -> u16 {
        let mut magic: u16 = self.gen();
        while magic == 0 {
            magic = self.gen();
        }
        magic
    }

    /// This end's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// The current link state.
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Returns `true` while attribute writes flow.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// The address of the connected (or, for the guest, targeted) peer.
    #[must_use]
    pub fn peer_addr(&self) -> Option<&A> {
        self.peer_addr.as_ref()
    }

    /// Writes the peer has not acknowledged yet.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.pending_writes.len()
    }

    /// Begins discovering the peer. The guest sends its first connection request right away.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidRequest`] if the link was already started.
    pub fn start(&mut self, now: Instant) -> Result<(), GameError> {
        if self.state != LinkState::Initializing {
            return Err(GameError::InvalidRequest {
                info: format!("link already started, state is {}", self.state),
            });
        }
        self.enter_discovering(now);
        Ok(())
    }

    /// Sends a `Disconnect` to the peer and stops. A closed link never reconnects.
    pub fn disconnect(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.state == LinkState::Connected {
            self.queue_message(MessageBody::Disconnect, now);
            self.drop_link(now);
        } else {
            self.state = LinkState::Disconnected;
            self.disconnected_at = now;
        }
        debug!("{} link closed", self.role);
    }

    /// Queues an ordered write of a local attribute.
    ///
    /// The session checks ownership and domain before calling this.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotConnected`] unless the link is connected.
    pub fn write(&mut self, attribute: Attribute, value: i32, now: Instant) -> Result<(), GameError> {
        if !self.is_connected() {
            return Err(GameError::NotConnected);
        }
        if self.pending_writes.is_empty() {
            self.last_resend_time = now;
        }
        let seq = self.next_send_seq;
        self.next_send_seq = self.next_send_seq.wrapping_add(1);
        let write = PendingWrite {
            seq,
            attribute,
            value,
        };
        self.pending_writes.push_back(write);
        self.send_write(write, now);

        if !self.pending_warning_sent && self.pending_writes.len() > self.config.pending_write_limit
        {
            self.pending_warning_sent = true;
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::NetworkProtocol,
                "{} unacknowledged writes (limit: {}). The peer may not be receiving.",
                self.pending_writes.len(),
                self.config.pending_write_limit
            );
        }
        Ok(())
    }

    /// Runs the link timers and hands out the events raised since the last poll.
    pub fn poll(&mut self, now: Instant) -> Drain<'_, LinkEvent> {
        match self.state {
            LinkState::Discovering => {
                if self.role == Role::Guest
                    && elapsed(self.last_connect_attempt, now) >= self.config.connect_retry_interval
                {
                    self.send_connect_request(now);
                }
            }
            LinkState::Connected => {
                // resend everything unacknowledged
                if !self.pending_writes.is_empty()
                    && elapsed(self.last_resend_time, now) >= self.config.resend_interval
                {
                    self.resend_pending(now);
                }

                // keep the peer's receive timer alive
                if elapsed(self.last_send_time, now) >= self.config.keepalive_interval {
                    self.queue_message(MessageBody::KeepAlive, now);
                }

                let silence = elapsed(self.last_recv_time, now);
                if !self.disconnect_notify_sent && silence >= self.config.disconnect_notify_start {
                    let remaining: Duration = self
                        .config
                        .disconnect_timeout
                        .saturating_sub(self.config.disconnect_notify_start);
                    self.event_queue.push_back(LinkEvent::NetworkInterrupted {
                        disconnect_timeout_ms: remaining.as_millis(),
                    });
                    self.disconnect_notify_sent = true;
                }

                if silence >= self.config.disconnect_timeout {
                    debug!("{} link timed out after {:?} of silence", self.role, silence);
                    self.drop_link(now);
                }
            }
            LinkState::Disconnected => {
                if !self.closed
                    && elapsed(self.disconnected_at, now) >= self.config.connect_retry_interval
                {
                    self.enter_discovering(now);
                }
            }
            LinkState::Initializing => (),
        }
        self.event_queue.drain(..)
    }

    /*
     *  STATE CHANGES
     */

    fn enter_discovering(&mut self, now: Instant) {
        debug!("{} link discovering", self.role);
        self.state = LinkState::Discovering;
        self.magic = self.fresh_magic();
        self.remote_magic = 0;
        self.next_send_seq = 1;
        self.last_recv_seq = 0;
        self.pending_writes.clear();
        self.send_queue.clear();
        self.connect_nonces.clear();
        self.disconnect_notify_sent = false;
        self.pending_warning_sent = false;
        match self.role {
            Role::Host => self.peer_addr = None,
            Role::Guest => {
                self.peer_addr = self.host_addr.clone();
                self.send_connect_request(now);
            }
        }
    }

    fn enter_connected(&mut self, remote_magic: u16, now: Instant) {
        debug!(
            "{} link connected to {:?} (magic {:#06x}, remote {:#06x})",
            self.role, self.peer_addr, self.magic, remote_magic
        );
        self.state = LinkState::Connected;
        self.remote_magic = remote_magic;
        self.connect_nonces.clear();
        self.last_recv_time = now;
        self.disconnect_notify_sent = false;
        self.event_queue.push_back(LinkEvent::Connected);
    }

    fn drop_link(&mut self, now: Instant) {
        self.state = LinkState::Disconnected;
        self.disconnected_at = now;
        self.pending_writes.clear();
        self.event_queue.push_back(LinkEvent::Disconnected);
    }

    /*
     *  SENDING MESSAGES
     */

    /// Sends everything queued to the peer.
    pub fn send_all_messages(&mut self, socket: &mut dyn NonBlockingSocket<A>) {
        if self.send_queue.is_empty() {
            // avoid log spam if there's nothing to send
            return;
        }

        let Some(addr) = &self.peer_addr else {
            trace!(
                "No peer address yet; dropping {} messages",
                self.send_queue.len()
            );
            self.send_queue.clear();
            return;
        };

        trace!("Sending {} messages over socket", self.send_queue.len());
        for msg in self.send_queue.drain(..) {
            socket.send_to(&msg, addr);
        }
    }

    fn send_connect_request(&mut self, now: Instant) {
        let nonce: u32 = self.gen();
        self.connect_nonces.insert(nonce);
        self.last_connect_attempt = now;
        self.queue_message(
            MessageBody::ConnectRequest {
                service: SERVICE_UUID,
                nonce,
            },
            now,
        );
    }

    fn send_write(&mut self, write: PendingWrite, now: Instant) {
        self.queue_message(
            MessageBody::AttributeWrite {
                seq: write.seq,
                attribute: write.attribute.uuid(),
                value: codec::encode_attribute_value(write.value),
            },
            now,
        );
    }

    fn resend_pending(&mut self, now: Instant) {
        trace!("Resending {} unacknowledged writes", self.pending_writes.len());
        self.last_resend_time = now;
        for i in 0..self.pending_writes.len() {
            if let Some(write) = self.pending_writes.get(i).copied() {
                self.send_write(write, now);
            }
        }
    }

    fn queue_message(&mut self, body: MessageBody, now: Instant) {
        trace!("Queuing message to {:?}: {:?}", self.peer_addr, body);

        // set the header
        let header = MessageHeader { magic: self.magic };
        self.last_send_time = now;
        self.send_queue.push_back(Message { header, body });
    }

    /*
     *  RECEIVING MESSAGES
     */

    /// Processes one datagram from `from`.
    pub fn handle_message(&mut self, msg: &Message, from: &A, now: Instant) {
        trace!("Handling message from {:?}: {:?}", from, msg);

        match self.state {
            LinkState::Initializing | LinkState::Disconnected => {
                trace!("Link is {}; ignoring message", self.state);
            }
            LinkState::Discovering => self.handle_discovery(msg, from, now),
            LinkState::Connected => self.handle_connected(msg, from, now),
        }
    }

    fn handle_discovery(&mut self, msg: &Message, from: &A, now: Instant) {
        match (self.role, msg.body) {
            (Role::Host, MessageBody::ConnectRequest { service, nonce }) => {
                if service != SERVICE_UUID {
                    trace!("Connect request for service {}; ignoring", format_uuid(service));
                    return;
                }
                self.accept(msg.header.magic, from, nonce, now);
            }
            (Role::Guest, MessageBody::ConnectReply { service, nonce }) => {
                if self.host_addr.as_ref() != Some(from) || service != SERVICE_UUID {
                    trace!("Connect reply from unexpected sender; ignoring");
                    return;
                }
                if !self.connect_nonces.contains(&nonce) {
                    trace!("Connect reply with unknown nonce {}; ignoring", nonce);
                    return;
                }
                self.enter_connected(msg.header.magic, now);
            }
            _ => trace!("Not connected; ignoring {:?}", msg.body),
        }
    }

    fn accept(&mut self, remote_magic: u16, from: &A, nonce: u32, now: Instant) {
        self.peer_addr = Some(from.clone());
        self.queue_message(
            MessageBody::ConnectReply {
                service: SERVICE_UUID,
                nonce,
            },
            now,
        );
        self.enter_connected(remote_magic, now);
    }

    fn handle_connected(&mut self, msg: &Message, from: &A, now: Instant) {
        if self.peer_addr.as_ref() != Some(from) {
            trace!("Message from {:?} is not from the peer; ignoring", from);
            return;
        }

        // the guest asks again when our reply was lost, or when it restarted its link
        if let MessageBody::ConnectRequest { service, nonce } = msg.body {
            if self.role == Role::Host && service == SERVICE_UUID {
                if msg.header.magic == self.remote_magic {
                    self.queue_message(MessageBody::ConnectReply { service, nonce }, now);
                } else {
                    debug!("Guest restarted its link; reconnecting");
                    self.drop_link(now);
                    self.enter_discovering(now);
                    self.accept(msg.header.magic, from, nonce, now);
                }
            }
            return;
        }

        // filter packets that don't match the magic
        if msg.header.magic != self.remote_magic {
            trace!("Received message with wrong magic; ignoring");
            return;
        }

        // update time when we last received packages
        self.last_recv_time = now;

        // if the connection has been marked as interrupted, send an event to signal we are receiving again
        if self.disconnect_notify_sent {
            trace!("Received message on interrupted link; sending NetworkResumed event");
            self.disconnect_notify_sent = false;
            self.event_queue.push_back(LinkEvent::NetworkResumed);
        }

        match msg.body {
            MessageBody::AttributeWrite {
                seq,
                attribute,
                value,
            } => self.on_attribute_write(seq, attribute, value, now),
            MessageBody::AttributeAck { ack_seq } => self.on_attribute_ack(ack_seq),
            MessageBody::Disconnect => {
                debug!("{} link: peer disconnected", self.role);
                self.drop_link(now);
            }
            MessageBody::KeepAlive
            | MessageBody::ConnectReply { .. }
            | MessageBody::ConnectRequest { .. } => (),
        }
    }

    fn on_attribute_write(&mut self, seq: u32, uuid: u128, value: [u8; 4], now: Instant) {
        let expected = self.last_recv_seq.wrapping_add(1);
        if seq != expected {
            if seq <= self.last_recv_seq {
                // duplicate; the ack was probably lost
                self.queue_message(
                    MessageBody::AttributeAck {
                        ack_seq: self.last_recv_seq,
                    },
                    now,
                );
            } else {
                trace!("Write {} arrived before {}; dropping", seq, expected);
            }
            return;
        }

        let Some(attribute) = Attribute::from_uuid(uuid) else {
            self.accept_write(seq, now);
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::NetworkProtocol,
                "Write {} targets unknown attribute {}",
                seq,
                format_uuid(uuid)
            );
            return;
        };
        match codec::decode_attribute_value(&value) {
            Ok(value) => {
                if self.push_notification(attribute, value) {
                    self.accept_write(seq, now);
                } else {
                    // unacknowledged, so the peer resends it once the session drains the queue
                    debug!(
                        "Notification queue full ({}); holding back write {} to {}",
                        self.config.notification_queue_limit, seq, attribute
                    );
                }
            }
            Err(e) => {
                self.accept_write(seq, now);
                report_violation_to!(
                    &self.observer,
                    ViolationSeverity::Warning,
                    ViolationKind::NetworkProtocol,
                    "Write {} to {} has an undecodable value: {}",
                    seq,
                    attribute,
                    e
                );
            }
        }
    }

    fn accept_write(&mut self, seq: u32, now: Instant) {
        self.last_recv_seq = seq;
        self.queue_message(MessageBody::AttributeAck { ack_seq: seq }, now);
    }

    fn on_attribute_ack(&mut self, ack_seq: u32) {
        while let Some(write) = self.pending_writes.front() {
            if write.seq > ack_seq {
                break;
            }
            self.pending_writes.pop_front();
        }
        if self.pending_writes.len() <= self.config.pending_write_limit {
            self.pending_warning_sent = false;
        }
    }

    /// Queues a notification, or returns `false` when the queue is full and the value cannot
    /// replace an older one of the same attribute.
    fn push_notification(&mut self, attribute: Attribute, value: i32) -> bool {
        let queued = self
            .event_queue
            .iter()
            .filter(|event| event.attribute().is_some())
            .count();
        if queued >= self.config.notification_queue_limit {
            if !attribute.is_mergeable() {
                return false;
            }
            let Some(index) = self
                .event_queue
                .iter()
                .position(|event| event.attribute() == Some(attribute))
            else {
                return false;
            };
            // only the newest position or power-up flag matters
            self.event_queue.remove(index);
        }
        self.event_queue
            .push_back(LinkEvent::AttributeChanged { attribute, value });
        true
    }
}

fn elapsed(since: Instant, now: Instant) -> Duration {
    now.saturating_duration_since(since)
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
    use crate::telemetry::CollectingObserver;
    use std::net::SocketAddr;

    fn host_addr() -> SocketAddr {
        "127.0.0.1:7000".parse().unwrap()
    }

    fn guest_addr() -> SocketAddr {
        "127.0.0.1:7001".parse().unwrap()
    }

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    fn deliver(
        from: &mut LinkProtocol<SocketAddr>,
        from_addr: SocketAddr,
        to: &mut LinkProtocol<SocketAddr>,
        now: Instant,
    ) -> usize {
        let messages: Vec<Message> = from.send_queue.drain(..).collect();
        for msg in &messages {
            to.handle_message(msg, &from_addr, now);
        }
        messages.len()
    }

    fn events(link: &mut LinkProtocol<SocketAddr>, now: Instant) -> Vec<LinkEvent> {
        link.poll(now).collect()
    }

    fn connected_pair(
        now: Instant,
    ) -> (LinkProtocol<SocketAddr>, LinkProtocol<SocketAddr>) {
        connected_pair_with(LinkConfig::deterministic(1), LinkConfig::deterministic(2), now)
    }

    fn connected_pair_with(
        host_config: LinkConfig,
        guest_config: LinkConfig,
        now: Instant,
    ) -> (LinkProtocol<SocketAddr>, LinkProtocol<SocketAddr>) {
        let mut host = LinkProtocol::host(host_config, None);
        let mut guest = LinkProtocol::guest(host_addr(), guest_config, None);
        host.start(now).unwrap();
        guest.start(now).unwrap();
        deliver(&mut guest, guest_addr(), &mut host, now);
        deliver(&mut host, host_addr(), &mut guest, now);
        assert_eq!(events(&mut host, now), vec![LinkEvent::Connected]);
        assert_eq!(events(&mut guest, now), vec![LinkEvent::Connected]);
        (host, guest)
    }

    #[test]
    fn new_link_starts_initializing() {
        let link = LinkProtocol::<SocketAddr>::host(LinkConfig::default(), None);
        assert_eq!(link.state(), LinkState::Initializing);
        assert_eq!(link.role(), Role::Host);
        assert!(link.peer_addr().is_none());
        assert_ne!(link.magic, 0);
    }

    #[test]
    fn start_twice_is_rejected() {
        let now = Instant::now();
        let mut link = LinkProtocol::<SocketAddr>::host(LinkConfig::default(), None);
        link.start(now).unwrap();
        assert!(matches!(
            link.start(now),
            Err(GameError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn guest_asks_immediately_and_retries() {
        let now = Instant::now();
        let mut guest = LinkProtocol::guest(host_addr(), LinkConfig::default(), None);
        guest.start(now).unwrap();
        assert_eq!(guest.send_queue.len(), 1);
        assert!(guest.send_queue[0].is_connect_request());

        guest.poll(ms(now, 2999)).for_each(drop);
        assert_eq!(guest.send_queue.len(), 1);
        guest.poll(ms(now, 3000)).for_each(drop);
        assert_eq!(guest.send_queue.len(), 2);
    }

    #[test]
    fn handshake_connects_both_ends() {
        let now = Instant::now();
        let (host, guest) = connected_pair(now);
        assert!(host.is_connected());
        assert!(guest.is_connected());
        assert_eq!(host.peer_addr(), Some(&guest_addr()));
        assert_eq!(host.remote_magic, guest.magic);
        assert_eq!(guest.remote_magic, host.magic);
    }

    #[test]
    fn host_ignores_other_services() {
        let now = Instant::now();
        let mut host = LinkProtocol::<SocketAddr>::host(LinkConfig::default(), None);
        host.start(now).unwrap();
        let msg = Message {
            header: MessageHeader { magic: 5 },
            body: MessageBody::ConnectRequest {
                service: 0x1234,
                nonce: 1,
            },
        };
        host.handle_message(&msg, &guest_addr(), now);
        assert_eq!(host.state(), LinkState::Discovering);
        assert!(host.send_queue.is_empty());
    }

    #[test]
    fn guest_ignores_reply_with_unknown_nonce() {
        let now = Instant::now();
        let mut guest = LinkProtocol::guest(host_addr(), LinkConfig::default(), None);
        guest.start(now).unwrap();
        let nonce = *guest.connect_nonces.iter().next().unwrap();
        let msg = Message {
            header: MessageHeader { magic: 5 },
            body: MessageBody::ConnectReply {
                service: SERVICE_UUID,
                nonce: nonce.wrapping_add(1),
            },
        };
        guest.handle_message(&msg, &host_addr(), now);
        assert_eq!(guest.state(), LinkState::Discovering);
    }

    #[test]
    fn write_requires_connection() {
        let now = Instant::now();
        let mut host = LinkProtocol::<SocketAddr>::host(LinkConfig::default(), None);
        host.start(now).unwrap();
        assert_eq!(
            host.write(Attribute::HostX, 5, now),
            Err(GameError::NotConnected)
        );
    }

    #[test]
    fn writes_arrive_in_order_and_are_acknowledged() {
        let now = Instant::now();
        let (mut host, mut guest) = connected_pair(now);
        host.write(Attribute::HostX, 11, now).unwrap();
        host.write(Attribute::HostY, 22, now).unwrap();
        host.write(Attribute::HostX, 12, now).unwrap();
        assert_eq!(host.pending_writes(), 3);

        deliver(&mut host, host_addr(), &mut guest, now);
        assert_eq!(
            events(&mut guest, now),
            vec![
                LinkEvent::AttributeChanged {
                    attribute: Attribute::HostX,
                    value: 11
                },
                LinkEvent::AttributeChanged {
                    attribute: Attribute::HostY,
                    value: 22
                },
                LinkEvent::AttributeChanged {
                    attribute: Attribute::HostX,
                    value: 12
                },
            ]
        );

        deliver(&mut guest, guest_addr(), &mut host, now);
        assert_eq!(host.pending_writes(), 0);
    }

    #[test]
    fn duplicate_write_is_acknowledged_but_not_delivered_twice() {
        let now = Instant::now();
        let (mut host, mut guest) = connected_pair(now);
        host.write(Attribute::HostX, 11, now).unwrap();
        let write = host.send_queue.pop_back().unwrap();

        guest.handle_message(&write, &host_addr(), now);
        guest.handle_message(&write, &host_addr(), now);
        assert_eq!(events(&mut guest, now).len(), 1);
        assert_eq!(guest.send_queue.len(), 2);
        assert!(guest
            .send_queue
            .iter()
            .all(|msg| msg.body == MessageBody::AttributeAck { ack_seq: 1 }));
    }

    #[test]
    fn gap_is_dropped_and_resend_restores_order() {
        let now = Instant::now();
        let (mut host, mut guest) = connected_pair(now);
        host.write(Attribute::HostX, 1, now).unwrap();
        host.write(Attribute::HostX, 2, now).unwrap();
        let second = host.send_queue.pop_back().unwrap();
        host.send_queue.clear();

        guest.handle_message(&second, &host_addr(), now);
        assert!(events(&mut guest, now).is_empty());

        let later = ms(now, 200);
        host.poll(later).for_each(drop);
        deliver(&mut host, host_addr(), &mut guest, later);
        let values: Vec<i32> = events(&mut guest, later)
            .into_iter()
            .filter_map(|event| match event {
                LinkEvent::AttributeChanged { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn unknown_attribute_is_reported_and_skipped() {
        let now = Instant::now();
        let observer = Arc::new(CollectingObserver::new());
        let mut host = LinkProtocol::host(LinkConfig::deterministic(1), None);
        let mut guest =
            LinkProtocol::guest(host_addr(), LinkConfig::deterministic(2), Some(observer.clone()));
        host.start(now).unwrap();
        guest.start(now).unwrap();
        deliver(&mut guest, guest_addr(), &mut host, now);
        deliver(&mut host, host_addr(), &mut guest, now);
        events(&mut guest, now);

        let bogus = Message {
            header: MessageHeader { magic: host.magic },
            body: MessageBody::AttributeWrite {
                seq: 1,
                attribute: 0xdead_beef,
                value: [1, 0, 0, 0],
            },
        };
        guest.handle_message(&bogus, &host_addr(), now);
        assert!(events(&mut guest, now).is_empty());
        assert!(observer.has_violation(ViolationKind::NetworkProtocol));

        // the sequence still advanced
        host.next_send_seq = 2;
        host.write(Attribute::HostY, 7, now).unwrap();
        deliver(&mut host, host_addr(), &mut guest, now);
        assert_eq!(
            events(&mut guest, now),
            vec![LinkEvent::AttributeChanged {
                attribute: Attribute::HostY,
                value: 7
            }]
        );
    }

    #[test]
    fn wrong_magic_and_strangers_are_ignored() {
        let now = Instant::now();
        let (host, mut guest) = connected_pair(now);
        let forged = Message {
            header: MessageHeader {
                magic: host.magic.wrapping_add(1),
            },
            body: MessageBody::Disconnect,
        };
        guest.handle_message(&forged, &host_addr(), now);
        assert!(guest.is_connected());

        let stranger: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let genuine = Message {
            header: MessageHeader { magic: host.magic },
            body: MessageBody::Disconnect,
        };
        guest.handle_message(&genuine, &stranger, now);
        assert!(guest.is_connected());

        guest.handle_message(&genuine, &host_addr(), now);
        assert_eq!(guest.state(), LinkState::Disconnected);
        assert_eq!(events(&mut guest, now), vec![LinkEvent::Disconnected]);
    }

    #[test]
    fn silence_interrupts_then_resumes() {
        let now = Instant::now();
        let (mut host, mut guest) = connected_pair(now);
        let quiet = ms(now, 500);
        assert_eq!(
            events(&mut guest, quiet),
            vec![LinkEvent::NetworkInterrupted {
                disconnect_timeout_ms: 1500
            }]
        );

        host.poll(quiet).for_each(drop);
        deliver(&mut host, host_addr(), &mut guest, quiet);
        assert_eq!(events(&mut guest, quiet), vec![LinkEvent::NetworkResumed]);
    }

    #[test]
    fn timeout_drops_and_retry_rediscovers() {
        let now = Instant::now();
        let (_host, mut guest) = connected_pair(now);
        let old_magic = guest.magic;
        let evs = events(&mut guest, ms(now, 2000));
        assert!(evs.contains(&LinkEvent::Disconnected));
        assert_eq!(guest.state(), LinkState::Disconnected);

        events(&mut guest, ms(now, 4999));
        assert_eq!(guest.state(), LinkState::Disconnected);
        events(&mut guest, ms(now, 5000));
        assert_eq!(guest.state(), LinkState::Discovering);
        assert_ne!(guest.magic, old_magic);
        assert_eq!(guest.next_send_seq, 1);
        assert!(guest
            .send_queue
            .back()
            .is_some_and(Message::is_connect_request));
    }

    #[test]
    fn keepalive_fills_send_silence() {
        let now = Instant::now();
        let (mut host, _guest) = connected_pair(now);
        host.send_queue.clear();
        host.poll(ms(now, 199)).for_each(drop);
        assert!(host.send_queue.is_empty());
        host.poll(ms(now, 200)).for_each(drop);
        assert_eq!(host.send_queue.len(), 1);
        assert_eq!(host.send_queue[0].body, MessageBody::KeepAlive);
    }

    fn changed(events: &[LinkEvent], attribute: Attribute) -> Vec<i32> {
        events
            .iter()
            .filter_map(|event| match *event {
                LinkEvent::AttributeChanged {
                    attribute: seen,
                    value,
                } if seen == attribute => Some(value),
                _ => None,
            })
            .collect()
    }

    fn small_queue(limit: usize, seed: u64) -> LinkConfig {
        LinkConfig {
            notification_queue_limit: limit,
            ..LinkConfig::deterministic(seed)
        }
    }

    #[test]
    fn full_queue_replaces_older_position() {
        let mut guest = LinkProtocol::<SocketAddr>::guest(host_addr(), small_queue(2, 3), None);
        assert!(guest.push_notification(Attribute::HostX, 1));
        assert!(guest.push_notification(Attribute::HostY, 2));
        assert!(guest.push_notification(Attribute::HostX, 3));
        assert_eq!(
            guest.event_queue.iter().copied().collect::<Vec<_>>(),
            vec![
                LinkEvent::AttributeChanged {
                    attribute: Attribute::HostY,
                    value: 2
                },
                LinkEvent::AttributeChanged {
                    attribute: Attribute::HostX,
                    value: 3
                },
            ]
        );
    }

    #[test]
    fn full_queue_never_drops_queued_notifications() {
        let mut guest = LinkProtocol::<SocketAddr>::guest(host_addr(), small_queue(1, 3), None);
        assert!(guest.push_notification(Attribute::HostX, 1));
        assert!(!guest.push_notification(Attribute::GamePhase, 3));
        assert!(!guest.push_notification(Attribute::HostY, 4));
        assert_eq!(guest.event_queue.len(), 1);
        assert_eq!(changed(guest.event_queue.make_contiguous(), Attribute::HostX), vec![1]);
    }

    #[test]
    fn full_queue_holds_back_every_phase_until_drained() {
        let now = Instant::now();
        let (mut host, mut guest) =
            connected_pair_with(LinkConfig::deterministic(1), small_queue(4, 2), now);
        host.write(Attribute::GamePhase, 3, now).unwrap();
        host.write(Attribute::HostX, 5, now).unwrap();
        host.write(Attribute::HostY, 6, now).unwrap();
        host.write(Attribute::EndCause, 1, now).unwrap();
        host.write(Attribute::GamePhase, 4, now).unwrap();

        deliver(&mut host, host_addr(), &mut guest, now);
        deliver(&mut guest, guest_addr(), &mut host, now);
        assert_eq!(host.pending_writes(), 1);

        let mut delivered = events(&mut guest, now);
        let later = ms(now, host.config.resend_interval.as_millis() as u64);
        host.poll(later).for_each(drop);
        deliver(&mut host, host_addr(), &mut guest, later);
        delivered.extend(events(&mut guest, later));
        deliver(&mut guest, guest_addr(), &mut host, later);

        assert_eq!(changed(&delivered, Attribute::GamePhase), vec![3, 4]);
        assert_eq!(changed(&delivered, Attribute::EndCause), vec![1]);
        assert_eq!(host.pending_writes(), 0);
    }

    #[test]
    fn full_queue_keeps_every_phase_request() {
        let now = Instant::now();
        let (mut host, mut guest) =
            connected_pair_with(small_queue(2, 1), LinkConfig::deterministic(2), now);
        guest.write(Attribute::PhaseRequest, 2, now).unwrap();
        guest.write(Attribute::GuestX, 40, now).unwrap();
        guest.write(Attribute::PhaseRequest, 1, now).unwrap();

        deliver(&mut guest, guest_addr(), &mut host, now);
        let mut delivered = events(&mut host, now);
        let later = ms(now, guest.config.resend_interval.as_millis() as u64);
        deliver(&mut host, host_addr(), &mut guest, now);
        guest.poll(later).for_each(drop);
        deliver(&mut guest, guest_addr(), &mut host, later);
        delivered.extend(events(&mut host, later));

        assert_eq!(changed(&delivered, Attribute::PhaseRequest), vec![2, 1]);
        assert_eq!(changed(&delivered, Attribute::GuestX), vec![40]);
    }

    #[test]
    fn local_disconnect_sends_and_stays_closed() {
        let now = Instant::now();
        let (mut host, mut guest) = connected_pair(now);
        guest.disconnect(now);
        assert_eq!(events(&mut guest, now), vec![LinkEvent::Disconnected]);
        deliver(&mut guest, guest_addr(), &mut host, now);
        assert_eq!(host.state(), LinkState::Disconnected);

        events(&mut guest, ms(now, 60_000));
        assert_eq!(guest.state(), LinkState::Disconnected);
    }

    #[test]
    fn host_reaccepts_restarted_guest() {
        let now = Instant::now();
        let (mut host, _guest) = connected_pair(now);
        let mut fresh = LinkProtocol::guest(host_addr(), LinkConfig::deterministic(99), None);
        fresh.start(now).unwrap();
        deliver(&mut fresh, guest_addr(), &mut host, now);
        assert_eq!(
            events(&mut host, now),
            vec![LinkEvent::Disconnected, LinkEvent::Connected]
        );
        assert_eq!(host.remote_magic, fresh.magic);
    }

    #[test]
    fn same_seed_same_magic() {
        let a = LinkProtocol::<SocketAddr>::host(LinkConfig::deterministic(42), None);
        let b = LinkProtocol::<SocketAddr>::host(LinkConfig::deterministic(42), None);
        assert_eq!(a.magic, b.magic);
    }
}
