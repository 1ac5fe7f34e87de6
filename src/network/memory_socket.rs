//! An in-process datagram network for tests, demos and benches.
//!
//! A [`MemoryNetwork`] is a shared mailbox per [`MemoryAddr`]. Sockets created from the same
//! network deliver to each other instantly and in order, until the link is cut with
//! [`MemoryNetwork::set_link_up`].
//!
//! ```
//! use princess_of_fire::{MemoryAddr, MemoryNetwork};
//!
//! let network = MemoryNetwork::new();
//! let host = network.socket(1);
//! let guest = network.socket(2);
//! assert_eq!(host.local_addr(), MemoryAddr(1));
//! assert_eq!(guest.local_addr(), MemoryAddr(2));
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::network::messages::Message;
use crate::NonBlockingSocket;

/// Address of a [`MemorySocket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryAddr(pub u32);

impl fmt::Display for MemoryAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem:{}", self.0)
    }
}

#[derive(Debug)]
struct Mailboxes {
    inboxes: BTreeMap<MemoryAddr, VecDeque<(MemoryAddr, Message)>>,
    link_up: bool,
    dropped: u64,
}

/// A shared in-process network. Clones refer to the same network.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    mailboxes: Arc<Mutex<Mailboxes>>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    /// Creates an empty network with the link up.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mailboxes: Arc::new(Mutex::new(Mailboxes {
                inboxes: BTreeMap::new(),
                link_up: true,
                dropped: 0,
            })),
        }
    }

    /// Creates a socket bound to `MemoryAddr(addr)`. Binding an address twice shares its inbox.
    #[must_use]
    pub fn socket(&self, addr: u32) -> MemorySocket {
        let addr = MemoryAddr(addr);
        self.mailboxes.lock().inboxes.entry(addr).or_default();
        MemorySocket {
            addr,
            mailboxes: Arc::clone(&self.mailboxes),
        }
    }

    /// Cuts or restores the link. While down, every datagram is dropped.
    pub fn set_link_up(&self, up: bool) {
        self.mailboxes.lock().link_up = up;
    }

    /// Returns `true` unless the link was cut.
    #[must_use]
    pub fn is_link_up(&self) -> bool {
        self.mailboxes.lock().link_up
    }

    /// Datagrams waiting in any inbox.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.mailboxes
            .lock()
            .inboxes
            .values()
            .map(VecDeque::len)
            .sum()
    }

    /// Datagrams dropped because the link was down or nobody was bound to the destination.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.mailboxes.lock().dropped
    }
}

/// One endpoint of a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemorySocket {
    addr: MemoryAddr,
    mailboxes: Arc<Mutex<Mailboxes>>,
}

impl MemorySocket {
    /// The address this socket receives on.
    #[must_use]
    pub const fn local_addr(&self) -> MemoryAddr {
        self.addr
    }
}

impl NonBlockingSocket<MemoryAddr> for MemorySocket {
    fn send_to(&mut self, msg: &Message, addr: &MemoryAddr) {
        let mut mailboxes = self.mailboxes.lock();
        if !mailboxes.link_up {
            mailboxes.dropped += 1;
            return;
        }
        match mailboxes.inboxes.get_mut(addr) {
            Some(inbox) => inbox.push_back((self.addr, msg.clone())),
            None => {
                trace!("No socket bound to {}; dropping datagram", addr);
                mailboxes.dropped += 1;
            }
        }
    }

    fn receive_all_messages(&mut self) -> Vec<(MemoryAddr, Message)> {
        let mut mailboxes = self.mailboxes.lock();
        let link_up = mailboxes.link_up;
        let Some(inbox) = mailboxes.inboxes.get_mut(&self.addr) else {
            return Vec::new();
        };
        let received: Vec<_> = inbox.drain(..).collect();
        if link_up {
            received
        } else {
            mailboxes.dropped += received.len() as u64;
            Vec::new()
        }
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
    use crate::network::messages::{MessageBody, MessageHeader};

    fn msg(magic: u16) -> Message {
        Message {
            header: MessageHeader { magic },
            body: MessageBody::KeepAlive,
        }
    }

    #[test]
    fn delivers_in_order_with_sender_address() {
        let network = MemoryNetwork::new();
        let mut a = network.socket(1);
        let mut b = network.socket(2);
        a.send_to(&msg(1), &MemoryAddr(2));
        a.send_to(&msg(2), &MemoryAddr(2));
        assert_eq!(network.in_flight(), 2);

        let received = b.receive_all_messages();
        assert_eq!(received, vec![(MemoryAddr(1), msg(1)), (MemoryAddr(1), msg(2))]);
        assert!(b.receive_all_messages().is_empty());
        assert!(a.receive_all_messages().is_empty());
    }

    #[test]
    fn cut_link_drops_traffic() {
        let network = MemoryNetwork::new();
        let mut a = network.socket(1);
        let mut b = network.socket(2);
        a.send_to(&msg(1), &MemoryAddr(2));
        network.set_link_up(false);
        a.send_to(&msg(2), &MemoryAddr(2));
        assert!(b.receive_all_messages().is_empty());
        assert_eq!(network.dropped(), 2);

        network.set_link_up(true);
        assert!(network.is_link_up());
        a.send_to(&msg(3), &MemoryAddr(2));
        assert_eq!(b.receive_all_messages().len(), 1);
    }

    #[test]
    fn unbound_destination_is_dropped() {
        let network = MemoryNetwork::new();
        let mut a = network.socket(1);
        a.send_to(&msg(1), &MemoryAddr(42));
        assert_eq!(network.dropped(), 1);
        assert_eq!(MemoryAddr(42).to_string(), "mem:42");
    }
}
