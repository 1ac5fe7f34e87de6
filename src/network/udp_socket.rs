//! UDP transport for desktop builds, where a datagram socket stands in for the radio.

use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use crate::network::codec;
use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{network::messages::Message, NonBlockingSocket};

/// Largest datagram read in one `recv_from`. Anything longer is truncated and fails to decode.
const MAX_DATAGRAM: usize = 512;
/// Encoded link messages are a few dozen bytes.
const MAX_ENCODED: usize = 128;

/// Non-blocking UDP socket speaking the link message format.
#[derive(Debug)]
pub struct UdpNonBlockingSocket {
    socket: UdpSocket,
    inbound: [u8; MAX_DATAGRAM],
    outbound: [u8; MAX_ENCODED],
}

impl UdpNonBlockingSocket {
    /// Binds every IPv4 interface on `port`. Port `0` picks a free one.
    pub fn bind_to_port(port: u16) -> io::Result<Self> {
        Self::bind_to((Ipv4Addr::UNSPECIFIED, port).into())
    }

    /// Binds `addr`.
    pub fn bind_to(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        tracing::debug!(%addr, "udp link socket bound");
        Ok(Self {
            socket,
            inbound: [0; MAX_DATAGRAM],
            outbound: [0; MAX_ENCODED],
        })
    }

    /// The bound address, with the port the OS picked.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn decode_datagram(&self, len: usize, from: SocketAddr) -> Option<Message> {
        let bytes = self.inbound.get(..len)?;
        codec::decode_value(bytes)
            .map_err(|e| {
                report_violation!(
                    ViolationSeverity::Warning,
                    ViolationKind::NetworkProtocol,
                    "dropping {len} byte datagram from {from}: {e}"
                );
            })
            .ok()
    }
}

impl NonBlockingSocket<SocketAddr> for UdpNonBlockingSocket {
    fn send_to(&mut self, msg: &Message, addr: &SocketAddr) {
        let encoded = codec::encode_into(msg, &mut self.outbound)
            .map_err(|e| e.to_string())
            .and_then(|len| {
                self.outbound
                    .get(..len)
                    .ok_or_else(|| format!("encoded length {len} exceeds {MAX_ENCODED}"))
            });
        match encoded {
            // a failed send is one more lost datagram
            Ok(bytes) => {
                if let Err(e) = self.socket.send_to(bytes, addr) {
                    tracing::debug!(%addr, error = %e, "udp send failed");
                }
            }
            Err(reason) => report_violation!(
                ViolationSeverity::Error,
                ViolationKind::InternalError,
                "cannot encode {:?} for {addr}: {reason}",
                msg.body
            ),
        }
    }

    fn receive_all_messages(&mut self) -> Vec<(SocketAddr, Message)> {
        let mut received = Vec::new();
        loop {
            match self.socket.recv_from(&mut self.inbound) {
                Ok((len, from)) => {
                    if let Some(msg) = self.decode_datagram(len, from) {
                        received.push((from, msg));
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                // reported on some platforms after sending to a closed port
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {}
                Err(e) => {
                    report_violation!(
                        ViolationSeverity::Error,
                        ViolationKind::NetworkProtocol,
                        "udp receive failed ({:?}): {e}",
                        e.kind()
                    );
                    break;
                }
            }
        }
        received
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
#[cfg(not(miri))]
mod tests {
    use super::*;
    use crate::attributes::{Attribute, SERVICE_UUID};
    use crate::network::codec::encode_attribute_value;
    use crate::network::messages::{MessageBody, MessageHeader};
    use std::thread;
    use std::time::Duration;

    fn bound() -> (UdpNonBlockingSocket, SocketAddr) {
        let socket = UdpNonBlockingSocket::bind_to_port(0).unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, (Ipv4Addr::LOCALHOST, port).into())
    }

    fn drain(socket: &mut UdpNonBlockingSocket, want: usize) -> Vec<(SocketAddr, Message)> {
        let mut all = Vec::new();
        for _ in 0..40 {
            all.extend(socket.receive_all_messages());
            if all.len() >= want {
                break;
            }
            thread::sleep(Duration::from_millis(25));
        }
        all
    }

    fn message(body: MessageBody) -> Message {
        Message {
            header: MessageHeader { magic: 0x0bad },
            body,
        }
    }

    #[test]
    fn empty_socket_returns_immediately() {
        let (mut socket, addr) = bound();
        assert!(socket.receive_all_messages().is_empty());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn handshake_and_write_cross_loopback() {
        let (mut host, host_addr) = bound();
        let (mut guest, guest_addr) = bound();

        let request = message(MessageBody::ConnectRequest {
            service: SERVICE_UUID,
            nonce: 42,
        });
        let write = message(MessageBody::AttributeWrite {
            seq: 1,
            attribute: Attribute::GuestY.uuid(),
            value: encode_attribute_value(-7),
        });
        guest.send_to(&request, &host_addr);
        guest.send_to(&write, &host_addr);

        let received = drain(&mut host, 2);
        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|(from, _)| from.port() == guest_addr.port()));
        assert!(received.iter().any(|(_, msg)| *msg == request));
        assert!(received.iter().any(|(_, msg)| *msg == write));
    }

    #[test]
    fn undecodable_datagrams_are_skipped() {
        let (mut socket, addr) = bound();
        let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
        raw.send_to(&[0xff, 0xff, 0xff], addr).unwrap();
        let (mut sender, _) = bound();
        let keepalive = message(MessageBody::KeepAlive);
        sender.send_to(&keepalive, &addr);

        let received = drain(&mut socket, 1);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].1, keepalive);
    }

    #[test]
    fn sending_to_port_zero_is_a_silent_loss() {
        let (mut socket, _) = bound();
        socket.send_to(
            &message(MessageBody::Disconnect),
            &(Ipv4Addr::UNSPECIFIED, 0).into(),
        );
    }
}
