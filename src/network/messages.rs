use serde::{Deserialize, Serialize};

use crate::attributes::format_uuid;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub(crate) struct MessageHeader {
    pub magic: u16,
}

#[derive(Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum MessageBody {
    /// Sent by the guest until the host answers. `nonce` is echoed back in the reply.
    ConnectRequest { service: u128, nonce: u32 },
    ConnectReply { service: u128, nonce: u32 },
    /// One ordered attribute update. `value` is the canonical little-endian `i32`.
    AttributeWrite {
        seq: u32,
        attribute: u128,
        value: [u8; 4],
    },
    AttributeAck { ack_seq: u32 },
    KeepAlive,
    Disconnect,
}

impl std::fmt::Debug for MessageBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectRequest { service, nonce } => f
                .debug_struct("ConnectRequest")
                .field("service", &UuidDebug(*service))
                .field("nonce", nonce)
                .finish(),
            Self::ConnectReply { service, nonce } => f
                .debug_struct("ConnectReply")
                .field("service", &UuidDebug(*service))
                .field("nonce", nonce)
                .finish(),
            Self::AttributeWrite {
                seq,
                attribute,
                value,
            } => f
                .debug_struct("AttributeWrite")
                .field("seq", seq)
                .field("attribute", &UuidDebug(*attribute))
                .field("value", &BytesDebug(value))
                .finish(),
            Self::AttributeAck { ack_seq } => f
                .debug_struct("AttributeAck")
                .field("ack_seq", ack_seq)
                .finish(),
            Self::KeepAlive => f.write_str("KeepAlive"),
            Self::Disconnect => f.write_str("Disconnect"),
        }
    }
}

struct UuidDebug(u128);

impl std::fmt::Debug for UuidDebug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_uuid(self.0))
    }
}

struct BytesDebug<'a>(&'a [u8]);

impl std::fmt::Debug for BytesDebug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("0x")?;
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A datagram that a [`NonBlockingSocket`] sends and receives. When implementing [`NonBlockingSocket`],
/// you should deserialize received datagrams into this `Message` type and pass them on.
///
/// [`NonBlockingSocket`]: crate::NonBlockingSocket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub(crate) header: MessageHeader,
    pub(crate) body: MessageBody,
}

impl Message {
    /// Returns `true` if this is a connection request for any service.
    ///
    /// Transports that share a port between sessions can use this to route new peers.
    #[must_use]
    pub fn is_connect_request(&self) -> bool {
        matches!(self.body, MessageBody::ConnectRequest { .. })
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
    use crate::attributes::SERVICE_UUID;

    #[test]
    fn test_message_header_default() {
        let header = MessageHeader::default();
        assert_eq!(header.magic, 0);
    }

    #[test]
    fn test_attribute_write_debug_is_readable() {
        let body = MessageBody::AttributeWrite {
            seq: 3,
            attribute: 0x563c_64b2_9634_4f7a_9f4f_d9e3_231f_aa56,
            value: [0x0a, 0, 0, 0],
        };
        let debug = format!("{:?}", body);
        assert!(debug.contains("AttributeWrite"));
        assert!(debug.contains("563c64b2-9634-4f7a-9f4f-d9e3231faa56"));
        assert!(debug.contains("0x0a000000"));
    }

    #[test]
    fn test_connect_request_detection() {
        let request = Message {
            header: MessageHeader::default(),
            body: MessageBody::ConnectRequest {
                service: SERVICE_UUID,
                nonce: 9,
            },
        };
        assert!(request.is_connect_request());

        let keepalive = Message {
            header: MessageHeader { magic: 4 },
            body: MessageBody::KeepAlive,
        };
        assert!(!keepalive.is_connect_request());
        assert_eq!(format!("{:?}", keepalive.body), "KeepAlive");
    }

    #[test]
    fn test_message_serialization() {
        use crate::network::codec;

        let msg = Message {
            header: MessageHeader { magic: 0xABCD },
            body: MessageBody::ConnectReply {
                service: SERVICE_UUID,
                nonce: 999,
            },
        };

        let serialized = codec::encode(&msg).expect("serialization should succeed");
        let (deserialized, _): (Message, _) =
            codec::decode(&serialized).expect("deserialization should succeed");
        assert_eq!(msg, deserialized);
    }
}
