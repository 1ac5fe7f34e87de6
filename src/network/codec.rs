//! Binary codec for link messages and attribute values.
//!
//! Two encodings live here:
//!
//! - **Datagrams**: whole [`Message`](crate::Message) values are serialized with bincode,
//!   using a single fixed-width little-endian configuration so both devices agree on every
//!   byte.
//! - **Attribute values**: every shared attribute travels as the canonical 4-byte
//!   little-endian two's-complement `i32`. Anything that is not exactly four bytes is
//!   rejected.
//!
//! # Examples
//!
//! ```
//! use princess_of_fire::network::codec::{decode_attribute_value, encode_attribute_value};
//!
//! let bytes = encode_attribute_value(-2);
//! assert_eq!(bytes, [0xfe, 0xff, 0xff, 0xff]);
//! assert_eq!(decode_attribute_value(&bytes).unwrap(), -2);
//! assert!(decode_attribute_value(b"12").is_err());
//! ```

use bincode::error::EncodeError;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Size in bytes of an encoded attribute value.
pub const ATTRIBUTE_VALUE_LEN: usize = 4;

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Which direction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecOperation {
    /// Turning a message into bytes.
    Encode,
    /// Turning bytes into a message.
    Decode,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Encode => "encode",
            Self::Decode => "decode",
        })
    }
}

/// A datagram or attribute value that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// bincode refused the data. bincode errors are not `Clone`, so only the text is kept.
    Bincode {
        /// Direction of the failed conversion.
        operation: CodecOperation,
        /// bincode's description.
        message: String,
    },
    /// The output slice ran out before the message was fully written.
    BufferTooSmall {
        /// Length of the slice that was given.
        provided: usize,
    },
    /// An attribute payload that is not exactly [`ATTRIBUTE_VALUE_LEN`] bytes.
    InvalidValueLength {
        /// Length of the payload that arrived.
        length: usize,
    },
}

impl CodecError {
    /// Wraps a bincode failure.
    pub fn bincode(operation: CodecOperation, error: impl fmt::Display) -> Self {
        Self::Bincode {
            operation,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bincode { operation, message } => write!(f, "{operation} failed: {message}"),
            Self::BufferTooSmall { provided } => {
                write!(f, "message does not fit in {provided} bytes")
            },
            Self::InvalidValueLength { length } => write!(
                f,
                "attribute value must be {ATTRIBUTE_VALUE_LEN} bytes, got {length}"
            ),
        }
    }
}

impl std::error::Error for CodecError {}

/// Result of a codec call.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes `value` into a fresh buffer.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config())
        .map_err(|e| CodecError::bincode(CodecOperation::Encode, e))
}

/// Encodes `value` at the start of `buffer` and returns how many bytes were written.
///
/// # Errors
///
/// [`CodecError::BufferTooSmall`] when `buffer` is too short.
pub fn encode_into<T: Serialize>(value: &T, buffer: &mut [u8]) -> CodecResult<usize> {
    let provided = buffer.len();
    bincode::serde::encode_into_slice(value, buffer, config()).map_err(|e| match e {
        EncodeError::UnexpectedEnd => CodecError::BufferTooSmall { provided },
        other => CodecError::bincode(CodecOperation::Encode, other),
    })
}

/// Decodes a value from the front of `bytes`, returning it with the number of bytes read.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<(T, usize)> {
    bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::bincode(CodecOperation::Decode, e))
}

/// Decodes a value from the front of `bytes`.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    decode(bytes).map(|(value, _)| value)
}

/// Encodes an attribute value as four little-endian bytes.
#[must_use]
pub fn encode_attribute_value(value: i32) -> [u8; ATTRIBUTE_VALUE_LEN] {
    value.to_le_bytes()
}

/// Decodes four little-endian bytes into an attribute value.
///
/// # Errors
///
/// [`CodecError::InvalidValueLength`] unless `bytes` is exactly four bytes long.
pub fn decode_attribute_value(bytes: &[u8]) -> CodecResult<i32> {
    <[u8; ATTRIBUTE_VALUE_LEN]>::try_from(bytes)
        .ok()
        .map(i32::from_le_bytes)
        .ok_or(CodecError::InvalidValueLength {
            length: bytes.len(),
        })
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
    use crate::network::messages::{Message, MessageBody, MessageHeader};

    #[test]
    fn test_message_roundtrip() {
        let original = Message {
            header: MessageHeader { magic: 0xABCD },
            body: MessageBody::AttributeWrite {
                seq: 7,
                attribute: 0x0747_1f02_b963_449e_a39c_9a44_ae31_2b78,
                value: encode_attribute_value(3),
            },
        };
        let bytes = encode(&original).unwrap();
        let (decoded, len): (Message, _) = decode(&bytes).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(len, bytes.len());
    }

    #[test]
    fn test_keepalive_layout_is_fixed() {
        let msg = Message {
            header: MessageHeader { magic: 0x0102 },
            body: MessageBody::KeepAlive,
        };
        let bytes = encode(&msg).unwrap();
        // u16 magic followed by a u32 variant index
        assert_eq!(bytes.len(), 6);
        assert_eq!(&bytes[..2], &[0x02, 0x01]);
    }

    #[test]
    fn test_encode_into_buffer_too_small() {
        let msg = Message {
            header: MessageHeader { magic: 1 },
            body: MessageBody::ConnectRequest {
                service: u128::MAX,
                nonce: 5,
            },
        };
        let mut buffer = [0u8; 4];
        let result = encode_into(&msg, &mut buffer);
        assert_eq!(result, Err(CodecError::BufferTooSmall { provided: 4 }));
    }

    #[test]
    fn test_decode_truncated_datagram() {
        let result: CodecResult<(Message, _)> = decode(&[0xFF, 0xFF, 0xFF]);
        assert!(matches!(
            result,
            Err(CodecError::Bincode {
                operation: CodecOperation::Decode,
                ..
            })
        ));
    }

    #[test]
    fn test_attribute_value_is_little_endian() {
        assert_eq!(encode_attribute_value(1), [1, 0, 0, 0]);
        assert_eq!(encode_attribute_value(320), [0x40, 0x01, 0, 0]);
        assert_eq!(decode_attribute_value(&[0xff; 4]).unwrap(), -1);
    }

    #[test]
    fn test_attribute_value_rejects_wrong_length() {
        assert_eq!(
            decode_attribute_value(&[1, 2, 3]),
            Err(CodecError::InvalidValueLength { length: 3 })
        );
        assert_eq!(
            decode_attribute_value(&[1, 2, 3, 4, 5]),
            Err(CodecError::InvalidValueLength { length: 5 })
        );
        // decimal text is not a valid encoding
        assert!(decode_attribute_value(b"120").is_err());
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::BufferTooSmall { provided: 10 };
        assert_eq!(err.to_string(), "message does not fit in 10 bytes");

        let err = CodecError::bincode(CodecOperation::Decode, "unexpected end");
        assert_eq!(err.to_string(), "decode failed: unexpected end");

        let err = CodecError::InvalidValueLength { length: 2 };
        assert!(err.to_string().contains("got 2"));
    }
}
