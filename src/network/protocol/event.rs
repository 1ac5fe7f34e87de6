use crate::attributes::Attribute;

/// Something the link wants the session to know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The handshake completed.
    Connected,
    /// The link dropped, by timeout or by an explicit `Disconnect`.
    Disconnected,
    /// Nothing was received for `disconnect_notify_start`. The link drops after
    /// `disconnect_timeout_ms` more of silence.
    NetworkInterrupted {
        /// Milliseconds left until the link is considered lost.
        disconnect_timeout_ms: u128,
    },
    /// Sent only after a `NetworkInterrupted` event, once packets arrive again.
    NetworkResumed,
    /// The peer wrote one of its attributes. Delivered in the order the peer issued them.
    AttributeChanged {
        /// The attribute that was written.
        attribute: Attribute,
        /// The decoded value. Not yet checked against the attribute's domain.
        value: i32,
    },
}

impl LinkEvent {
    pub(crate) const fn attribute(&self) -> Option<Attribute> {
        match self {
            Self::AttributeChanged { attribute, .. } => Some(*attribute),
            _ => None,
        }
    }
}
