//! The seam between a session endpoint and whatever carries its messages.

use wristlink_common::FieldMap;

use crate::error::TransportError;

/// Outbound half of a link.
///
/// Delivery is fire-and-forget: a successful `deliver` only means the link
/// accepted the message. Implementations must not block.
pub trait Transport {
    /// Hand one encoded message to the link.
    fn deliver(&mut self, fields: FieldMap) -> Result<(), TransportError>;
}

/// Collects every delivered message in order.
impl Transport for Vec<FieldMap> {
    fn deliver(&mut self, fields: FieldMap) -> Result<(), TransportError> {
        self.push(fields);
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn deliver(&mut self, fields: FieldMap) -> Result<(), TransportError> {
        (**self).deliver(fields)
    }
}

#[cfg(feature = "channel")]
pub use channel::ChannelTransport;

#[cfg(feature = "channel")]
mod channel {
    use async_channel::{Receiver, Sender, TrySendError};
    use tracing::trace;
    use wristlink_common::FieldMap;

    use super::Transport;
    use crate::error::TransportError;

    /// Thin wrapper around an unbounded `async-channel` sender.
    ///
    /// The matching [`Receiver`] is the inbound side of the peer: whoever owns
    /// it pulls field maps off and passes them to the peer's `receive`.
    #[derive(Clone)]
    pub struct ChannelTransport {
        sender: Sender<FieldMap>,
    }

    impl ChannelTransport {
        /// Wrap an existing sender.
        pub fn new(sender: Sender<FieldMap>) -> Self {
            Self { sender }
        }

        /// A transport and the receiver its messages arrive on.
        pub fn unbounded() -> (Self, Receiver<FieldMap>) {
            let (sender, receiver) = async_channel::unbounded();
            (Self::new(sender), receiver)
        }

        /// Whether the receiving side has been dropped.
        pub fn is_closed(&self) -> bool {
            self.sender.is_closed()
        }
    }

    impl Transport for ChannelTransport {
        fn deliver(&mut self, fields: FieldMap) -> Result<(), TransportError> {
            self.sender.try_send(fields).map_err(|e| match e {
                TrySendError::Closed(_) => TransportError::Closed,
                TrySendError::Full(_) => TransportError::Rejected("channel is full".to_string()),
            })?;
            trace!("Queued message, {} waiting", self.sender.len());
            Ok(())
        }
    }

}
