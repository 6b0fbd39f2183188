//! Message flags.

use bitflags::bitflags;

bitflags! {
    /// Per-message control flags carried in the [`MessageHeader`](crate::MessageHeader).
    ///
    /// Ordinary data messages carry no flags. Subscription control messages
    /// sent by subscribers to the fan-out tier carry exactly one of
    /// `SUBSCRIBE` or `UNSUBSCRIBE` and a single frame holding the topic
    /// prefix.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageFlags: u8 {
        /// Register interest in every topic starting with the frame's prefix.
        const SUBSCRIBE = 0x01;
        /// Drop one previously registered prefix.
        const UNSUBSCRIBE = 0x02;
    }
}

impl MessageFlags {
    /// True if this message is a subscription control message.
    pub fn is_subscription_control(self) -> bool {
        self.intersects(Self::SUBSCRIBE | Self::UNSUBSCRIBE)
    }
}
