//! Topic subscription filtering for the broadcast tier.
//!
//! Publications are `[topic, body]` messages. A subscriber holds a multiset
//! of byte prefixes; a publication is delivered if its topic starts with any
//! of them. The empty prefix matches every topic. Subscribing twice to the
//! same prefix needs two unsubscribes to remove it.

use bytes::Bytes;
use chorus_proto::{MessageFlags, Multipart};

/// One subscriber's prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    prefixes: Vec<Bytes>,
}

impl SubscriptionSet {
    /// Empty set: matches nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prefix.
    pub fn subscribe(&mut self, prefix: Bytes) {
        self.prefixes.push(prefix);
    }

    /// Remove one occurrence of a prefix. Returns false if it was not held.
    pub fn unsubscribe(&mut self, prefix: &[u8]) -> bool {
        match self.prefixes.iter().position(|p| p.as_ref() == prefix) {
            Some(index) => {
                self.prefixes.swap_remove(index);
                true
            },
            None => false,
        }
    }

    /// Apply a subscription control message.
    ///
    /// Returns false if the message is not a well-formed control message
    /// (wrong flags or not exactly one frame).
    pub fn apply(&mut self, message: &Multipart) -> bool {
        let [prefix] = message.parts() else {
            return false;
        };

        let flags = message.flags();
        if flags == MessageFlags::SUBSCRIBE {
            self.subscribe(prefix.clone());
            true
        } else if flags == MessageFlags::UNSUBSCRIBE {
            self.unsubscribe(prefix);
            true
        } else {
            false
        }
    }

    /// True if `topic` starts with any held prefix.
    pub fn matches(&self, topic: &[u8]) -> bool {
        self.prefixes.iter().any(|prefix| topic.starts_with(prefix))
    }

    /// True if a publication should be delivered to this subscriber.
    pub fn accepts(&self, publication: &Multipart) -> bool {
        publication.first().is_some_and(|topic| self.matches(topic))
    }

    /// Number of held prefixes, counting duplicates.
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// True if no prefix is held.
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
