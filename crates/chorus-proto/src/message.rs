//! Multipart messages and routing envelopes.

use bytes::Bytes;

use crate::{MAX_BODY_SIZE, MAX_PARTS, MessageFlags, MessageHeader, WireError};

/// Size of the per-frame length prefix.
const LEN_PREFIX: usize = 4;

/// An ordered list of byte frames sent as one unit.
///
/// Frames are how the routing tiers attach information without touching the
/// application body: the broker prepends a client identity frame, a publisher
/// sends the topic as the first frame, and a subscriber's control message
/// carries its prefix as the only frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Multipart {
    flags: MessageFlags,
    parts: Vec<Bytes>,
}

impl Multipart {
    /// Create a data message from frames.
    pub fn new(parts: Vec<Bytes>) -> Self {
        Self { flags: MessageFlags::empty(), parts }
    }

    /// Create a single-frame data message.
    pub fn single(frame: impl Into<Bytes>) -> Self {
        Self::new(vec![frame.into()])
    }

    /// Subscription control message for `prefix`.
    pub fn subscribe(prefix: impl Into<Bytes>) -> Self {
        Self { flags: MessageFlags::SUBSCRIBE, parts: vec![prefix.into()] }
    }

    /// Unsubscription control message for `prefix`.
    pub fn unsubscribe(prefix: impl Into<Bytes>) -> Self {
        Self { flags: MessageFlags::UNSUBSCRIBE, parts: vec![prefix.into()] }
    }

    /// A publication: topic frame followed by the body.
    pub fn publication(topic: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        Self::new(vec![topic.into(), body.into()])
    }

    /// Message flags.
    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    /// Frames in order.
    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    /// Consume the message, returning its frames.
    pub fn into_parts(self) -> Vec<Bytes> {
        self.parts
    }

    /// First frame, if any.
    pub fn first(&self) -> Option<&Bytes> {
        self.parts.first()
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True if the message has no frames.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Insert a frame at the front.
    pub fn push_front(&mut self, frame: Bytes) {
        self.parts.insert(0, frame);
    }

    /// Remove and return the first frame.
    pub fn pop_front(&mut self) -> Option<Bytes> {
        if self.parts.is_empty() { None } else { Some(self.parts.remove(0)) }
    }

    /// Split at the first empty delimiter frame.
    ///
    /// Frames before the delimiter are routing identities, frames after it
    /// are the body. A message without a delimiter has no routing envelope
    /// and is all body.
    pub fn split_envelope(self) -> (RoutingEnvelope, Vec<Bytes>) {
        let Some(delimiter) = self.parts.iter().position(Bytes::is_empty) else {
            return (RoutingEnvelope::default(), self.parts);
        };

        let mut frames = self.parts;
        let body = frames.split_off(delimiter + 1);
        frames.truncate(delimiter);

        (RoutingEnvelope { frames, delimited: true }, body)
    }

    /// Body length on the wire, excluding the header.
    pub fn body_len(&self) -> usize {
        self.parts.iter().map(|p| LEN_PREFIX + p.len()).sum()
    }

    /// Append the encoded message to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message exceeds the frame count or body size
    /// limits.
    pub fn encode(&self, dst: &mut Vec<u8>) -> Result<(), WireError> {
        if self.parts.len() > MAX_PARTS {
            return Err(WireError::TooManyParts { count: self.parts.len(), max: MAX_PARTS });
        }

        let body_len = self.body_len();
        if body_len > MAX_BODY_SIZE {
            return Err(WireError::BodyTooLarge { size: body_len, max: MAX_BODY_SIZE });
        }

        // Both fit: MAX_PARTS < u16::MAX and MAX_BODY_SIZE < u32::MAX
        let part_count = u16::try_from(self.parts.len())
            .map_err(|_| WireError::TooManyParts { count: self.parts.len(), max: MAX_PARTS })?;
        let declared = u32::try_from(body_len)
            .map_err(|_| WireError::BodyTooLarge { size: body_len, max: MAX_BODY_SIZE })?;

        dst.reserve(MessageHeader::SIZE + body_len);
        dst.extend_from_slice(&MessageHeader::new(self.flags, part_count, declared).to_bytes());

        for part in &self.parts {
            // Bounded by MAX_BODY_SIZE above
            let len = u32::try_from(part.len())
                .map_err(|_| WireError::BodyTooLarge { size: part.len(), max: MAX_BODY_SIZE })?;
            dst.extend_from_slice(&len.to_be_bytes());
            dst.extend_from_slice(part);
        }

        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(MessageHeader::SIZE + self.body_len());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode a complete message (header and body).
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let header = MessageHeader::from_bytes(bytes)?;
        let body = &bytes[MessageHeader::SIZE..];

        let declared = header.body_len() as usize;
        if body.len() < declared {
            return Err(WireError::Truncated { expected: declared, actual: body.len() });
        }
        if body.len() > declared {
            return Err(WireError::TrailingBytes(body.len() - declared));
        }

        Self::decode_body(&header, body)
    }

    /// Decode the body that follows an already parsed header.
    ///
    /// Used by stream readers that read the header first to learn how many
    /// bytes to wait for.
    pub fn decode_body(header: &MessageHeader, body: &[u8]) -> Result<Self, WireError> {
        let count = usize::from(header.part_count());
        let mut parts = Vec::with_capacity(count);
        let mut rest = body;

        for _ in 0..count {
            let Some((len_bytes, after)) = rest.split_first_chunk::<LEN_PREFIX>() else {
                return Err(WireError::Truncated { expected: LEN_PREFIX, actual: rest.len() });
            };

            let len = u32::from_be_bytes(*len_bytes) as usize;
            if after.len() < len {
                return Err(WireError::Truncated { expected: len, actual: after.len() });
            }

            let (frame, tail) = after.split_at(len);
            parts.push(Bytes::copy_from_slice(frame));
            rest = tail;
        }

        if !rest.is_empty() {
            return Err(WireError::TrailingBytes(rest.len()));
        }

        Ok(Self { flags: header.flags(), parts })
    }
}

/// Routing identity frames stripped from a request.
///
/// Replies must be sent with the same envelope so the routing tiers can find
/// their way back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingEnvelope {
    frames: Vec<Bytes>,
    delimited: bool,
}

impl RoutingEnvelope {
    /// Identity frames, outermost first.
    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    /// True if the original message had a delimiter frame.
    pub fn is_delimited(&self) -> bool {
        self.delimited
    }

    /// Rebuild a message by putting `body` behind this envelope.
    pub fn wrap(self, body: Vec<Bytes>) -> Multipart {
        let mut parts = self.frames;
        if self.delimited {
            parts.push(Bytes::new());
        }
        parts.extend(body);
        Multipart::new(parts)
    }
}
