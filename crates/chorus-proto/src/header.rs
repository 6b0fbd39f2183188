//! Fixed-size message header.

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U16, U32},
};

use crate::{MAX_BODY_SIZE, MAX_PARTS, MessageFlags, WireError};

/// Header preceding every message on the wire.
///
/// All multi-byte fields are big-endian. The layout is fixed at 12 bytes and
/// parsed without copying through `zerocopy`.
///
/// | offset | size | field        |
/// |--------|------|--------------|
/// | 0      | 2    | magic `"CH"` |
/// | 2      | 1    | version      |
/// | 3      | 1    | flags        |
/// | 4      | 2    | part count   |
/// | 6      | 2    | reserved     |
/// | 8      | 4    | body length  |
#[repr(C)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
pub struct MessageHeader {
    magic: [u8; 2],
    version: u8,
    flags: u8,
    part_count: U16<BigEndian>,
    reserved: U16<BigEndian>,
    body_len: U32<BigEndian>,
}

impl MessageHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Magic bytes identifying a Chorus message.
    pub const MAGIC: [u8; 2] = *b"CH";

    /// Current protocol version.
    pub const VERSION: u8 = 1;

    /// Build a header for a message with the given shape.
    pub fn new(flags: MessageFlags, part_count: u16, body_len: u32) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            flags: flags.bits(),
            part_count: U16::new(part_count),
            reserved: U16::new(0),
            body_len: U32::new(body_len),
        }
    }

    /// Parse and validate a header from the first [`Self::SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// - `Truncated` if fewer than [`Self::SIZE`] bytes are given
    /// - `InvalidMagic`, `UnsupportedVersion`, `UnknownFlags` on bad fields
    /// - `BodyTooLarge` / `TooManyParts` if the declared shape exceeds limits
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let prefix = bytes
            .get(..Self::SIZE)
            .ok_or(WireError::Truncated { expected: Self::SIZE, actual: bytes.len() })?;

        let header = Self::read_from_bytes(prefix)
            .map_err(|_| WireError::Truncated { expected: Self::SIZE, actual: bytes.len() })?;

        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<(), WireError> {
        if self.magic != Self::MAGIC {
            return Err(WireError::InvalidMagic(self.magic));
        }

        if self.version != Self::VERSION {
            return Err(WireError::UnsupportedVersion(self.version));
        }

        if MessageFlags::from_bits(self.flags).is_none() {
            return Err(WireError::UnknownFlags(self.flags));
        }

        let body_len = self.body_len() as usize;
        if body_len > MAX_BODY_SIZE {
            return Err(WireError::BodyTooLarge { size: body_len, max: MAX_BODY_SIZE });
        }

        let part_count = usize::from(self.part_count());
        if part_count > MAX_PARTS {
            return Err(WireError::TooManyParts { count: part_count, max: MAX_PARTS });
        }

        Ok(())
    }

    /// Header bytes as they appear on the wire.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Message flags.
    pub fn flags(&self) -> MessageFlags {
        MessageFlags::from_bits_truncate(self.flags)
    }

    /// Number of frames in the body.
    pub fn part_count(&self) -> u16 {
        self.part_count.get()
    }

    /// Length of the body in bytes.
    pub fn body_len(&self) -> u32 {
        self.body_len.get()
    }
}
