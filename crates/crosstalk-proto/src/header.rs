//! Frame header: the fixed-size prefix of every Crosstalk frame.
//!
//! Wire layout (16 bytes, all multi-byte fields big-endian):
//!
//! | Offset | Size | Field          |
//! |--------|------|----------------|
//! | 0      | 4    | magic `CRTK`   |
//! | 4      | 1    | version        |
//! | 5      | 1    | reserved       |
//! | 6      | 2    | opcode         |
//! | 8      | 4    | request id     |
//! | 12     | 4    | payload size   |
//!
//! The header is a `#[repr(C, packed)]` struct of byte arrays so it can be
//! parsed zero-copy straight out of a receive buffer. Multi-byte values are
//! stored as big-endian byte arrays and converted in the accessors, which
//! keeps the struct free of alignment requirements.

use core::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Opcode, ProtocolError, errors::Result};

/// Fixed-size header preceding every frame payload.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    reserved: u8,
    pub(crate) opcode: [u8; 2],
    request_id: [u8; 4],
    pub(crate) payload_size: [u8; 4],
}

impl FrameHeader {
    /// Size of the encoded header in bytes.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Magic number identifying a Crosstalk frame: `CRTK` in ASCII.
    pub const MAGIC: u32 = 0x4352_544B;

    /// Protocol version this build speaks.
    pub const VERSION: u8 = 0x01;

    /// Largest payload a single frame may carry (64 KiB).
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

    /// Creates a header for `opcode` with zero request id and payload size.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            reserved: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            request_id: [0; 4],
            payload_size: [0; 4],
        }
    }

    /// Parses and validates a header from the front of `bytes`.
    ///
    /// Checks run cheapest-first: length, magic, version, then declared
    /// payload size. The returned reference borrows from `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _) = Self::ref_from_prefix(bytes).map_err(|_| {
            ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;

        if header.magic() != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        if header.payload_size() > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: header.payload_size() as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serializes the header to its wire representation.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(self.as_bytes());
        bytes
    }

    /// Magic number field.
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version field.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Raw opcode value.
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Opcode as the typed enum, or `None` if this version does not know it.
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Client-chosen correlation id, echoed back in direct responses.
    pub fn request_id(&self) -> u32 {
        u32::from_be_bytes(self.request_id)
    }

    /// Sets the correlation id.
    pub fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id.to_be_bytes();
    }

    /// Payload size declared by this header, in bytes.
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }
}

impl fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format_args!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("opcode", &format_args!("{:#06x}", self.opcode()))
            .field("request_id", &self.request_id())
            .field("payload_size", &self.payload_size())
            .finish_non_exhaustive()
    }
}

impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}
