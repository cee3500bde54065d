//! A frame is a validated header plus its payload bytes.
//!
//! [`Frame`] owns its payload as [`Bytes`] so a frame encoded once can be
//! handed to many recipients without copying the body, which is the common
//! case for room fan-out.

use bytes::{BufMut, Bytes};

use crate::{FrameHeader, ProtocolError, errors::Result};

/// One complete protocol message: header and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Validated frame header.
    pub header: FrameHeader,
    /// Opcode-specific body, possibly empty.
    pub payload: Bytes,
}

impl Frame {
    /// Builds a frame from `header` and `payload`, fixing up the header's
    /// declared payload size to match.
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        debug_assert!(
            payload.len() <= FrameHeader::MAX_PAYLOAD_SIZE as usize,
            "payload exceeds protocol maximum"
        );
        #[allow(clippy::expect_used)]
        let size = u32::try_from(payload.len())
            .expect("invariant: payload length bounded by MAX_PAYLOAD_SIZE fits in u32");
        header.payload_size = size.to_be_bytes();
        Self { header, payload }
    }

    /// Encoded size of this frame in bytes.
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Serializes the frame into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Parses one complete frame from the front of `bytes`.
    ///
    /// The header is validated first; the buffer must then hold at least the
    /// payload size the header declares. Trailing bytes beyond the frame are
    /// ignored, so callers can decode out of a larger receive buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *FrameHeader::from_bytes(bytes)?;
        let payload_size = header.payload_size() as usize;

        let available = bytes.len().saturating_sub(FrameHeader::SIZE);
        if available < payload_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: available,
            });
        }

        let end = FrameHeader::SIZE + payload_size;
        #[allow(clippy::expect_used)]
        let payload = Bytes::copy_from_slice(
            bytes.get(FrameHeader::SIZE..end).expect("invariant: bounds checked above"),
        );

        Ok(Self { header, payload })
    }
}
