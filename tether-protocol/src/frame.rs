//! Binary frame format for process-to-process links.
//!
//! Every message posted on a named channel travels as one frame. The channel
//! name rides in the header extension so that a single byte stream can carry
//! any number of logical channels.
//!
//! ```text
//! +--------+---------+--------+-------------+-------------+--------+
//! | magic  | version | flags  | channel_len | payload_len | crc32c |
//! | 4 bytes| 2 bytes |2 bytes |   2 bytes   |   4 bytes   | 4 bytes|
//! +--------+---------+--------+-------------+-------------+--------+
//! | channel (UTF-8)  | payload (UTF-8 JSON)                        |
//! | channel_len      | payload_len bytes                           |
//! +------------------+---------------------------------------------+
//! ```
//!
//! The checksum covers the channel name and the payload.

use crate::error::ProtocolError;
use crate::{MAX_CHANNEL_NAME_LEN, MAX_PAYLOAD_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic bytes identifying tether frames.
pub const MAGIC: [u8; 4] = *b"TTHR";

/// Size of the fixed frame header in bytes (4+2+2+2+4+4 = 18).
pub const FRAME_HEADER_SIZE: usize = 18;

/// Frame flags bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u16);

impl FrameFlags {
    /// CRC32C checksum is present and valid.
    pub const CRC_PRESENT: u16 = 1 << 0;
    /// Sender is closing the link; no further frames follow.
    pub const GOODBYE: u16 = 1 << 1;

    /// Valid flags mask for protocol version 1.
    const VALID_V1_MASK: u16 = 0x0003;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_crc(mut self) -> Self {
        self.0 |= Self::CRC_PRESENT;
        self
    }

    pub fn with_goodbye(mut self) -> Self {
        self.0 |= Self::GOODBYE;
        self
    }

    pub fn has_crc(&self) -> bool {
        self.0 & Self::CRC_PRESENT != 0
    }

    pub fn is_goodbye(&self) -> bool {
        self.0 & Self::GOODBYE != 0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> Result<Self, ProtocolError> {
        if bits & !Self::VALID_V1_MASK != 0 {
            return Err(ProtocolError::InvalidFlags(bits));
        }
        Ok(Self(bits))
    }
}

/// A message bound to a named channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Protocol version.
    pub version: u16,
    /// Frame flags.
    pub flags: FrameFlags,
    /// Channel the payload was posted on.
    pub channel: String,
    /// Frame payload (an encoded envelope or push message).
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new checksummed frame for a channel.
    pub fn new(channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            flags: FrameFlags::new().with_crc(),
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// Creates the frame announcing that the sender is closing the link.
    pub fn goodbye() -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            flags: FrameFlags::new().with_crc().with_goodbye(),
            channel: String::new(),
            payload: Bytes::new(),
        }
    }

    /// Returns the payload as UTF-8 text.
    pub fn payload_str(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload).map_err(|_| ProtocolError::InvalidUtf8)
    }

    fn checksum(channel: &[u8], payload: &[u8]) -> u32 {
        crc32c::crc32c_append(crc32c::crc32c(channel), payload)
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let payload_len = self.payload.len() as u32;
        if self.payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let channel = self.channel.as_bytes();
        if channel.len() > MAX_CHANNEL_NAME_LEN {
            return Err(ProtocolError::ChannelNameTooLong {
                len: channel.len(),
                max: MAX_CHANNEL_NAME_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + channel.len() + self.payload.len());

        buf.put_slice(&MAGIC);
        buf.put_u16(self.version);
        buf.put_u16(self.flags.bits());
        buf.put_u16(channel.len() as u16);
        buf.put_u32(payload_len);

        let crc = if self.flags.has_crc() {
            Self::checksum(channel, &self.payload)
        } else {
            0
        };
        buf.put_u32(crc);

        buf.put_slice(channel);
        buf.put_slice(&self.payload);

        Ok(buf)
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let version = u16::from_be_bytes([buf[4], buf[5]]);
        if version != crate::PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let flags = FrameFlags::from_bits(u16::from_be_bytes([buf[6], buf[7]]))?;

        let channel_len = u16::from_be_bytes([buf[8], buf[9]]) as usize;
        if channel_len > MAX_CHANNEL_NAME_LEN {
            return Err(ProtocolError::ChannelNameTooLong {
                len: channel_len,
                max: MAX_CHANNEL_NAME_LEN,
            });
        }

        let payload_len = u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]) as usize;
        if payload_len > MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len as u32,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let crc_expected = u32::from_be_bytes([buf[14], buf[15], buf[16], buf[17]]);

        if buf.len() < FRAME_HEADER_SIZE + channel_len + payload_len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let channel = buf.split_to(channel_len).freeze();
        let payload = buf.split_to(payload_len).freeze();

        if flags.has_crc() {
            let crc_actual = Self::checksum(&channel, &payload);
            if crc_actual != crc_expected {
                return Err(ProtocolError::CrcMismatch {
                    expected: crc_expected,
                    actual: crc_actual,
                });
            }
        }

        let channel = String::from_utf8(channel.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;

        Ok(Some(Self {
            version,
            flags,
            channel,
            payload,
        }))
    }
}

/// Accumulates bytes read from a stream and yields complete frames.
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_roundtrip() {
        let payload = Bytes::from(r#"{"id":"1","method":"getModels","args":[]}"#);
        let frame = Frame::new("database-to-main", payload.clone());

        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.version, crate::PROTOCOL_VERSION);
        assert!(decoded.flags.has_crc());
        assert_eq!(decoded.channel, "database-to-main");
        assert_eq!(decoded.payload, payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_crc_covers_payload() {
        let frame = Frame::new("llmRpc", Bytes::from(r#"{"test":"data"}"#));
        let mut encoded = frame.encode().unwrap();

        let len = encoded.len();
        encoded[len - 1] ^= 0xFF;

        let result = Frame::decode(&mut encoded);
        assert!(matches!(result, Err(ProtocolError::CrcMismatch { .. })));
    }

    #[test]
    fn test_crc_covers_channel_name() {
        let frame = Frame::new("llmRpc", Bytes::from(r#"{}"#));
        let mut encoded = frame.encode().unwrap();

        // First byte of the channel name
        encoded[FRAME_HEADER_SIZE] = b'x';

        let result = Frame::decode(&mut encoded);
        assert!(matches!(result, Err(ProtocolError::CrcMismatch { .. })));
    }

    #[test]
    fn test_invalid_magic() {
        let mut buf =
            BytesMut::from(&b"BADX\x00\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00"[..]);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::InvalidMagic(_))));
    }

    #[test]
    fn test_incomplete_frame() {
        let mut buf = BytesMut::from(&b"TTHR\x00\x01\x00\x01"[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());

        let encoded = Frame::new("settingsRpc", Bytes::from("{}")).encode().unwrap();
        let mut partial = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert!(Frame::decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn test_unsupported_version() {
        let mut buf =
            BytesMut::from(&b"TTHR\x00\x63\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00"[..]);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::UnsupportedVersion(99))));
    }

    #[test]
    fn test_invalid_flags() {
        let result = FrameFlags::from_bits(0x0100);
        assert!(matches!(result, Err(ProtocolError::InvalidFlags(0x0100))));
    }

    #[test]
    fn test_frame_too_large() {
        let huge_payload = vec![0u8; (MAX_PAYLOAD_SIZE + 1) as usize];
        let frame = Frame::new("x", Bytes::from(huge_payload));
        assert!(matches!(
            frame.encode(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_channel_name_too_long() {
        let frame = Frame::new("c".repeat(MAX_CHANNEL_NAME_LEN + 1), Bytes::from("{}"));
        assert!(matches!(
            frame.encode(),
            Err(ProtocolError::ChannelNameTooLong { .. })
        ));
    }

    #[test]
    fn test_goodbye_frame() {
        let mut buf = Frame::goodbye().encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert!(decoded.flags.is_goodbye());
        assert!(decoded.channel.is_empty());
    }

    #[test]
    fn test_decoder_yields_frames_in_order() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&Frame::new("a", Bytes::from("1")).encode().unwrap());
        decoder.extend(&Frame::new("b", Bytes::from("2")).encode().unwrap());

        let first = decoder.decode_frame().unwrap().unwrap();
        let second = decoder.decode_frame().unwrap().unwrap();
        assert_eq!((first.channel.as_str(), first.payload_str().unwrap()), ("a", "1"));
        assert_eq!((second.channel.as_str(), second.payload_str().unwrap()), ("b", "2"));
        assert!(decoder.decode_frame().unwrap().is_none());
        assert_eq!(decoder.buffered(), 0);
    }

    proptest! {
        #[test]
        fn prop_split_reads_reassemble(
            channel in "[a-zA-Z-]{1,32}",
            payload in "[ -~]{0,256}",
            split in 0usize..300,
        ) {
            let encoded = Frame::new(channel.clone(), Bytes::from(payload.clone())).encode().unwrap();
            let split = split.min(encoded.len());

            let mut decoder = FrameDecoder::new();
            decoder.extend(&encoded[..split]);
            if split < encoded.len() {
                prop_assert!(decoder.decode_frame().unwrap().is_none());
                decoder.extend(&encoded[split..]);
            }

            let frame = decoder.decode_frame().unwrap().unwrap();
            prop_assert_eq!(&frame.channel, &channel);
            prop_assert_eq!(frame.payload_str().unwrap(), payload.as_str());
        }
    }
}
