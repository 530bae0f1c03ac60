//! Frame and message encoding.
//!
//! A `Frame` is one transport packet: a fixed 12-byte header followed by up to
//! `MAX_FRAGMENT_WORDS` little-endian payload words. A `Message` is one logical request,
//! response, or event; messages longer than one frame are split into numbered fragments.

use std::fmt;

use crate::backend::Packet;
use crate::error::{Error, Result};

/// Header size in bytes.
pub const HEADER_LEN: usize = 12;

/// Payload words carried by a single frame.
pub const MAX_FRAGMENT_WORDS: usize = 16;

/// Flags bit: another fragment of the same message follows.
pub const FLAG_MORE: u8 = 0x01;

/// Largest word count one message can describe.
pub const MAX_MESSAGE_WORDS: usize = u16::MAX as usize;

/// Frame kinds on the debug network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Host asks a module for `count` registers starting at `reg`.
    ReadRequest = 1,
    /// Host writes the payload to registers starting at `reg`.
    WriteRequest = 2,
    /// Module returns the registers of a read request.
    ReadResponse = 3,
    /// Module acknowledges a write of `count` registers.
    WriteAck = 4,
    /// Module refuses a request; the payload holds one status word.
    Error = 5,
    /// Unsolicited trace data; `reg` holds the source module type code.
    Event = 6,
}

impl FrameKind {
    /// Decodes a kind byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::ReadRequest,
            2 => Self::WriteRequest,
            3 => Self::ReadResponse,
            4 => Self::WriteAck,
            5 => Self::Error,
            6 => Self::Event,
            _ => return None,
        })
    }

    /// Returns `true` for kinds whose payload length must equal the header's word count.
    pub const fn carries_payload(self) -> bool {
        matches!(
            self,
            Self::WriteRequest | Self::ReadResponse | Self::Error | Self::Event
        )
    }

    /// Returns `true` for kinds sent by a module to the host.
    pub const fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::ReadResponse | Self::WriteAck | Self::Error | Self::Event
        )
    }
}

/// One transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame kind.
    pub kind: FrameKind,
    /// Another fragment follows.
    pub more: bool,
    /// Debug-network address (request target, or response/event source).
    pub addr: u16,
    /// Correlation tag.
    pub tag: u16,
    /// Register offset, or the module type code for events.
    pub reg: u16,
    /// Total word count of the whole message.
    pub count: u16,
    /// Fragment index within the message.
    pub seq: u16,
    /// Payload words of this fragment.
    pub payload: Vec<u32>,
}

impl Frame {
    /// Serializes the frame into a packet.
    pub fn encode(&self) -> Packet {
        let mut data = Vec::with_capacity(HEADER_LEN + self.payload.len() * 4);
        data.push(self.kind as u8);
        data.push(if self.more { FLAG_MORE } else { 0 });
        data.extend_from_slice(&self.addr.to_le_bytes());
        data.extend_from_slice(&self.tag.to_le_bytes());
        data.extend_from_slice(&self.reg.to_le_bytes());
        data.extend_from_slice(&self.count.to_le_bytes());
        data.extend_from_slice(&self.seq.to_le_bytes());
        for word in &self.payload {
            data.extend_from_slice(&word.to_le_bytes());
        }
        Packet::new(data)
    }

    /// Parses a frame from packet bytes.
    ///
    /// # Errors
    ///
    /// `Error::Protocol` for a short header, an unknown kind, a payload that is not a whole
    /// number of words, or more than `MAX_FRAGMENT_WORDS` words.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Protocol(format!(
                "truncated frame: {} bytes, header needs {HEADER_LEN}",
                bytes.len()
            )));
        }
        let kind = FrameKind::from_u8(bytes[0])
            .ok_or_else(|| Error::Protocol(format!("unknown frame kind {:#04x}", bytes[0])))?;
        let field = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let body = &bytes[HEADER_LEN..];
        if body.len() % 4 != 0 {
            return Err(Error::Protocol(format!(
                "frame payload of {} bytes is not word aligned",
                body.len()
            )));
        }
        if body.len() / 4 > MAX_FRAGMENT_WORDS {
            return Err(Error::Protocol(format!(
                "frame carries {} words, limit is {MAX_FRAGMENT_WORDS}",
                body.len() / 4
            )));
        }
        let payload = body
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        Ok(Self {
            kind,
            more: bytes[1] & FLAG_MORE != 0,
            addr: field(2),
            tag: field(4),
            reg: field(6),
            count: field(8),
            seq: field(10),
            payload,
        })
    }
}

/// One logical message, independent of how many frames carry it.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    /// Message kind.
    pub kind: FrameKind,
    /// Debug-network address.
    pub addr: u16,
    /// Correlation tag.
    pub tag: u16,
    /// Register offset, or the module type code for events.
    pub reg: u16,
    /// Word count (requested words for reads, written words for acks).
    pub count: u16,
    /// Payload words.
    pub payload: Vec<u32>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}(addr={:#06x} tag={} reg={:#06x} count={} payload={:x?})",
            self.kind, self.addr, self.tag, self.reg, self.count, self.payload
        )
    }
}

impl Message {
    /// Read of `count` registers at `reg` on module `addr`.
    pub const fn read_request(addr: u16, tag: u16, reg: u16, count: u16) -> Self {
        Self {
            kind: FrameKind::ReadRequest,
            addr,
            tag,
            reg,
            count,
            payload: Vec::new(),
        }
    }

    /// Write of `words` to consecutive registers from `reg` on module `addr`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if `words` is empty or longer than `MAX_MESSAGE_WORDS`.
    pub fn write_request(addr: u16, tag: u16, reg: u16, words: &[u32]) -> Result<Self> {
        Self::with_payload(FrameKind::WriteRequest, addr, tag, reg, words.to_vec())
    }

    /// Response carrying the registers of a read.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if `words` is empty or longer than `MAX_MESSAGE_WORDS`.
    pub fn read_response(addr: u16, tag: u16, reg: u16, words: Vec<u32>) -> Result<Self> {
        Self::with_payload(FrameKind::ReadResponse, addr, tag, reg, words)
    }

    /// Acknowledgement of a write of `count` registers.
    pub const fn write_ack(addr: u16, tag: u16, reg: u16, count: u16) -> Self {
        Self {
            kind: FrameKind::WriteAck,
            addr,
            tag,
            reg,
            count,
            payload: Vec::new(),
        }
    }

    /// Refusal of a request with a status code.
    pub fn error(addr: u16, tag: u16, reg: u16, code: u32) -> Self {
        Self {
            kind: FrameKind::Error,
            addr,
            tag,
            reg,
            count: 1,
            payload: vec![code],
        }
    }

    /// Trace event from the module at `addr` of type `type_code`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` if `words` is empty or longer than `MAX_MESSAGE_WORDS`.
    pub fn event(addr: u16, tag: u16, type_code: u16, words: Vec<u32>) -> Result<Self> {
        Self::with_payload(FrameKind::Event, addr, tag, type_code, words)
    }

    fn with_payload(
        kind: FrameKind,
        addr: u16,
        tag: u16,
        reg: u16,
        payload: Vec<u32>,
    ) -> Result<Self> {
        let count = u16::try_from(payload.len())
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "message payload must hold 1..={MAX_MESSAGE_WORDS} words, got {}",
                    payload.len()
                ))
            })?;
        Ok(Self {
            kind,
            addr,
            tag,
            reg,
            count,
            payload,
        })
    }

    /// Splits the message into frames of at most `MAX_FRAGMENT_WORDS` payload words.
    pub fn to_frames(&self) -> Vec<Frame> {
        let frame = |seq: usize, more: bool, payload: &[u32]| Frame {
            kind: self.kind,
            more,
            addr: self.addr,
            tag: self.tag,
            reg: self.reg,
            count: self.count,
            seq: seq as u16,
            payload: payload.to_vec(),
        };
        if self.payload.is_empty() {
            return vec![frame(0, false, &[])];
        }
        let last = (self.payload.len() - 1) / MAX_FRAGMENT_WORDS;
        self.payload
            .chunks(MAX_FRAGMENT_WORDS)
            .enumerate()
            .map(|(seq, chunk)| frame(seq, seq != last, chunk))
            .collect()
    }

    /// Status code of an error message.
    pub fn status(&self) -> Option<u32> {
        match self.kind {
            FrameKind::Error => self.payload.first().copied(),
            _ => None,
        }
    }
}
