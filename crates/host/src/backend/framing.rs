//! Length-prefixed packet framing over a byte stream.
//!
//! Each packet is sent as a little-endian `u16` byte count followed by the packet bytes.
//! Reads are non-blocking: the stream is expected to report `WouldBlock` (or `TimedOut`)
//! when no data is available, and partial packets are buffered until complete.

use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use super::Packet;
use crate::error::{Error, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX: usize = 2;

/// Largest packet the framing can carry.
pub const MAX_PACKET_LEN: usize = u16::MAX as usize;

/// How long a write may stall on `WouldBlock` before it is reported as a fault.
const WRITE_STALL_LIMIT: Duration = Duration::from_secs(1);

/// Back-off between retries of a stalled write.
const WRITE_RETRY_DELAY: Duration = Duration::from_micros(50);

/// Bytes requested from the stream per read call.
const READ_CHUNK: usize = 4096;

/// Packet framer over any `Read + Write` stream.
#[derive(Debug)]
pub struct FrameStream<S> {
    stream: S,
    rx: Vec<u8>,
    eof_closes: bool,
    /// Set once a frame was only partly written; the peer can no longer find frame starts.
    misaligned: bool,
}

impl<S: Read + Write> FrameStream<S> {
    /// Wraps a stream; a zero-byte read is treated as the peer closing the link.
    pub const fn new(stream: S) -> Self {
        Self {
            stream,
            rx: Vec::new(),
            eof_closes: true,
            misaligned: false,
        }
    }

    /// Wraps a stream whose zero-byte reads only mean "no data yet" (character devices, FIFOs).
    pub const fn with_idle_eof(stream: S) -> Self {
        Self {
            stream,
            rx: Vec::new(),
            eof_closes: false,
            misaligned: false,
        }
    }

    /// Underlying stream.
    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Consumes the framer, discarding any buffered partial packet.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Bytes buffered towards the next packet.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    /// Writes one packet with its length prefix.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for packets over `MAX_PACKET_LEN`, `Error::Io` on write
    /// failure or a write stalled past the stall limit, `Error::Connection` if the stream
    /// accepts no bytes. A failure after part of a frame went out leaves the stream
    /// unusable: every later send returns `Error::Connection`.
    pub fn send(&mut self, packet: &Packet) -> Result<()> {
        if self.misaligned {
            return Err(Error::Connection(
                "debug link lost frame alignment after a partial write".into(),
            ));
        }
        let len = u16::try_from(packet.len()).map_err(|_| {
            Error::InvalidArgument(format!(
                "packet of {} bytes exceeds the {MAX_PACKET_LEN}-byte frame limit",
                packet.len()
            ))
        })?;
        let mut buf = Vec::with_capacity(LENGTH_PREFIX + packet.len());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(packet.as_bytes());
        self.write_all(&buf)?;
        match self.stream.flush() {
            Err(e) if e.kind() != ErrorKind::WouldBlock => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Returns the next complete packet, or `None` if the stream has nothing more yet.
    ///
    /// # Errors
    ///
    /// `Error::Connection` when the peer closed the stream, `Error::Io` on read failure.
    pub fn try_receive(&mut self) -> Result<Option<Packet>> {
        if let Some(packet) = self.take_buffered() {
            return Ok(Some(packet));
        }
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) if self.eof_closes => {
                    return Err(Error::Connection("debug link closed by peer".into()));
                }
                Ok(0) => return Ok(None),
                Ok(n) => {
                    self.rx.extend_from_slice(&chunk[..n]);
                    return Ok(self.take_buffered());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn take_buffered(&mut self) -> Option<Packet> {
        let prefix: [u8; LENGTH_PREFIX] = self.rx.get(..LENGTH_PREFIX)?.try_into().ok()?;
        let end = LENGTH_PREFIX + usize::from(u16::from_le_bytes(prefix));
        if self.rx.len() < end {
            return None;
        }
        let data: Vec<u8> = self.rx.drain(..end).skip(LENGTH_PREFIX).collect();
        Some(Packet::new(data))
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut sent = 0;
        let result = self.write_from(buf, &mut sent);
        if result.is_err() && sent > 0 {
            tracing::warn!(sent, len = buf.len(), "frame partly written, debug link unusable");
            self.misaligned = true;
        }
        result
    }

    fn write_from(&mut self, mut buf: &[u8], sent: &mut usize) -> Result<()> {
        let deadline = Instant::now() + WRITE_STALL_LIMIT;
        while !buf.is_empty() {
            match self.stream.write(buf) {
                Ok(0) => {
                    return Err(Error::Connection("debug link accepted no data".into()));
                }
                Ok(n) => {
                    *sent += n;
                    buf = &buf[n..];
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(Error::Io(io::Error::new(
                            ErrorKind::TimedOut,
                            "debug link write stalled",
                        )));
                    }
                    thread::sleep(WRITE_RETRY_DELAY);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
