//! Transport backends for the debug network.
//!
//! This module hides whether the debug link is real hardware or a simulator. It provides:
//! 1. **Packets:** `Packet`, the untyped unit a backend moves (one encoded frame).
//! 2. **Contract:** The `Backend` trait (connect, disconnect, send, non-blocking receive).
//! 3. **Framing:** `FrameStream`, the length-prefixed framing both shipped backends share.
//! 4. **Implementations:** `SimTcpBackend` and `DbgNocBackend`, built by `create_backend`.
//!
//! Backends are owned by exactly one session and are only touched under that session's
//! link lock, so implementations need to be `Send` but not `Sync`.

use std::fmt;

use crate::config::{BackendKind, BackendOption};
use crate::error::Result;

/// Character-device backend for a physical or emulated debug network.
pub mod dbgnoc;
/// Length-prefixed packet framing over byte streams.
pub mod framing;
/// TCP backend for software simulators.
pub mod simtcp;

pub use dbgnoc::DbgNocBackend;
pub use framing::FrameStream;
pub use simtcp::SimTcpBackend;

/// One transport packet: the bytes of a single encoded frame.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Packet {
    data: Vec<u8>,
}

impl Packet {
    /// Wraps raw packet bytes.
    pub const fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Packet bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the packet and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-length packet.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet({} bytes: {:02x?})", self.data.len(), self.data)
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Transport to the debug network.
///
/// Implementations must accept arbitrarily interleaved `send` and `try_receive` calls;
/// the session never assumes which backend is active.
pub trait Backend: Send {
    /// Opens the underlying medium.
    ///
    /// # Errors
    ///
    /// `Error::Connection` if the medium is unreachable.
    fn connect(&mut self) -> Result<()>;

    /// Closes the underlying medium. Disconnecting an unconnected backend is not an error.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the medium fails to shut down cleanly.
    fn disconnect(&mut self) -> Result<()>;

    /// Sends one packet.
    ///
    /// # Errors
    ///
    /// `Error::Io` on transport fault, `Error::Connection` if not connected.
    fn send(&mut self, packet: &Packet) -> Result<()>;

    /// Returns the next complete inbound packet, or `None` if nothing is pending.
    ///
    /// Never blocks waiting for data.
    ///
    /// # Errors
    ///
    /// `Error::Io` on transport fault, `Error::Connection` if the link dropped.
    fn try_receive(&mut self) -> Result<Option<Packet>>;
}

/// Builds the backend for `kind`, validating its options.
///
/// # Arguments
///
/// * `kind` - Which transport to build.
/// * `options` - Backend-specific name/value pairs, applied in order.
///
/// # Errors
///
/// `Error::InvalidArgument` for unknown option names or unparsable values.
pub fn create_backend(kind: BackendKind, options: &[BackendOption]) -> Result<Box<dyn Backend>> {
    Ok(match kind {
        BackendKind::SimTcp => Box::new(SimTcpBackend::from_options(options)?),
        BackendKind::DbgNoc => Box::new(DbgNocBackend::from_options(options)?),
    })
}
