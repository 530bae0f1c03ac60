//! Error taxonomy for debug-network sessions.
//!
//! This module defines the single error type returned by every fallible operation. It provides:
//! 1. **Link failures:** Connection loss and transport I/O faults.
//! 2. **Protocol failures:** Timeouts, malformed frames, and target-side rejections.
//! 3. **Usage failures:** Missing or mistyped modules and out-of-range arguments.
//! 4. **Partial transfers:** Memory operations that aborted midway, with the completed byte count.

use std::io;
use std::time::Duration;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by backends, the wire codec, and session operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend medium is unreachable, or the link dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// Transport read/write fault in the middle of an operation.
    #[error("debug link I/O error: {0}")]
    Io(#[from] io::Error),

    /// No matching response arrived before the deadline.
    #[error("no response from module {addr:#06x} (register {reg:#06x}) within {timeout:?}")]
    Timeout {
        /// Debug-network address the request was sent to.
        addr: u16,
        /// Register offset of the request.
        reg: u16,
        /// Bound that elapsed.
        timeout: Duration,
    },

    /// Malformed or unexpected frame (wrong kind, truncated payload, sequence gap).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The target answered the request with an error frame.
    #[error("module {addr:#06x} rejected access to register {reg:#06x} (status {code:#x})")]
    Rejected {
        /// Debug-network address that answered.
        addr: u16,
        /// Register offset of the rejected request.
        reg: u16,
        /// Status code carried by the error frame.
        code: u32,
    },

    /// The platform does not match what the operation needs.
    ///
    /// Raised when discovery finds no modules or a gapped address map, or when an
    /// operation addresses a module that does not exist or has the wrong type.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller-supplied size, id, or option is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A memory transfer aborted after `completed` bytes had been transferred.
    #[error("transfer on memory {memory_id} aborted after {completed} bytes: {source}")]
    Transfer {
        /// Memory the transfer addressed.
        memory_id: u32,
        /// Bytes transferred successfully before the failure.
        completed: usize,
        /// Failure of the chunk that aborted the transfer.
        #[source]
        source: Box<Error>,
    },

    /// The trace collector's receive loop died; event delivery has ended.
    #[error("trace collector stopped: {0}")]
    CollectorFailed(#[source] Box<Error>),
}

impl Error {
    /// Returns `true` for errors that end a discovery scan instead of aborting it.
    ///
    /// A silent address and an error-flagged address both mark the end of the
    /// densely packed module range.
    pub(crate) const fn ends_scan(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Rejected { .. })
    }
}
