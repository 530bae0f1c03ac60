//! Debug-network wire protocol.
//!
//! This module turns register operations and trace events into transport packets and back. It provides:
//! 1. **Frames:** The fixed 12-byte header plus word payload carried by one packet.
//! 2. **Messages:** Logical requests, responses, and events, split into fragments when long.
//! 3. **Reassembly:** In-order fragment collection keyed by address and tag, with expiry.
//!
//! The codec is public so that simulators and test targets can speak the device side.

/// Frame layout, kinds, and message fragmentation.
pub mod frame;
/// Fragment reassembly.
pub mod reassembly;

pub use frame::{FLAG_MORE, Frame, FrameKind, HEADER_LEN, MAX_FRAGMENT_WORDS, Message};
pub use reassembly::Reassembler;
