//! Request engines layered on the debug link.
//!
//! This module turns register transactions into platform operations. It provides:
//! 1. **Link:** The serialized request/response primitive every other engine composes from.
//! 2. **Memory:** Chunked reads and writes of target memory through Memory Access Modules.
//! 3. **CPU control:** Stall, reset, and start of the cores plus clock statistics.

/// CPU control through the system Core-Trace Monitor.
pub mod cpu;
/// Shared debug link and register transactions.
pub(crate) mod link;
/// Memory transfers through Memory Access Modules.
pub mod memory;

pub use cpu::ClockStats;
