//! Host-side control and observation of a many-core platform over its debug network.
//!
//! This crate talks to the debug modules of a chip (or its simulator) with the following:
//! 1. **Backends:** A hardware debug-network device and a simulator reachable over TCP,
//!    behind one `Backend` trait.
//! 2. **Protocol:** Frame codec and reassembly of multi-frame register messages.
//! 3. **Discovery:** Enumeration and classification of the debug modules.
//! 4. **Control:** Register access, chunked memory transfers, and CPU stall/reset/start.
//! 5. **Trace:** A background collector that delivers decoded trace events to callbacks.
//! 6. **Logging:** A per-session pluggable sink with a syslog-style severity threshold.
//!
//! Everything is driven through a [`Context`].

/// Transports reaching the debug network.
pub mod backend;
/// Session timings and backend selection.
pub mod config;
/// Debug modules, register map, and discovery.
pub mod debug;
/// Register, memory, and CPU request engines.
pub mod engine;
/// Error taxonomy.
pub mod error;
/// ELF and raw image loading.
pub mod loader;
/// Session logging.
pub mod log;
/// Wire frames and reassembly.
pub mod protocol;
/// Session context.
pub mod session;
/// Trace events and collection.
pub mod trace;

/// Transport trait; implement it to reach the debug network another way.
pub use crate::backend::Backend;
/// Backend selection and its untyped options.
pub use crate::config::{BackendKind, BackendOption, SessionConfig};
/// Discovered module descriptors.
pub use crate::debug::{DebugModule, ItmConfig, MamConfig, ModuleType, module_name};
/// Clock counters returned by `Context::read_clkstats`.
pub use crate::engine::ClockStats;
/// Crate error and result types.
pub use crate::error::{Error, Result};
/// Log record types accepted by `Context::set_log_sink`.
pub use crate::log::{LogRecord, LogSink, Priority};
/// The session handle.
pub use crate::session::Context;
/// Trace events delivered to callbacks.
pub use crate::trace::{CollectorState, ItmEvent, NrmEvent, StmEvent};

/// Version of this library, independent of any session.
pub const fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
