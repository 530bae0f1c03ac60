//! Session context.
//!
//! A `Context` is one host-side session with one debug network. It provides:
//! 1. **Lifecycle:** Construction with a backend, `connect` (which runs discovery),
//!    `disconnect`, and `destroy`.
//! 2. **Topology:** The module registry, the system id, and module configuration.
//! 3. **Platform control:** Register, memory, and CPU operations.
//! 4. **Trace:** Per-class event callbacks and the background collector that feeds them.
//! 5. **Logging:** The session's sink and severity threshold.
//!
//! Lifecycle operations take `&mut self`. Everything else takes `&self`, and the context is
//! `Sync`, so several application threads may issue requests through one shared context;
//! the link serializes them.
//!
//! # Examples
//!
//! ```no_run
//! use dbgnoc_host::{BackendKind, BackendOption, Context};
//!
//! # fn main() -> dbgnoc_host::Result<()> {
//! let options = [BackendOption::new("host", "localhost"), BackendOption::new("port", "22000")];
//! let mut ctx = Context::new(BackendKind::SimTcp, &options)?;
//! ctx.connect()?;
//! for module in ctx.modules() {
//!     println!("{module}");
//! }
//! ctx.cpu_start()?;
//! ctx.destroy()
//! # }
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::backend::{Backend, create_backend};
use crate::config::{BackendKind, BackendOption, SessionConfig};
use crate::debug::discovery;
use crate::debug::{DebugModule, ItmConfig, MamConfig, Registry};
use crate::engine::cpu::{self, ClockStats};
use crate::engine::link::{Link, lock};
use crate::engine::memory;
use crate::error::{Error, Result};
use crate::loader;
use crate::log::{LogSink, Logger, log_err, log_info, log_warn};
use crate::trace::collector::{Collector, CollectorState};
use crate::trace::{ItmEvent, NrmEvent, StmEvent, monitor};

/// One session with a debug network.
#[derive(Debug)]
pub struct Context {
    kind: Option<BackendKind>,
    config: SessionConfig,
    logger: Arc<Logger>,
    link: Arc<Link>,
    registry: Registry,
    collector: Mutex<Collector>,
    connected: bool,
}

impl Context {
    /// Creates an unconnected session using one of the shipped backends.
    ///
    /// # Arguments
    ///
    /// * `kind` - Transport to use.
    /// * `options` - Backend options, validated here.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for an unknown or malformed option.
    pub fn new(kind: BackendKind, options: &[BackendOption]) -> Result<Self> {
        Self::with_config(kind, options, SessionConfig::default())
    }

    /// Like [`Context::new`], with explicit timings.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for an unknown or malformed option.
    pub fn with_config(
        kind: BackendKind,
        options: &[BackendOption],
        config: SessionConfig,
    ) -> Result<Self> {
        let backend = create_backend(kind, options)?;
        Ok(Self::build(Some(kind), backend, config))
    }

    /// Creates an unconnected session over a caller-provided backend.
    pub fn with_backend(backend: Box<dyn Backend>, config: SessionConfig) -> Self {
        Self::build(None, backend, config)
    }

    fn build(kind: Option<BackendKind>, backend: Box<dyn Backend>, config: SessionConfig) -> Self {
        let logger = Arc::new(Logger::from_env(config.log_priority));
        let link = Arc::new(Link::new(backend, Arc::clone(&logger), &config));
        Self {
            kind,
            config,
            logger,
            link,
            registry: Registry::new(),
            collector: Mutex::new(Collector::new()),
            connected: false,
        }
    }

    /// Backend kind, or `None` for a caller-provided backend.
    pub const fn backend_kind(&self) -> Option<BackendKind> {
        self.kind
    }

    /// Timings the session was created with.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns `true` between a successful `connect` and the next `disconnect`.
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    // ══════════════════════════════════════════════════════════
    // Lifecycle
    // ══════════════════════════════════════════════════════════

    /// Connects the backend and discovers the system.
    ///
    /// If trace callbacks were registered beforehand, the collector starts once discovery
    /// has finished. Connecting an already connected session does nothing.
    ///
    /// # Errors
    ///
    /// `Error::Connection` if the medium is unreachable; any discovery error. On failure the
    /// backend is disconnected again and the session stays unconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        // A failure from an earlier connection has nothing to say about this one.
        let _stale = lock(&self.collector).take_failure();
        self.link.reset_inbound();
        self.link.with_backend(|backend| backend.connect())?;

        let registry = match discovery::discover(&self.link, &self.config) {
            Ok(registry) => registry,
            Err(e) => {
                log_err!(self.logger, "discovery failed: {e}");
                self.release_backend();
                return Err(e);
            }
        };
        self.registry = registry;
        self.connected = true;

        if self.link.dispatcher().has_callbacks() {
            let started = lock(&self.collector).start(&self.link);
            if let Err(e) = started {
                if let Err(cleanup) = self.disconnect() {
                    log_warn!(self.logger, "disconnect after collector start failure: {cleanup}");
                }
                return Err(e);
            }
        }
        log_info!(
            self.logger,
            "connected, {} debug modules",
            self.registry.len()
        );
        Ok(())
    }

    /// Stops the collector, then disconnects the backend.
    ///
    /// The collector thread is joined before the backend is released; once this returns no
    /// trace callback is running or will be invoked. The registry is cleared, and the
    /// session may be connected again.
    ///
    /// # Errors
    ///
    /// Errors of the backend's own disconnect. The session is disconnected regardless.
    pub fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        lock(&self.collector).stop(&self.link);
        self.connected = false;
        self.registry.clear();
        let result = self.link.with_backend(|backend| backend.disconnect());
        self.link.reset_inbound();
        log_info!(self.logger, "disconnected");
        result
    }

    /// Disconnects if needed and releases the session.
    ///
    /// # Errors
    ///
    /// Errors of [`Context::disconnect`].
    pub fn destroy(mut self) -> Result<()> {
        self.disconnect()
    }

    fn release_backend(&self) {
        if let Err(e) = self.link.with_backend(|backend| backend.disconnect()) {
            log_warn!(self.logger, "backend disconnect failed: {e}");
        }
        self.link.reset_inbound();
    }

    /// Returns an error unless the session is usable for requests.
    ///
    /// A collector failure is reported here exactly once.
    fn ensure_connected(&self) -> Result<()> {
        if !self.connected {
            return Err(Error::Connection("session is not connected".into()));
        }
        let failure = lock(&self.collector).take_failure();
        failure.map_or(Ok(()), |e| Err(Error::CollectorFailed(Box::new(e))))
    }

    fn ensure_discovered(&self) -> Result<&Registry> {
        self.ensure_connected()?;
        if self.registry.is_empty() {
            return Err(Error::Configuration(
                "system is not discovered; call discover_system first".into(),
            ));
        }
        Ok(&self.registry)
    }

    // ══════════════════════════════════════════════════════════
    // Logging
    // ══════════════════════════════════════════════════════════

    /// Routes this session's log records to `sink`.
    pub fn set_log_sink(&self, sink: impl LogSink + 'static) {
        self.logger.set_sink(Arc::new(sink));
    }

    /// Current log threshold (syslog numbering; records at or below it are delivered).
    pub fn log_priority(&self) -> i32 {
        self.logger.threshold()
    }

    /// Replaces the log threshold.
    pub fn set_log_priority(&self, priority: i32) {
        self.logger.set_threshold(priority);
    }

    // ══════════════════════════════════════════════════════════
    // Topology
    // ══════════════════════════════════════════════════════════

    /// Walks the debug network unless the registry is already populated.
    ///
    /// `connect` discovers the system itself; this is needed again after [`Context::reset`].
    ///
    /// # Errors
    ///
    /// `Error::Connection` when unconnected, otherwise any discovery error; the registry
    /// stays empty on failure.
    pub fn discover_system(&mut self) -> Result<()> {
        self.ensure_connected()?;
        if !self.registry.is_empty() {
            return Ok(());
        }
        self.registry = discovery::discover(&self.link, &self.config)?;
        Ok(())
    }

    /// Discovered modules in address order; empty before discovery.
    pub fn modules(&self) -> &[DebugModule] {
        self.registry.modules()
    }

    /// The module registry.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Reads the platform's system identifier.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` without a Core-Trace Monitor, or any request error.
    pub fn system_id(&self) -> Result<u32> {
        cpu::system_id(&self.link, self.ensure_discovered()?)
    }

    /// Reads the configuration of an Instruction-Trace Monitor.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if `module` is unknown to the session or not an ITM.
    pub fn itm_get_config(&self, module: &DebugModule) -> Result<ItmConfig> {
        let module = self.ensure_discovered()?.require(module.addr)?;
        monitor::itm_config(&self.link, module)
    }

    /// Reads the configuration of a Memory Access Module.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if `module` is unknown to the session or not a MAM.
    pub fn mam_get_config(&self, module: &DebugModule) -> Result<MamConfig> {
        let module = self.ensure_discovered()?.require(module.addr)?;
        memory::mam_config(&self.link, module)
    }

    // ══════════════════════════════════════════════════════════
    // Register access
    // ══════════════════════════════════════════════════════════

    /// Reads `count` consecutive registers of the module at `addr`.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` for an address without a module, `Error::InvalidArgument`
    /// for `count == 0`, or any request error.
    pub fn reg_read(&self, addr: u16, reg: u16, count: u16) -> Result<Vec<u32>> {
        let _module = self.ensure_discovered()?.require(addr)?;
        self.link.read(addr, reg, count)
    }

    /// Writes `words` to consecutive registers of the module at `addr`.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` for an address without a module, `Error::InvalidArgument`
    /// for an empty or oversized `words`, or any request error.
    pub fn reg_write(&self, addr: u16, reg: u16, words: &[u32]) -> Result<()> {
        let _module = self.ensure_discovered()?.require(addr)?;
        self.link.write(addr, reg, words)
    }

    // ══════════════════════════════════════════════════════════
    // Memory
    // ══════════════════════════════════════════════════════════

    /// Reads `len` bytes of memory `memory_id` from byte address `base`.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if no MAM serves the memory, `Error::Transfer` with the
    /// completed byte count if a chunk fails.
    pub fn mem_read(&self, memory_id: u32, base: u32, len: usize) -> Result<Vec<u8>> {
        memory::read(&self.link, self.ensure_discovered()?, memory_id, base, len)
    }

    /// Writes `data` to memory `memory_id` from byte address `base`.
    ///
    /// # Errors
    ///
    /// Same as [`Context::mem_read`].
    pub fn mem_write(&self, memory_id: u32, base: u32, data: &[u8]) -> Result<()> {
        memory::write(&self.link, self.ensure_discovered()?, memory_id, base, data)
    }

    /// Loads `data` at address 0 of every memory in `memory_ids`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for an empty id list; the first failing memory's error.
    pub fn mem_init(&self, memory_ids: &[u32], data: &[u8]) -> Result<()> {
        memory::init(&self.link, self.ensure_discovered()?, memory_ids, data)
    }

    /// Loads an ELF or raw binary image into every memory in `memory_ids`.
    ///
    /// ELF images are placed at their link address, raw binaries at address 0.
    ///
    /// # Errors
    ///
    /// Loader errors, then the same errors as [`Context::mem_write`].
    pub fn mem_init_image(&self, memory_ids: &[u32], path: impl AsRef<Path>) -> Result<()> {
        let registry = self.ensure_discovered()?;
        if memory_ids.is_empty() {
            return Err(Error::InvalidArgument(
                "memory initialization needs at least one memory id".into(),
            ));
        }
        let image = loader::load_image(path)?;
        for &memory_id in memory_ids {
            memory::write(&self.link, registry, memory_id, image.base, &image.data)?;
        }
        log_info!(
            self.logger,
            "loaded {} byte image at {:#010x} into {} memories",
            image.data.len(),
            image.base,
            memory_ids.len()
        );
        Ok(())
    }

    // ══════════════════════════════════════════════════════════
    // CPU control
    // ══════════════════════════════════════════════════════════

    /// Asserts (`true`) or releases (`false`) the stall of all cores.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` without a Core-Trace Monitor, or any request error.
    pub fn cpu_stall(&self, stall: bool) -> Result<()> {
        cpu::stall(&self.link, self.ensure_discovered()?, stall)
    }

    /// Holds all cores in reset.
    ///
    /// # Errors
    ///
    /// Same as [`Context::cpu_stall`].
    pub fn cpu_reset(&self) -> Result<()> {
        cpu::reset(&self.link, self.ensure_discovered()?)
    }

    /// Starts all cores.
    ///
    /// # Errors
    ///
    /// Same as [`Context::cpu_stall`].
    pub fn cpu_start(&self) -> Result<()> {
        cpu::start(&self.link, self.ensure_discovered()?)
    }

    /// Reads total and halted clock cycles.
    ///
    /// # Errors
    ///
    /// Same as [`Context::cpu_stall`].
    pub fn read_clkstats(&self) -> Result<ClockStats> {
        cpu::clock_stats(&self.link, self.ensure_discovered()?)
    }

    /// Resets the whole platform.
    ///
    /// The debug modules reset too, so the registry is cleared and
    /// [`Context::discover_system`] must be called before further requests.
    ///
    /// # Errors
    ///
    /// Same as [`Context::cpu_stall`]; the registry is kept if the reset write fails.
    pub fn reset(&mut self) -> Result<()> {
        cpu::system_reset(&self.link, self.ensure_discovered()?)?;
        self.registry.clear();
        Ok(())
    }

    // ══════════════════════════════════════════════════════════
    // Trace
    // ══════════════════════════════════════════════════════════

    /// Registers the instruction-trace callback, replacing any previous one.
    ///
    /// Callbacks run on the collector thread and must not issue requests on this session:
    /// the collector cannot deliver their responses while it is inside the callback.
    /// Events that arrive while no collector is running, such as after it stopped on a
    /// receive failure, are discarded.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the collector thread cannot be started.
    pub fn itm_register_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&ItmEvent) + Send + Sync + 'static,
    {
        self.link.dispatcher().set_itm(Arc::new(callback));
        self.start_collector()
    }

    /// Registers the network-rate callback, replacing any previous one.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the collector thread cannot be started.
    pub fn nrm_register_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&NrmEvent) + Send + Sync + 'static,
    {
        self.link.dispatcher().set_nrm(Arc::new(callback));
        self.start_collector()
    }

    /// Registers the software-trace callback, replacing any previous one.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the collector thread cannot be started.
    pub fn stm_register_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&StmEvent) + Send + Sync + 'static,
    {
        self.link.dispatcher().set_stm(Arc::new(callback));
        self.start_collector()
    }

    /// Sets the sampling interval of every Network Rate Monitor.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if no NRM was discovered, or any request error.
    pub fn nrm_set_sample_interval(&self, interval: u32) -> Result<()> {
        monitor::set_sample_interval(&self.link, self.ensure_discovered()?, interval)
    }

    /// Current state of the trace collector.
    pub fn collector_state(&self) -> CollectorState {
        lock(&self.collector).state()
    }

    fn start_collector(&self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        lock(&self.collector).start(&self.link)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log_err!(self.logger, "disconnect on drop failed: {e}");
        }
    }
}
