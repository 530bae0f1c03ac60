//! CPU control and system registers.
//!
//! All operations address the system control module: the lowest-addressed Core-Trace
//! Monitor. Each control operation is exactly one `CPU_CTRL` write.

use crate::debug::regs::ctm;
use crate::debug::{DebugModule, ModuleType, Registry};
use crate::engine::link::Link;
use crate::error::{Error, Result};
use crate::log::{log_info, log_warn};

/// Clock cycle counters of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClockStats {
    /// Cycles since the last reset.
    pub total: u32,
    /// Cycles during which the cores were halted.
    pub halted: u32,
}

impl ClockStats {
    /// Cycles during which the cores were running.
    pub const fn running(&self) -> u32 {
        self.total.saturating_sub(self.halted)
    }
}

/// Returns the module carrying system control.
///
/// # Errors
///
/// `Error::Configuration` if discovery found no Core-Trace Monitor.
pub(crate) fn system_ctm(registry: &Registry) -> Result<&DebugModule> {
    registry.first_of_type(ModuleType::Ctm).ok_or_else(|| {
        Error::Configuration("no core-trace monitor provides system control".into())
    })
}

/// Asserts (`true`) or releases (`false`) the stall of all cores.
pub(crate) fn stall(link: &Link, registry: &Registry, stall: bool) -> Result<()> {
    let value = if stall { ctm::CTRL_STALL } else { 0 };
    write_ctrl(link, registry, value)?;
    log_info!(
        link.logger(),
        "cores {}",
        if stall { "stalled" } else { "released" }
    );
    Ok(())
}

/// Puts all cores in reset; they stay stalled until started.
pub(crate) fn reset(link: &Link, registry: &Registry) -> Result<()> {
    write_ctrl(link, registry, ctm::CTRL_RESET | ctm::CTRL_STALL)?;
    log_info!(link.logger(), "cores reset");
    Ok(())
}

/// Starts execution on all cores.
pub(crate) fn start(link: &Link, registry: &Registry) -> Result<()> {
    write_ctrl(link, registry, ctm::CTRL_START)?;
    log_info!(link.logger(), "cores started");
    Ok(())
}

/// Reads the platform's system identifier.
pub(crate) fn system_id(link: &Link, registry: &Registry) -> Result<u32> {
    let module = system_ctm(registry)?;
    link.read_word(module.addr, ctm::SYSTEM_ID)
}

/// Reads both clock counters in one request.
pub(crate) fn clock_stats(link: &Link, registry: &Registry) -> Result<ClockStats> {
    let module = system_ctm(registry)?;
    match link.read(module.addr, ctm::CLK_TOTAL, 2)?.as_slice() {
        &[total, halted] => Ok(ClockStats { total, halted }),
        other => Err(Error::Protocol(format!(
            "clock statistics response holds {} words",
            other.len()
        ))),
    }
}

/// Triggers a reset of the whole platform, debug modules included.
pub(crate) fn system_reset(link: &Link, registry: &Registry) -> Result<()> {
    let module = system_ctm(registry)?;
    link.write(module.addr, ctm::SYS_RESET, &[ctm::SYS_RESET_TRIGGER])?;
    log_warn!(link.logger(), "system reset issued");
    Ok(())
}

fn write_ctrl(link: &Link, registry: &Registry, value: u32) -> Result<()> {
    let module = system_ctm(registry)?;
    link.write(module.addr, ctm::CPU_CTRL, &[value])
}
