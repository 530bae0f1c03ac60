//! Configuration registers of the trace monitors.

use crate::debug::regs::{itm, nrm};
use crate::debug::{DebugModule, ItmConfig, ModuleType, Registry};
use crate::engine::link::Link;
use crate::error::{Error, Result};
use crate::log::log_info;

/// Reads which core an Instruction-Trace Monitor observes.
///
/// # Errors
///
/// `Error::Configuration` if `module` is not an ITM.
pub(crate) fn itm_config(link: &Link, module: &DebugModule) -> Result<ItmConfig> {
    if module.module_type != ModuleType::Itm {
        return Err(Error::Configuration(format!(
            "{module} is not an instruction-trace monitor"
        )));
    }
    let core_id = link.read_word(module.addr, itm::CORE_ID)?;
    Ok(ItmConfig { core_id })
}

/// Programs the sample interval of every Network Rate Monitor.
///
/// # Errors
///
/// `Error::Configuration` if discovery found no NRM; the first failed write is returned
/// and later monitors keep their old interval.
pub(crate) fn set_sample_interval(link: &Link, registry: &Registry, interval: u32) -> Result<()> {
    let mut programmed = 0usize;
    for module in registry.of_type(ModuleType::Nrm) {
        link.write(module.addr, nrm::SAMPLE_INTERVAL, &[interval])?;
        programmed += 1;
    }
    if programmed == 0 {
        return Err(Error::Configuration(
            "no network rate monitor was discovered".into(),
        ));
    }
    log_info!(
        link.logger(),
        "sample interval {interval} set on {programmed} network rate monitors"
    );
    Ok(())
}
