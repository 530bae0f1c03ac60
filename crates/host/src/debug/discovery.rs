//! Discovery of the modules on the debug network.
//!
//! Modules are numbered densely from address 0 when the platform is built, so the scan
//! reads `MODULE_ID` at 0, 1, 2, ... and stops at the first address that stays silent or
//! answers with an error frame. A few addresses past that point are probed as well: a
//! module answering there means the address map has a gap, which is reported instead of
//! silently returning a truncated registry.

use crate::config::SessionConfig;
use crate::debug::module::{DebugModule, ModuleType, Registry};
use crate::debug::regs;
use crate::engine::link::Link;
use crate::error::{Error, Result};
use crate::log::{log_dbg, log_info, log_warn};

/// Walks the debug-network address space and returns the populated registry.
///
/// # Arguments
///
/// * `link` - Connected debug link.
/// * `config` - Supplies the probe timeout, address bound, and gap-probe window.
///
/// # Errors
///
/// `Error::Configuration` if address 0 does not answer or the address map has a gap;
/// transport errors (`Error::Io`, `Error::Connection`, `Error::Protocol`) abort the scan.
pub(crate) fn discover(link: &Link, config: &SessionConfig) -> Result<Registry> {
    let mut registry = Registry::new();
    let mut end = None;

    for addr in 0..config.max_modules {
        match probe(link, addr, config) {
            Ok(module) => {
                if let ModuleType::Unknown(code) = module.module_type {
                    log_warn!(
                        link.logger(),
                        "module at {addr:#06x} has unknown type code {code:#06x}"
                    );
                }
                log_dbg!(link.logger(), "found {module}");
                registry.insert(module)?;
            }
            Err(e) if e.ends_scan() => {
                log_dbg!(link.logger(), "scan ends at {addr:#06x}: {e}");
                end = Some(addr);
                break;
            }
            Err(e) => return Err(e),
        }
    }

    if registry.is_empty() {
        return Err(Error::Configuration(
            "no debug module answered at address 0x0000".into(),
        ));
    }
    if let Some(end) = end {
        check_gap(link, end, config)?;
    }
    log_info!(
        link.logger(),
        "discovered {} debug modules",
        registry.len()
    );
    Ok(registry)
}

fn probe(link: &Link, addr: u16, config: &SessionConfig) -> Result<DebugModule> {
    let words = link.read_with_timeout(addr, regs::MODULE_ID, 1, config.probe_timeout())?;
    let word = words.first().copied().ok_or_else(|| {
        Error::Protocol(format!("empty MODULE_ID response from {addr:#06x}"))
    })?;
    let (code, version) = regs::split_module_id(word);
    Ok(DebugModule {
        addr,
        module_type: ModuleType::from_code(code),
        version,
    })
}

fn check_gap(link: &Link, end: u16, config: &SessionConfig) -> Result<()> {
    let first = u32::from(end) + 1;
    let last = (u32::from(end) + u32::from(config.gap_probe_window))
        .min(u32::from(config.max_modules).saturating_sub(1));
    for addr in first..=last {
        let addr = addr as u16;
        match probe(link, addr, config) {
            Ok(module) => {
                return Err(Error::Configuration(format!(
                    "debug address map has a gap: {end:#06x} is silent but {module} answered"
                )));
            }
            Err(e) if e.ends_scan() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
