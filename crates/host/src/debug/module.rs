//! Debug module descriptors and the module registry.

use std::fmt;

use crate::error::{Error, Result};

/// Class of a debug module, as reported by its `MODULE_ID` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    /// Core-Trace Monitor; also carries system control registers.
    Ctm,
    /// Instruction-Trace Monitor.
    Itm,
    /// Network Rate Monitor.
    Nrm,
    /// Network Congestion Monitor.
    Ncm,
    /// Software Trace Monitor.
    Stm,
    /// Memory Access Module.
    Mam,
    /// Reserved or not yet known type code, kept for forward compatibility.
    Unknown(u16),
}

impl ModuleType {
    /// Maps a type code to a module type; unassigned codes become `Unknown`.
    pub const fn from_code(code: u16) -> Self {
        match code {
            0x01 => Self::Ctm,
            0x02 => Self::Itm,
            0x03 => Self::Nrm,
            0x04 => Self::Ncm,
            0x05 => Self::Stm,
            0x07 => Self::Mam,
            other => Self::Unknown(other),
        }
    }

    /// Type code on the wire.
    pub const fn code(self) -> u16 {
        match self {
            Self::Ctm => 0x01,
            Self::Itm => 0x02,
            Self::Nrm => 0x03,
            Self::Ncm => 0x04,
            Self::Stm => 0x05,
            Self::Mam => 0x07,
            Self::Unknown(code) => code,
        }
    }

    /// Short name (`"ITM"`, `"MAM"`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ctm => "CTM",
            Self::Itm => "ITM",
            Self::Nrm => "NRM",
            Self::Ncm => "NCM",
            Self::Stm => "STM",
            Self::Mam => "MAM",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    /// Long descriptive name.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ctm => "Core-Trace Monitor",
            Self::Itm => "Instruction-Trace Monitor",
            Self::Nrm => "Network Rate Monitor",
            Self::Ncm => "Network Congestion Monitor",
            Self::Stm => "Software Trace Monitor",
            Self::Mam => "Memory Access Module",
            Self::Unknown(_) => "Unknown module",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "UNKNOWN({code:#06x})"),
            known => f.write_str(known.name()),
        }
    }
}

/// Human-readable short name for a raw module type code.
///
/// # Examples
///
/// ```
/// assert_eq!(dbgnoc_host::module_name(0x07), "MAM");
/// assert_eq!(dbgnoc_host::module_name(0x42), "UNKNOWN");
/// ```
pub const fn module_name(code: u16) -> &'static str {
    ModuleType::from_code(code).name()
}

/// One discovered debug module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DebugModule {
    /// Address in the debug network.
    pub addr: u16,
    /// Module class.
    pub module_type: ModuleType,
    /// Module implementation version.
    pub version: u16,
}

impl fmt::Display for DebugModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#06x}: {} v{}",
            self.addr, self.module_type, self.version
        )
    }
}

/// Configuration of an Instruction-Trace Monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItmConfig {
    /// Core the monitor traces.
    pub core_id: u32,
}

/// Configuration of a Memory Access Module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MamConfig {
    /// Memory the module gives access to.
    pub memory_id: u32,
}

/// Catalog of discovered modules, ordered by address, with unique addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    modules: Vec<DebugModule>,
}

impl Registry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Adds a module, keeping address order.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if a module with the same address is already present.
    pub fn insert(&mut self, module: DebugModule) -> Result<()> {
        match self.modules.binary_search_by_key(&module.addr, |m| m.addr) {
            Ok(_) => Err(Error::Configuration(format!(
                "duplicate debug module at address {:#06x}",
                module.addr
            ))),
            Err(pos) => {
                self.modules.insert(pos, module);
                Ok(())
            }
        }
    }

    /// Looks up the module at `addr`.
    pub fn get(&self, addr: u16) -> Option<&DebugModule> {
        self.modules
            .binary_search_by_key(&addr, |m| m.addr)
            .ok()
            .map(|pos| &self.modules[pos])
    }

    /// Looks up the module at `addr`, requiring it to exist.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if no module was discovered at `addr`.
    pub fn require(&self, addr: u16) -> Result<&DebugModule> {
        self.get(addr).ok_or_else(|| {
            Error::Configuration(format!("no debug module at address {addr:#06x}"))
        })
    }

    /// Modules of one class, in address order.
    pub fn of_type(&self, module_type: ModuleType) -> impl Iterator<Item = &DebugModule> + '_ {
        self.modules
            .iter()
            .filter(move |m| m.module_type == module_type)
    }

    /// Lowest-addressed module of one class.
    pub fn first_of_type(&self, module_type: ModuleType) -> Option<&DebugModule> {
        self.of_type(module_type).next()
    }

    /// All modules in address order.
    pub fn modules(&self) -> &[DebugModule] {
        &self.modules
    }

    /// Iterates all modules in address order.
    pub fn iter(&self) -> std::slice::Iter<'_, DebugModule> {
        self.modules.iter()
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if nothing has been discovered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Forgets every module.
    pub fn clear(&mut self) {
        self.modules.clear();
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a DebugModule;
    type IntoIter = std::slice::Iter<'a, DebugModule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
