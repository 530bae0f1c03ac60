//! Register map of the debug modules.
//!
//! Offsets are word registers relative to each module. Every module implements
//! `MODULE_ID`; the remaining registers are class-specific.

/// Module identification: type code in bits 31:16, version in bits 15:0.
pub const MODULE_ID: u16 = 0x0;

/// Splits a `MODULE_ID` word into (type code, version).
pub const fn split_module_id(word: u32) -> (u16, u16) {
    ((word >> 16) as u16, (word & 0xffff) as u16)
}

/// Builds a `MODULE_ID` word from a type code and version.
pub const fn module_id(type_code: u16, version: u16) -> u32 {
    ((type_code as u32) << 16) | version as u32
}

/// Core-Trace Monitor registers; the lowest-addressed CTM carries system control.
pub mod ctm {
    /// System identifier of the platform build.
    pub const SYSTEM_ID: u16 = 0x1;
    /// CPU control register.
    pub const CPU_CTRL: u16 = 0x2;
    /// Total system clock cycles since reset.
    pub const CLK_TOTAL: u16 = 0x3;
    /// Clock cycles spent with the cores halted.
    pub const CLK_HALTED: u16 = 0x4;
    /// Writing `SYS_RESET_TRIGGER` resets the whole platform.
    pub const SYS_RESET: u16 = 0x5;

    /// `CPU_CTRL`: hold all cores stalled.
    pub const CTRL_STALL: u32 = 1 << 0;
    /// `CPU_CTRL`: hold all cores in reset.
    pub const CTRL_RESET: u32 = 1 << 1;
    /// `CPU_CTRL`: release all cores and start execution.
    pub const CTRL_START: u32 = 1 << 2;

    /// Value written to `SYS_RESET`.
    pub const SYS_RESET_TRIGGER: u32 = 1;
}

/// Instruction-Trace Monitor registers.
pub mod itm {
    /// Id of the traced core.
    pub const CORE_ID: u16 = 0x1;
}

/// Software Trace Monitor registers.
pub mod stm {
    /// Id of the traced core.
    pub const CORE_ID: u16 = 0x1;
}

/// Network Rate Monitor registers.
pub mod nrm {
    /// Id of the monitored router.
    pub const ROUTER_ID: u16 = 0x1;
    /// Cycles between two utilization samples.
    pub const SAMPLE_INTERVAL: u16 = 0x2;
    /// Number of links the monitor observes.
    pub const MONITORED_LINKS: u16 = 0x3;
}

/// Memory Access Module registers.
pub mod mam {
    /// Id of the memory behind the module.
    pub const MEMORY_ID: u16 = 0x1;
    /// Data words the module moves per transaction.
    pub const BURST_WORDS: u16 = 0x2;
    /// Memory byte address of the next transaction.
    pub const ADDR: u16 = 0x3;
    /// Byte length of the next transaction.
    pub const LEN: u16 = 0x4;
    /// Data window; consecutive words map to consecutive memory words.
    pub const DATA: u16 = 0x5;
}
