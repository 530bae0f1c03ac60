//! Debug modules and their discovery.
//!
//! This module describes what sits on the debug network. It provides:
//! 1. **Descriptors:** `ModuleType`, `DebugModule`, and per-class configuration records.
//! 2. **Registry:** The address-ordered catalog a session builds once per connection.
//! 3. **Register map:** Offsets and bit fields of every module class.
//! 4. **Discovery:** The scan that walks the address space and classifies each module.

/// Address-space scan.
pub mod discovery;
/// Module descriptors and the registry.
pub mod module;
/// Register offsets and bit fields.
pub mod regs;

pub use module::{DebugModule, ItmConfig, MamConfig, ModuleType, Registry, module_name};
