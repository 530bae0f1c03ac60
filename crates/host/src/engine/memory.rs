//! Memory access through Memory Access Modules (MAMs).
//!
//! A MAM moves at most `BURST_WORDS` words per transaction. Each chunk programs the
//! module's `ADDR`/`LEN` pair in one two-word write and then moves the data through the
//! auto-incrementing `DATA` window. Bytes are packed little-endian into words; a short
//! final word is zero-padded on the way out and truncated on the way back.

use crate::debug::regs;
use crate::debug::{DebugModule, MamConfig, ModuleType, Registry};
use crate::engine::link::Link;
use crate::error::{Error, Result};
use crate::log::{log_dbg, log_info};
use crate::protocol::frame::MAX_MESSAGE_WORDS;

/// Bytes per data word.
const WORD_BYTES: usize = 4;

/// Reads the configuration registers of a MAM.
///
/// # Errors
///
/// `Error::Configuration` if `module` is not a MAM, otherwise any register access error.
pub(crate) fn mam_config(link: &Link, module: &DebugModule) -> Result<MamConfig> {
    if module.module_type != ModuleType::Mam {
        return Err(Error::Configuration(format!(
            "{module} is not a memory access module"
        )));
    }
    let memory_id = link.read_word(module.addr, regs::mam::MEMORY_ID)?;
    Ok(MamConfig { memory_id })
}

/// Finds the MAM that serves `memory_id`.
///
/// # Errors
///
/// `Error::Configuration` if no discovered MAM reports that memory id.
pub(crate) fn find_mam(link: &Link, registry: &Registry, memory_id: u32) -> Result<DebugModule> {
    for module in registry.of_type(ModuleType::Mam) {
        if mam_config(link, module)?.memory_id == memory_id {
            return Ok(*module);
        }
    }
    Err(Error::Configuration(format!(
        "no memory access module serves memory {memory_id}"
    )))
}

/// Reads `len` bytes from `memory_id` starting at byte address `base`.
///
/// # Errors
///
/// `Error::InvalidArgument` if the range leaves the 32-bit address space,
/// `Error::Configuration` if the memory has no MAM, and `Error::Transfer` when a chunk
/// fails after the transfer started.
pub(crate) fn read(
    link: &Link,
    registry: &Registry,
    memory_id: u32,
    base: u32,
    len: usize,
) -> Result<Vec<u8>> {
    check_range(base, len)?;
    let mut data = Vec::with_capacity(len);
    if len == 0 {
        return Ok(data);
    }
    let mam = find_mam(link, registry, memory_id)?;
    let burst = burst_bytes(link, &mam)?;

    while data.len() < len {
        let offset = data.len();
        let chunk = burst.min(len - offset);
        let bytes = read_chunk(link, mam.addr, base + offset as u32, chunk).map_err(|e| {
            Error::Transfer {
                memory_id,
                completed: offset,
                source: Box::new(e),
            }
        })?;
        data.extend_from_slice(&bytes);
    }
    log_dbg!(
        link.logger(),
        "read {len} bytes from memory {memory_id} at {base:#010x}"
    );
    Ok(data)
}

/// Writes `data` to `memory_id` starting at byte address `base`.
///
/// # Errors
///
/// Same as [`read`]; `Error::Transfer::completed` counts the bytes known to be written.
pub(crate) fn write(
    link: &Link,
    registry: &Registry,
    memory_id: u32,
    base: u32,
    data: &[u8],
) -> Result<()> {
    check_range(base, data.len())?;
    if data.is_empty() {
        return Ok(());
    }
    let mam = find_mam(link, registry, memory_id)?;
    let burst = burst_bytes(link, &mam)?;

    for (index, chunk) in data.chunks(burst).enumerate() {
        let offset = index * burst;
        write_chunk(link, mam.addr, base + offset as u32, chunk).map_err(|e| {
            Error::Transfer {
                memory_id,
                completed: offset,
                source: Box::new(e),
            }
        })?;
    }
    log_dbg!(
        link.logger(),
        "wrote {} bytes to memory {memory_id} at {base:#010x}",
        data.len()
    );
    Ok(())
}

/// Loads identical content at address 0 of every memory in `memory_ids`.
///
/// Memories are written in the given order; the first failure stops the load and names
/// the memory it happened on.
///
/// # Errors
///
/// `Error::InvalidArgument` for an empty id list, otherwise any error of [`write`].
pub(crate) fn init(
    link: &Link,
    registry: &Registry,
    memory_ids: &[u32],
    data: &[u8],
) -> Result<()> {
    if memory_ids.is_empty() {
        return Err(Error::InvalidArgument(
            "memory initialization needs at least one memory id".into(),
        ));
    }
    for &memory_id in memory_ids {
        write(link, registry, memory_id, 0, data)?;
    }
    log_info!(
        link.logger(),
        "initialized {} memories with {} bytes",
        memory_ids.len(),
        data.len()
    );
    Ok(())
}

/// Packs bytes into little-endian words, zero-padding the last one.
pub fn pack_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(WORD_BYTES)
        .map(|chunk| {
            let mut word = [0u8; WORD_BYTES];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}

/// Unpacks little-endian words into at most `len` bytes.
pub fn unpack_words(words: &[u32], len: usize) -> Vec<u8> {
    words
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .take(len)
        .collect()
}

fn check_range(base: u32, len: usize) -> Result<()> {
    let end = u64::from(base) + len as u64;
    if end > 1 << 32 {
        return Err(Error::InvalidArgument(format!(
            "{len} bytes at {base:#010x} exceed the 32-bit address space"
        )));
    }
    Ok(())
}

/// Bytes a MAM moves per transaction.
fn burst_bytes(link: &Link, mam: &DebugModule) -> Result<usize> {
    let words = link.read_word(mam.addr, regs::mam::BURST_WORDS)? as usize;
    if words == 0 {
        return Err(Error::Protocol(format!("{mam} reports a zero burst size")));
    }
    Ok(words.min(MAX_MESSAGE_WORDS) * WORD_BYTES)
}

fn read_chunk(link: &Link, mam_addr: u16, addr: u32, len: usize) -> Result<Vec<u8>> {
    link.write(mam_addr, regs::mam::ADDR, &[addr, len as u32])?;
    let words = link.read(mam_addr, regs::mam::DATA, len.div_ceil(WORD_BYTES) as u16)?;
    Ok(unpack_words(&words, len))
}

fn write_chunk(link: &Link, mam_addr: u16, addr: u32, chunk: &[u8]) -> Result<()> {
    link.write(mam_addr, regs::mam::ADDR, &[addr, chunk.len() as u32])?;
    link.write(mam_addr, regs::mam::DATA, &pack_words(chunk))
}
