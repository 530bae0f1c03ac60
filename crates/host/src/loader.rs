//! Memory image loading.
//!
//! This module prepares program images for bulk memory initialization. It provides:
//! 1. **ELF images:** Loadable segments are flattened into one buffer starting at the
//!    lowest segment address; gaps and `.bss`-style tails are zero-filled.
//! 2. **Raw binaries:** Any file without the ELF magic is loaded verbatim at address 0.

use std::fs;
use std::path::Path;

use object::{Object, ObjectSegment};

use crate::error::{Error, Result};

/// First bytes of every ELF file.
const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// A flattened memory image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    /// Target byte address of `data[0]`.
    pub base: u32,
    /// Image content.
    pub data: Vec<u8>,
}

/// Loads an image file from disk.
///
/// # Arguments
///
/// * `path` - ELF executable or raw binary.
///
/// # Returns
///
/// The flattened image and its base address.
///
/// # Errors
///
/// `Error::Io` if the file cannot be read, `Error::InvalidArgument` if an ELF file is
/// malformed or places segments outside the 32-bit address space.
pub fn load_image(path: impl AsRef<Path>) -> Result<Image> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    if bytes.starts_with(ELF_MAGIC) {
        flatten_elf(&bytes)
            .map_err(|e| Error::InvalidArgument(format!("{}: {e}", path.display())))
    } else {
        Ok(Image {
            base: 0,
            data: bytes,
        })
    }
}

/// Lays out the loadable segments of an ELF file.
///
/// # Errors
///
/// `Error::InvalidArgument` for unparsable files or out-of-range segments.
pub fn flatten_elf(bytes: &[u8]) -> Result<Image> {
    let file = object::File::parse(bytes)
        .map_err(|e| Error::InvalidArgument(format!("not a loadable ELF image: {e}")))?;

    let mut segments = Vec::new();
    for segment in file.segments() {
        let data = segment
            .data()
            .map_err(|e| Error::InvalidArgument(format!("unreadable segment: {e}")))?;
        let size = segment.size().max(data.len() as u64);
        if size > 0 {
            segments.push((segment.address(), size, data));
        }
    }

    let Some(base) = segments.iter().map(|&(addr, _, _)| addr).min() else {
        return Ok(Image::default());
    };
    let end = segments
        .iter()
        .map(|&(addr, size, _)| addr.saturating_add(size))
        .max()
        .unwrap_or(base);
    if end > 1 << 32 {
        return Err(Error::InvalidArgument(format!(
            "segments end at {end:#x}, beyond the 32-bit address space"
        )));
    }

    let mut data = vec![0u8; (end - base) as usize];
    for (addr, _, content) in segments {
        let offset = (addr - base) as usize;
        data[offset..offset + content.len()].copy_from_slice(content);
    }
    Ok(Image {
        base: base as u32,
        data,
    })
}
