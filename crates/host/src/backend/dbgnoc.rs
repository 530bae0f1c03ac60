//! Debug-network interface exposed as a character device.
//!
//! The host side of the hardware debug network (a USB bridge driver, or an emulator
//! presenting the same device node) is opened read/write. On unix the node is opened
//! with `O_NONBLOCK` so that polling never stalls the session.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::framing::FrameStream;
use super::{Backend, Packet};
use crate::config::BackendOption;
use crate::error::{Error, Result};

/// Device node opened when no `device` option is given.
pub const DEFAULT_DEVICE: &str = "/dev/dbgnoc0";

/// Transport over the debug-network device node.
#[derive(Debug)]
pub struct DbgNocBackend {
    device: PathBuf,
    link: Option<FrameStream<File>>,
}

impl DbgNocBackend {
    /// Creates an unconnected backend for the given device node.
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            link: None,
        }
    }

    /// Creates a backend from the `device` option.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for unknown option names or an empty device path.
    pub fn from_options(options: &[BackendOption]) -> Result<Self> {
        let mut device = PathBuf::from(DEFAULT_DEVICE);
        for option in options {
            match option.name.as_str() {
                "device" if option.value.is_empty() => {
                    return Err(Error::InvalidArgument("dbgnoc: empty device path".into()));
                }
                "device" => device = PathBuf::from(&option.value),
                other => {
                    return Err(Error::InvalidArgument(format!(
                        "dbgnoc: unknown option '{other}' (expected 'device')"
                    )));
                }
            }
        }
        Ok(Self::new(device))
    }

    /// Configured device node.
    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Returns `true` while the device node is open.
    pub const fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn open(&self) -> std::io::Result<File> {
        let mut options = OpenOptions::new();
        let _ = options.read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let _ = options.custom_flags(libc::O_NONBLOCK);
        }
        options.open(&self.device)
    }

    fn link(&mut self) -> Result<&mut FrameStream<File>> {
        self.link
            .as_mut()
            .ok_or_else(|| Error::Connection("dbgnoc backend is not connected".into()))
    }
}

impl Backend for DbgNocBackend {
    fn connect(&mut self) -> Result<()> {
        if self.link.is_some() {
            return Ok(());
        }
        let file = self.open().map_err(|e| {
            Error::Connection(format!(
                "cannot open debug network device {}: {e}",
                self.device.display()
            ))
        })?;
        tracing::debug!(device = %self.device.display(), "dbgnoc device opened");
        self.link = Some(FrameStream::with_idle_eof(file));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(link) = self.link.take() {
            let file = link.into_inner();
            file.sync_all().or_else(|e| match e.kind() {
                // Character devices commonly refuse fsync.
                std::io::ErrorKind::InvalidInput | std::io::ErrorKind::Unsupported => Ok(()),
                _ => Err(e),
            })?;
            tracing::debug!(device = %self.device.display(), "dbgnoc device closed");
        }
        Ok(())
    }

    fn send(&mut self, packet: &Packet) -> Result<()> {
        self.link()?.send(packet)
    }

    fn try_receive(&mut self) -> Result<Option<Packet>> {
        self.link()?.try_receive()
    }
}
