//! Simulated debug network over TCP.
//!
//! A software simulator of the platform exposes its debug network on a TCP port. Packets
//! are framed exactly as on the hardware link; the socket runs non-blocking so that
//! `try_receive` can poll.

use std::net::TcpStream;

use super::framing::FrameStream;
use super::{Backend, Packet};
use crate::config::BackendOption;
use crate::error::{Error, Result};

/// Host contacted when no `host` option is given.
pub const DEFAULT_HOST: &str = "localhost";

/// Port contacted when no `port` option is given.
pub const DEFAULT_PORT: u16 = 22000;

/// TCP transport to a platform simulator.
#[derive(Debug)]
pub struct SimTcpBackend {
    host: String,
    port: u16,
    link: Option<FrameStream<TcpStream>>,
}

impl SimTcpBackend {
    /// Creates an unconnected backend for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            link: None,
        }
    }

    /// Creates a backend from `host` and `port` options.
    ///
    /// # Errors
    ///
    /// `Error::InvalidArgument` for unknown option names or a non-numeric port.
    pub fn from_options(options: &[BackendOption]) -> Result<Self> {
        let mut backend = Self::new(DEFAULT_HOST, DEFAULT_PORT);
        for option in options {
            match option.name.as_str() {
                "host" => backend.host.clone_from(&option.value),
                "port" => {
                    backend.port = option.value.parse().map_err(|_| {
                        Error::InvalidArgument(format!("simtcp: invalid port '{}'", option.value))
                    })?;
                }
                other => {
                    return Err(Error::InvalidArgument(format!(
                        "simtcp: unknown option '{other}' (expected 'host' or 'port')"
                    )));
                }
            }
        }
        Ok(backend)
    }

    /// Configured host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Configured port.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns `true` while a socket is open.
    pub const fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn link(&mut self) -> Result<&mut FrameStream<TcpStream>> {
        self.link
            .as_mut()
            .ok_or_else(|| Error::Connection("simtcp backend is not connected".into()))
    }
}

impl Backend for SimTcpBackend {
    fn connect(&mut self) -> Result<()> {
        if self.link.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect((self.host.as_str(), self.port)).map_err(|e| {
            Error::Connection(format!("cannot reach simulator at {}:{}: {e}", self.host, self.port))
        })?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        tracing::debug!(host = %self.host, port = self.port, "simtcp link established");
        self.link = Some(FrameStream::new(stream));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(link) = self.link.take() {
            let stream = link.into_inner();
            match stream.shutdown(std::net::Shutdown::Both) {
                Err(e) if e.kind() != std::io::ErrorKind::NotConnected => return Err(e.into()),
                _ => tracing::debug!(host = %self.host, port = self.port, "simtcp link closed"),
            }
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
