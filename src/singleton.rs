//! Single-instance guard.

use std::net::{Ipv4Addr, TcpListener};

use crate::error::{Error, Result};

/// Holds a bound local port for as long as it lives.
#[derive(Debug)]
pub struct InstanceGuard {
    listener: TcpListener,
}

impl InstanceGuard {
    /// Binds `127.0.0.1:port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] when the port is taken and
    /// [`Error::Io`] for any other bind failure.
    pub fn acquire(port: u16) -> Result<Self> {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(listener) => {
                log::debug!("holding instance port {port}");
                Ok(Self { listener })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                Err(Error::AlreadyRunning { port })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Port actually held.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.listener.local_addr().ok().map(|a| a.port())
    }
}
