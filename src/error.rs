//! Error types for the bong-dl library.

use thiserror::Error;

use crate::catalog::CatalogError;

/// Errors that can occur while synchronising and downloading recordings.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection-level failure talking to the remote service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote service answered with a non-success status code.
    #[error("request failed ({status}): {url}")]
    Status {
        /// HTTP status code of the reply.
        status: u16,
        /// Requested URL with credentials redacted.
        url: String,
    },

    /// The reply was not a well-formed, positive service response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The reply could not be parsed as XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A recording lacks one of the attributes every recording must carry.
    #[error("missing element {attribute} in recording {id}")]
    MissingAttribute {
        /// Remote identifier of the offending recording.
        id: String,
        /// Name of the missing attribute.
        attribute: &'static str,
    },

    /// Local catalog failure.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// A file transfer failed.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Another instance already holds the single-instance port.
    #[error("another instance is already active (TCP/IP port {port} is in use)")]
    AlreadyRunning {
        /// Port used as the mutual-exclusion token.
        port: u16,
    },
}

/// A specialized `Result` type for bong-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
