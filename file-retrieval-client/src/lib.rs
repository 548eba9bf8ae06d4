#![warn(missing_docs)]

//! Client driver retrieving the content of a named file from a remote server.
//!
//! Provide:
//! - The [FileRetrievalClient], the protocol driver that connects to a server, negotiates a
//!   file, reads it chunk by chunk and closes the connection, returning either the complete
//!   content or a failure, never a partial content.
//! - The [ServerConnection] trait, the narrow seam through which the client talks to a
//!   transport, and its single error type [TransportError].
//! - A [DirectoryServerConnection] serving the files of a local directory tree.
//! - [Logging][logging] helpers and, behind the `test_tools` feature, [test tools][test_tools].

mod client;
mod connection;
mod directory_connection;
pub mod logging;
#[cfg(any(test, feature = "test_tools"))]
pub mod test_tools;

pub use client::{FileRetrieval, FileRetrievalClient};
pub use connection::{ServerConnection, TransportError, TransportResult};
pub use directory_connection::DirectoryServerConnection;

/// Generic error type
pub type StdError = anyhow::Error;

/// Generic result type
pub type StdResult<T> = Result<T, StdError>;
