use thiserror::Error;

use crate::StdError;

/// Result type of the [ServerConnection] operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Error raised by any operation of a [ServerConnection].
///
/// This is the only kind of error a connection reports: whatever its cause, the client
/// handles it the same way.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The operation is not allowed in the current state of the connection.
    #[error("Invalid connection state: {0}")]
    InvalidState(String),

    /// The underlying transport failed.
    #[error("Transport failure")]
    Failure(#[source] StdError),
}

/// A link to a remote server able to stream the content of one file.
///
/// The expected call order is: [connect_to][ServerConnection::connect_to], then
/// [request_file_contents][ServerConnection::request_file_contents], then alternating
/// [more_bytes][ServerConnection::more_bytes] and [read][ServerConnection::read] until no
/// more bytes are available, and finally [close_connection][ServerConnection::close_connection].
#[cfg_attr(test, mockall::automock)]
pub trait ServerConnection: Send + Sync {
    /// Open the link to the given server.
    ///
    /// Returns `false` if the server refused the connection.
    fn connect_to(&self, server_id: &str) -> TransportResult<bool>;

    /// Ask the server for the content of the given file.
    ///
    /// Returns `false` if the server has no valid file with this name.
    fn request_file_contents(&self, file_name: &str) -> TransportResult<bool>;

    /// Check if chunks of the requested file are still waiting to be read.
    fn more_bytes(&self) -> TransportResult<bool>;

    /// Read the next chunk of the requested file.
    ///
    /// An absent chunk is returned as `None`.
    fn read(&self) -> TransportResult<Option<String>>;

    /// Release the link to the server.
    fn close_connection(&self) -> TransportResult<()>;
}
