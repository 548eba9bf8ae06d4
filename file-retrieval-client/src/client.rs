//! ## File Retrieval Client
//!
//! Drives a [ServerConnection] through the retrieval of one file:
//! * connect to the server, a refused connection is a failure and nothing has to be closed
//! * negotiate the file, an unknown file yields an empty content
//! * read the file chunk by chunk until the server has no more bytes
//! * close the connection, exactly once, whatever happened after the connection succeeded
//!
//! The outcome is all or nothing: any transport error, including one raised while closing the
//! connection, discards the chunks read so far.

use std::sync::Arc;

use slog::{Logger, debug, trace};
use strum::Display;

use crate::ServerConnection;
use crate::logging::LoggerExtensions;

/// Outcome of a file retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRetrieval {
    /// The whole content of the file, chunks concatenated in read order.
    Complete(String),

    /// The retrieval failed, nothing was retrieved.
    Failed,
}

impl FileRetrieval {
    /// Check if the retrieval succeeded.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Borrow the retrieved content, `None` if the retrieval failed.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Complete(content) => Some(content.as_str()),
            Self::Failed => None,
        }
    }

    /// Take the retrieved content, `None` if the retrieval failed.
    pub fn into_content(self) -> Option<String> {
        match self {
            Self::Complete(content) => Some(content),
            Self::Failed => None,
        }
    }
}

/// Steps of the retrieval protocol that may end it in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
enum RetrievalStage {
    Connecting,
    Negotiating,
    Reading,
    Closing,
}

/// Client retrieving files through an injected [ServerConnection].
pub struct FileRetrievalClient {
    connection: Arc<dyn ServerConnection>,
    logger: Logger,
}

impl FileRetrievalClient {
    /// Create a new instance of the client.
    pub fn new(connection: Arc<dyn ServerConnection>, logger: Logger) -> Self {
        Self {
            connection,
            logger: logger.new_with_component_name::<Self>(),
        }
    }

    /// Retrieve the content of the file `file_name` from the server `server_id`.
    pub fn request_file(&self, server_id: &str, file_name: &str) -> FileRetrieval {
        debug!(
            self.logger, ">> request_file";
            "server_id" => server_id, "file_name" => file_name
        );

        match self.connection.connect_to(server_id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(self.logger, "Connection refused by the server"; "server_id" => server_id);
                return FileRetrieval::Failed;
            }
            Err(_) => return self.fail(RetrievalStage::Connecting),
        }

        let retrieved_contents = self.retrieve_contents(file_name);
        let close_result = self.connection.close_connection();

        match (retrieved_contents, close_result) {
            (Ok(contents), Ok(())) => {
                debug!(
                    self.logger, "<< request_file: file retrieved";
                    "file_name" => file_name, "size" => contents.len()
                );
                FileRetrieval::Complete(contents)
            }
            (Err(stage), _) => self.fail(stage),
            (Ok(_), Err(_)) => self.fail(RetrievalStage::Closing),
        }
    }

    fn retrieve_contents(&self, file_name: &str) -> Result<String, RetrievalStage> {
        let is_file_valid = self
            .connection
            .request_file_contents(file_name)
            .map_err(|_| RetrievalStage::Negotiating)?;
        if !is_file_valid {
            debug!(self.logger, "No valid file on the server"; "file_name" => file_name);
            return Ok(String::new());
        }

        let mut contents = String::new();
        let mut chunks_count = 0_usize;
        while self
            .connection
            .more_bytes()
            .map_err(|_| RetrievalStage::Reading)?
        {
            let chunk = self.connection.read().map_err(|_| RetrievalStage::Reading)?;
            chunks_count += 1;
            trace!(
                self.logger, "Chunk read";
                "chunk_number" => chunks_count, "size" => chunk.as_ref().map_or(0, String::len)
            );
            if let Some(chunk) = chunk {
                contents.push_str(&chunk);
            }
        }

        Ok(contents)
    }

    fn fail(&self, stage: RetrievalStage) -> FileRetrieval {
        debug!(self.logger, "<< request_file: retrieval failed"; "stage" => %stage);
        FileRetrieval::Failed
    }
}
