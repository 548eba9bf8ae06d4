use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use slog::{debug, info};

use file_retrieval_client::{
    DirectoryServerConnection, FileRetrieval, FileRetrievalClient, StdResult,
};

use crate::CommandContext;
use crate::commands::DEFAULT_CHUNK_SIZE;

/// Retrieve a file from a server
#[derive(Parser, Debug, Clone)]
pub struct FetchCommand {
    /// Identifier of the server to retrieve the file from.
    #[clap(long)]
    server: String,

    /// Name of the file to retrieve.
    #[clap(long)]
    file: String,

    /// Write the file content to this path instead of the standard output.
    #[clap(long)]
    output: Option<PathBuf>,
}

impl FetchCommand {
    /// Command execution
    pub fn execute(&self, context: CommandContext) -> StdResult<()> {
        let params = context.config_parameters()?;
        let servers_directory = PathBuf::from(params.require("servers_directory")?);
        let chunk_size: usize = params.parse_or("chunk_size", &DEFAULT_CHUNK_SIZE.to_string())?;
        debug!(
            context.logger(), "Fetch parameters";
            "servers_directory" => %servers_directory.display(), "chunk_size" => chunk_size
        );

        let connection =
            DirectoryServerConnection::new(servers_directory, chunk_size, context.logger().clone())
                .with_context(|| "Can not create the server connection")?;
        let client = FileRetrievalClient::new(Arc::new(connection), context.logger().clone());

        match client.request_file(&self.server, &self.file) {
            FileRetrieval::Complete(content) => {
                info!(
                    context.logger(), "File retrieved";
                    "server" => &self.server, "file" => &self.file, "size" => content.len()
                );
                self.write_content(&content)
            }
            FileRetrieval::Failed => Err(anyhow!(
                "File retrieval failed: server '{}', file '{}'",
                self.server,
                self.file
            )),
        }
    }

    fn write_content(&self, content: &str) -> StdResult<()> {
        match &self.output {
            Some(output_path) => write_to_file(output_path, content),
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(content.as_bytes())
                    .and_then(|_| stdout.flush())
                    .with_context(|| "Can not write the file content to the standard output")
            }
        }
    }
}

fn write_to_file(output_path: &Path, content: &str) -> StdResult<()> {
    std::fs::write(output_path, content)
        .with_context(|| format!("Can not write output file: '{}'", output_path.display()))
}
