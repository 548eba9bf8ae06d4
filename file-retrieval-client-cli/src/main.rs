use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{Map, Source, Value, ValueKind};
use slog::{Drain, Fuse, Level, Logger, debug};
use slog_term::Decorator;
use std::io::Write;
use std::sync::Arc;
use std::{fs::File, path::PathBuf};

use file_retrieval_client::StdResult;
use file_retrieval_client_cli::CommandContext;
use file_retrieval_client_cli::commands::{DEFAULT_CHUNK_SIZE, FetchCommand};

enum LogOutputType {
    StdErr,
    File(String),
}

impl LogOutputType {
    fn get_writer(&self) -> StdResult<Box<dyn Write + Send>> {
        let writer: Box<dyn Write + Send> = match self {
            LogOutputType::StdErr => Box::new(std::io::stderr()),
            LogOutputType::File(filepath) => Box::new(
                File::create(filepath)
                    .with_context(|| format!("Can not create output log file: {filepath}"))?,
            ),
        };

        Ok(writer)
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(name = "file-retrieval-client")]
#[clap(
    about = "This program retrieves a named file from a server, chunk by chunk.",
    long_about = None
)]
#[command(version)]
pub struct Args {
    /// Available commands
    #[clap(subcommand)]
    command: Commands,

    /// Run Mode.
    #[clap(long, env = "RUN_MODE", default_value = "dev")]
    run_mode: String,

    /// Verbosity level (-v=warning, -vv=info, -vvv=debug, -vvvv=trace).
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory where configuration file is located.
    #[clap(long, default_value = "./config")]
    pub config_directory: PathBuf,

    /// Override configuration directory holding one sub-directory per served server.
    #[clap(long, env = "SERVERS_DIRECTORY")]
    servers_directory: Option<PathBuf>,

    /// Override configuration size, in bytes, of the chunks read from the server.
    #[clap(long, env = "CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Enable JSON output for logs displayed according to verbosity level
    #[clap(long)]
    log_format_json: bool,

    /// Redirect the logs to a file
    #[clap(long, alias("o"))]
    log_output: Option<String>,
}

impl Args {
    pub fn execute(&self, root_logger: Logger) -> StdResult<()> {
        debug!(
            root_logger,
            "File retrieval client CLI version: {}",
            env!("CARGO_PKG_VERSION")
        );
        debug!(root_logger, "Run Mode: {}", self.run_mode);
        let filename = format!("{}/{}.json", self.config_directory.display(), self.run_mode);
        debug!(root_logger, "Reading configuration file '{filename}'.");
        let config = config::Config::builder()
            .set_default("chunk_size", DEFAULT_CHUNK_SIZE.to_string())?
            .add_source(config::File::with_name(&filename).required(false))
            .add_source(self.clone());
        let context = CommandContext::new(config, root_logger);

        self.command.execute(context)
    }

    fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::Error,
            1 => Level::Warning,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }

    fn get_log_output_type(&self) -> LogOutputType {
        if let Some(output_filepath) = &self.log_output {
            LogOutputType::File(output_filepath.to_string())
        } else {
            LogOutputType::StdErr
        }
    }

    fn wrap_drain<D: Decorator + Send + 'static>(&self, decorator: D) -> Fuse<slog_async::Async> {
        let drain = slog_term::CompactFormat::new(decorator).build().fuse();
        let drain = slog::LevelFilter::new(drain, self.log_level()).fuse();

        slog_async::Async::new(drain).build().fuse()
    }

    fn build_logger(&self) -> StdResult<Logger> {
        let log_output_type = self.get_log_output_type();
        let writer = log_output_type.get_writer()?;

        let drain = if self.log_format_json {
            let drain = slog_bunyan::with_name("file-retrieval-client", writer)
                .set_pretty(false)
                .build()
                .fuse();
            let drain = slog::LevelFilter::new(drain, self.log_level()).fuse();

            slog_async::Async::new(drain).build().fuse()
        } else {
            match log_output_type {
                LogOutputType::StdErr => self.wrap_drain(slog_term::TermDecorator::new().build()),
                LogOutputType::File(_) => self.wrap_drain(slog_term::PlainDecorator::new(writer)),
            }
        };

        Ok(Logger::root(Arc::new(drain), slog::o!()))
    }
}

impl Source for Args {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
        let mut map = Map::new();
        let namespace = "clap arguments".to_string();

        if let Some(servers_directory) = &self.servers_directory {
            map.insert(
                "servers_directory".to_string(),
                Value::new(
                    Some(&namespace),
                    ValueKind::from(servers_directory.to_string_lossy().to_string()),
                ),
            );
        }
        if let Some(chunk_size) = self.chunk_size {
            map.insert(
                "chunk_size".to_string(),
                Value::new(Some(&namespace), ValueKind::from(chunk_size.to_string())),
            );
        }

        Ok(map)
    }
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Retrieve a file from a server
    Fetch(FetchCommand),
}

impl Commands {
    pub fn execute(&self, context: CommandContext) -> StdResult<()> {
        match self {
            Self::Fetch(cmd) => cmd.execute(context),
        }
    }
}

fn main() -> StdResult<()> {
    let args = Args::parse();
    let logger = args.build_logger()?;

    args.execute(logger)
}
