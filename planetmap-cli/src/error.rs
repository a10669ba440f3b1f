//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and exit codes.

use planetmap::catalog::CatalogError;
use planetmap::channel::ChannelError;
use planetmap::config::ConfigFileError;
use planetmap::pipeline::PipelineError;
use std::fmt;
use std::path::PathBuf;
use std::process;

/// Exit code for bad arguments or configuration.
pub const EXIT_USAGE: i32 = 2;

/// Exit code when no map source can be used.
pub const EXIT_UNAVAILABLE: i32 = 3;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be read or written
    Config(ConfigFileError),
    /// Invalid command-line argument
    InvalidArgument(String),
    /// HTTP client setup failed
    Http(String),
    /// Source catalog could not be resolved or queried
    Catalog(CatalogError),
    /// No pipeline could be built for the source
    Pipeline(PipelineError),
    /// The request was rejected
    Channel(ChannelError),
    /// The request produced no tiles
    NothingRendered,
    /// Failed to write the output image
    ImageWrite { path: PathBuf, error: image::ImageError },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::InvalidArgument(_) | CliError::Channel(_) => EXIT_USAGE,
            CliError::Catalog(_) => EXIT_UNAVAILABLE,
            _ => 1,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Catalog(CatalogError::NoDefaultSource) | CliError::Catalog(CatalogError::Unreachable(_)) => {
                eprintln!();
                eprintln!("Make sure the config file has:");
                eprintln!("  1. A [wms] section with a reachable url");
                eprintln!("  2. At least one [layer.<name>] section");
                eprintln!("Run 'planetmap init-config' to write a commented template.");
            }
            CliError::Catalog(CatalogError::UnknownSource(_)) => {
                eprintln!();
                eprintln!("Run 'planetmap sources' to list the configured layers.");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Http(msg) => write!(f, "Failed to create HTTP client: {}", msg),
            CliError::Catalog(e) => write!(f, "{}", e),
            CliError::Pipeline(e) => write!(f, "Cannot build pipeline: {}", e),
            CliError::Channel(e) => write!(f, "Request rejected: {}", e),
            CliError::NothingRendered => write!(f, "No tiles were rendered"),
            CliError::ImageWrite { path, error } => {
                write!(f, "Failed to write image '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Catalog(e) => Some(e),
            CliError::Pipeline(e) => Some(e),
            CliError::Channel(e) => Some(e),
            CliError::ImageWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<CatalogError> for CliError {
    fn from(e: CatalogError) -> Self {
        CliError::Catalog(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}

impl From<ChannelError> for CliError {
    fn from(e: ChannelError) -> Self {
        CliError::Channel(e)
    }
}
