//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization and catalog
//! resolution shared by the command handlers.

use crate::error::CliError;
use planetmap::catalog::{MapServer, SourceCatalog, WmsServer};
use planetmap::config::{config_file_path, ConfigFile};
use planetmap::logging::{init_logging, LoggingGuard};
use planetmap::source::ReqwestHttpClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Keeps logging active while the runner exists
    _logging_guard: LoggingGuard,
    config: ConfigFile,
    config_path: PathBuf,
}

impl CliRunner {
    /// Loads the config file (defaults if absent) and initializes logging.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config_path = config_path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;

        let logging_guard = init_logging(&config.logging.directory, &config.logging.file)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!(version = planetmap::VERSION, command, config = %self.config_path.display(), "planetmap starting");
    }

    /// Starts resolving the configured map servers.
    pub fn catalog(&self) -> Result<SourceCatalog, CliError> {
        let mut servers: Vec<Arc<dyn MapServer>> = Vec::new();

        let client = ReqwestHttpClient::new(self.config.fetch.timeout).map_err(|e| CliError::Http(e.to_string()))?;
        match WmsServer::from_config(&self.config, Arc::new(client)) {
            Some(server) => servers.push(Arc::new(server)),
            None => warn!(config = %self.config_path.display(), "No WMS server configured"),
        }

        Ok(SourceCatalog::spawn(servers))
    }
}
