//! Init command - write the default configuration file.

use planetmap::config::{config_file_path, ConfigFile};
use std::path::PathBuf;

use crate::error::CliError;

/// Arguments for the init-config command.
pub struct InitArgs {
    pub config: Option<PathBuf>,
    pub force: bool,
}

/// Run the init-config command.
pub fn run(args: InitArgs) -> Result<(), CliError> {
    let path = args.config.unwrap_or_else(config_file_path);

    if args.force {
        ConfigFile::default().save_to(&path)?;
        println!("Wrote default configuration to {}", path.display());
    } else if ConfigFile::ensure_exists_at(&path)? {
        println!("Created configuration file at {}", path.display());
    } else {
        println!("Configuration file already exists at {}", path.display());
        println!("Use --force to overwrite it with defaults.");
    }

    Ok(())
}
