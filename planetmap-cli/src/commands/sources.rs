//! Sources command - list resolved map sources.

use std::path::PathBuf;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the sources command.
pub struct SourcesArgs {
    pub config: Option<PathBuf>,
}

/// Run the sources command.
pub async fn run(args: SourcesArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.config.as_deref())?;
    runner.log_startup("sources");

    let catalog = runner.catalog()?;
    catalog.ready().await?;

    let sources = catalog.sources()?;
    if sources.is_empty() {
        println!("No map sources configured.");
        return Ok(());
    }

    let default = catalog.default_source().ok().map(|s| s.id().clone());
    println!("{:<2}{:<24}{}", "", "NAME", "SHAPE");
    for source in sources {
        let marker = if default.as_ref() == Some(source.id()) { "*" } else { "" };
        println!("{:<2}{:<24}{}", marker, source.id().as_str(), source.shape());
    }
    Ok(())
}
