//! planetmap CLI - render planetary map layers from WMS servers.
//!
//! This binary provides a command-line interface to the planetmap library.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use commands::render::{parse_bbox, Style};
use planetmap::geo::Rect;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "planetmap")]
#[command(version)]
#[command(about = "Render planetary map layers from WMS servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a layer over a bounding box to an image file
    Render {
        /// Layer to render (default: the configured default layer)
        #[arg(long)]
        layer: Option<String>,

        /// Bounding box in degrees: MINX,MINY,MAXX,MAXY
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Rect,

        /// Resolution in pixels per degree
        #[arg(long, default_value_t = 16.0)]
        ppd: f64,

        /// Output image path; the format follows the extension
        #[arg(long)]
        output: PathBuf,

        /// Processing applied before compositing
        #[arg(long, value_enum, default_value = "auto")]
        style: Style,

        /// Config file (default: ~/.planetmap/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the map sources offered by the configured servers
    Sources {
        /// Config file (default: ~/.planetmap/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Where to write it (default: ~/.planetmap/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render {
            layer,
            bbox,
            ppd,
            output,
            style,
            config,
        } => {
            commands::render::run(commands::render::RenderArgs {
                layer,
                bbox,
                ppd,
                output,
                style,
                config,
            })
            .await
        }
        Commands::Sources { config } => {
            commands::sources::run(commands::sources::SourcesArgs { config }).await
        }
        Commands::InitConfig { config, force } => {
            commands::init::run(commands::init::InitArgs { config, force })
        }
    };

    if let Err(e) = result {
        e.exit();
    }
}
