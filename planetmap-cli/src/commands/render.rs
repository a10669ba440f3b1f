//! Render command - render one layer over a bounding box to an image.

use clap::ValueEnum;
use planetmap::catalog::SourceCatalog;
use planetmap::channel::{FetchContext, TiledChannel};
use planetmap::compose::LayerComposer;
use planetmap::geo::{Projection, Rect};
use planetmap::pipeline::{Pipeline, StageKind, StageRegistry, StageSettings, StageSettingsHandle};
use planetmap::source::MapSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Processing applied to the layer before compositing.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Style {
    /// Shortest stage chain that makes the layer displayable
    Auto,
    /// Shaded relief of an elevation layer
    Hillshade,
    /// Luminance of a color layer
    Grayscale,
}

/// Arguments for the render command.
pub struct RenderArgs {
    pub layer: Option<String>,
    pub bbox: Rect,
    pub ppd: f64,
    pub output: PathBuf,
    pub style: Style,
    pub config: Option<PathBuf>,
}

/// Parses `MINX,MINY,MAXX,MAXY` in degrees.
pub fn parse_bbox(value: &str) -> Result<Rect, String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in bbox: {}", e))?;

    let [min_x, min_y, max_x, max_y] = parts[..] else {
        return Err(format!("expected MINX,MINY,MAXX,MAXY, got {} values", parts.len()));
    };
    if !(min_x < max_x && min_y < max_y) {
        return Err("bbox minimum must be below its maximum".to_string());
    }
    let rect = Rect::new(min_x, min_y, max_x, max_y);
    if !rect.is_finite() {
        return Err("bbox must be finite".to_string());
    }
    Ok(rect)
}

fn build_pipeline(source: Arc<dyn MapSource>, style: Style) -> Result<Pipeline, CliError> {
    let stage = match style {
        Style::Auto => return Ok(Pipeline::for_source(&StageRegistry::standard(), source)?),
        Style::Hillshade => StageKind::Hillshade,
        Style::Grayscale => StageKind::Grayscale,
    };
    let mut pipeline = Pipeline::new(
        source.id().as_str(),
        StageSettingsHandle::new(StageSettings::default_for(StageKind::Overlay)),
    )?;
    pipeline.add_leg(source, vec![StageSettingsHandle::new(StageSettings::default_for(stage))])?;
    Ok(pipeline)
}

async fn resolve_source(catalog: &SourceCatalog, layer: Option<&str>) -> Result<Arc<dyn MapSource>, CliError> {
    catalog.ready().await?;
    let source = match layer {
        Some(name) => catalog.get(name)?,
        None => catalog.default_source()?,
    };
    Ok(source)
}

/// Run the render command.
pub async fn run(args: RenderArgs) -> Result<(), CliError> {
    if !(args.ppd.is_finite() && args.ppd > 0.0) {
        return Err(CliError::InvalidArgument(format!(
            "--ppd must be a positive number, got {}",
            args.ppd
        )));
    }

    let runner = CliRunner::new(args.config.as_deref())?;
    runner.log_startup("render");
    let config = runner.config();

    let catalog = runner.catalog()?;
    let source = resolve_source(&catalog, args.layer.as_deref()).await?;
    let layer = source.id().as_str().to_string();
    let pipeline = build_pipeline(source, args.style)?;

    let projection = Projection::unrotated();
    println!("Rendering {} over {} at {} px/deg", layer, args.bbox, args.ppd);

    let composer = Arc::new(LayerComposer::new(projection, args.bbox, args.ppd));
    let channel = TiledChannel::new(
        composer.clone(),
        &config.tiling_config(),
        FetchContext::new(config.fetch_config()),
    );

    let start = Instant::now();
    channel.set_request(projection, args.bbox, args.ppd, &[pipeline])?;
    channel.until_finished().await;
    composer.mark_finished();
    info!(layer = %layer, elapsed_ms = start.elapsed().as_millis() as u64, "Render finished");

    let progress = composer.progress(&layer).ok_or(CliError::NothingRendered)?;
    let image = composer.render(&layer).ok_or(CliError::NothingRendered)?;
    image.save(&args.output).map_err(|error| CliError::ImageWrite {
        path: args.output.clone(),
        error,
    })?;

    println!(
        "Saved {} ({}x{}) in {:.2}s",
        args.output.display(),
        image.width(),
        image.height(),
        start.elapsed().as_secs_f64()
    );
    if progress.errored_tiles > 0 {
        println!(
            "  {} of {} tiles failed and are shown with the error fill",
            progress.errored_tiles, progress.finished_tiles
        );
    }
    Ok(())
}
