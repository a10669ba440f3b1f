//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::defaults::{shape_from_name, DEFAULT_WMS_FORMAT, MIN_TILE_PIXELS};
use super::file::ConfigFileError;
use super::settings::{ConfigFile, LayerSettings};
use crate::geo::Offset;
use crate::raster::RasterShape;

/// Prefix of per-layer section names.
pub(super) const LAYER_SECTION_PREFIX: &str = "layer.";

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T: FromStr>(section: &str, key: &str, value: &str, reason: &str) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [fetch] section
    if let Some(section) = ini.section(Some("fetch")) {
        if let Some(v) = section.get("max_retries") {
            let retries: u32 = parse("fetch", "max_retries", v, "must be a positive integer")?;
            if retries == 0 {
                return Err(invalid("fetch", "max_retries", v, "must be at least 1"));
            }
            config.fetch.max_retries = retries;
        }
        if let Some(v) = section.get("timeout") {
            let secs: u64 = parse("fetch", "timeout", v, "must be a positive integer (seconds)")?;
            config.fetch.timeout = Duration::from_secs(secs);
        }
        if let Some(v) = section.get("watch_interval_ms") {
            let ms: u64 = parse(
                "fetch",
                "watch_interval_ms",
                v,
                "must be a positive integer (milliseconds)",
            )?;
            if ms == 0 {
                return Err(invalid("fetch", "watch_interval_ms", v, "must be at least 1"));
            }
            config.fetch.watch_interval = Duration::from_millis(ms);
        }
    }

    // [tiles] section
    if let Some(section) = ini.section(Some("tiles")) {
        if let Some(v) = section.get("tile_pixels") {
            let pixels: u32 = parse("tiles", "tile_pixels", v, "must be a positive integer")?;
            if pixels < MIN_TILE_PIXELS {
                return Err(invalid(
                    "tiles",
                    "tile_pixels",
                    v,
                    &format!("must be at least {}", MIN_TILE_PIXELS),
                ));
            }
            config.tiles.tile_pixels = pixels;
        }
    }

    // [throttle] section
    if let Some(section) = ini.section(Some("throttle")) {
        if let Some(v) = section.get("window_ms") {
            let ms: u64 = parse("throttle", "window_ms", v, "must be an integer (milliseconds)")?;
            config.throttle.window = Duration::from_millis(ms);
        }
    }

    // [wms] section
    if let Some(section) = ini.section(Some("wms")) {
        if let Some(v) = section.get("url") {
            if let Some(url) = non_empty(v) {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(invalid("wms", "url", v, "must be an http:// or https:// URL"));
                }
                config.wms.url = Some(url);
            }
        }
        if let Some(v) = section.get("version").and_then(non_empty) {
            config.wms.version = v;
        }
        if let Some(v) = section.get("default_layer") {
            config.wms.default_layer = non_empty(v);
        }
    }

    // [layer.<name>] sections
    for (name, section) in ini.iter() {
        let Some(layer) = name.and_then(|n| n.strip_prefix(LAYER_SECTION_PREFIX)) else {
            continue;
        };
        let section_name = format!("{}{}", LAYER_SECTION_PREFIX, layer);
        if layer.trim().is_empty() {
            return Err(invalid(&section_name, "", "", "layer name must not be empty"));
        }

        let shape = match section.get("shape") {
            Some(v) => shape_from_name(v).ok_or_else(|| {
                invalid(
                    &section_name,
                    "shape",
                    v,
                    "must be one of: gray8, rgb8, rgba8, elevation16, elevation_u16, elevation32",
                )
            })?,
            None => RasterShape::RGBA8,
        };
        let nudge_x = match section.get("nudge_x") {
            Some(v) => parse(&section_name, "nudge_x", v, "must be a number (degrees)")?,
            None => 0.0,
        };
        let nudge_y = match section.get("nudge_y") {
            Some(v) => parse(&section_name, "nudge_y", v, "must be a number (degrees)")?,
            None => 0.0,
        };

        config.layers.push(LayerSettings {
            name: layer.trim().to_string(),
            layers: section
                .get("layers")
                .and_then(non_empty)
                .unwrap_or_else(|| layer.trim().to_string()),
            format: section
                .get("format")
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_WMS_FORMAT.to_string()),
            styles: section.get("styles").map(|s| s.trim().to_string()).unwrap_or_default(),
            shape,
            nudge: Offset::new(nudge_x, nudge_y),
        });
    }

    if let Some(default) = &config.wms.default_layer {
        if !config.layers.iter().any(|l| &l.name == default) {
            return Err(invalid(
                "wms",
                "default_layer",
                default,
                "must name a configured [layer.<name>] section",
            ));
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory").and_then(non_empty) {
            config.logging.directory = expand_tilde(&v);
        }
        if let Some(v) = section.get("file").and_then(non_empty) {
            config.logging.file = v;
        }
    }

    Ok(config)
}

/// Expands a leading `~` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
