//! INI serialization logic for converting `ConfigFile` → INI string.

use std::fmt::Write;
use std::path::Path;

use super::defaults::shape_name;
use super::parser::LAYER_SECTION_PREFIX;
use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let url = config.wms.url.as_deref().unwrap_or("");
    let default_layer = config.wms.default_layer.as_deref().unwrap_or("");

    let mut out = format!(
        r#"[fetch]
; Attempts per tile before it is marked as failed (default: 3)
max_retries = {}
; Timeout in seconds for one HTTP request (default: 30)
; Timed out requests are not retried
timeout = {}
; How often in-flight requests are checked for cancellation (default: 100)
watch_interval_ms = {}

[tiles]
; Tile edge length in pixels (default: 256, minimum: 16)
tile_pixels = {}

[throttle]
; View changes arriving within this window are merged (default: 250)
window_ms = {}

[wms]
; GetMap endpoint of the WMS server, e.g. https://maps.example.org/wms
url = {}
; WMS protocol version (default: 1.1.1)
version = {}
; Layer used when none is named (default: first [layer.*] section)
default_layer = {}

[logging]
; Directory for log files
directory = {}
file = {}
"#,
        config.fetch.max_retries,
        config.fetch.timeout.as_secs(),
        config.fetch.watch_interval.as_millis(),
        config.tiles.tile_pixels,
        config.throttle.window.as_millis(),
        url,
        config.wms.version,
        default_layer,
        path_to_string(&config.logging.directory),
        config.logging.file,
    );

    if config.layers.is_empty() {
        out.push_str(
            r#"
; One section per map layer served by the WMS server, for example:
;
; [layer.mola]
; layers = mola_128ppd
; format = application/bil16
; styles =
; shape = elevation16
; nudge_x = 0.0
; nudge_y = 0.0
"#,
        );
    }

    for layer in &config.layers {
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "\n[{}{}]\nlayers = {}\nformat = {}\nstyles = {}\nshape = {}\nnudge_x = {}\nnudge_y = {}\n",
            LAYER_SECTION_PREFIX,
            layer.name,
            layer.layers,
            layer.format,
            layer.styles,
            shape_name(layer.shape),
            layer.nudge.dx,
            layer.nudge.dy,
        );
    }

    out
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
