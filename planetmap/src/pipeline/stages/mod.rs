//! Built-in stages.
//!
//! - **Grayscale** - color to luma
//! - **LinearStretch** - value window onto 8-bit gray
//! - **Colormap** - value window through a color ramp
//! - **Hillshade** - shaded relief from elevation
//! - **Opacity** - alpha scaling
//! - **Overlay** - the composite, drawing legs over one another

mod hillshade;
mod overlay;
mod tone;

pub use hillshade::Hillshade;
pub use overlay::Overlay;
pub use tone::{Colormap, Grayscale, LinearStretch, Opacity};
