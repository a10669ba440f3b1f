//! The stage contract.
//!
//! A [`Stage`] transforms rasters of declared input shapes into rasters of
//! one output shape. Stages hold no per-call state: `process` may run
//! concurrently for different tiles. Behavior is configured through the
//! stage's [`StageSettingsHandle`], read once per call.

use super::error::StageError;
use super::settings::{StageKind, StageSettings, StageSettingsHandle};
use super::stages::{Colormap, Grayscale, Hillshade, LinearStretch, Opacity, Overlay};
use crate::geo::{Rect, RegionSet};
use crate::raster::{Raster, RasterShape};

/// What happens to a tile when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The leg contributes nothing to this tile.
    DropLeg,
    /// The whole tile is marked errored.
    FailTile,
}

/// Inputs and output of one stage invocation.
#[derive(Debug, Default)]
pub struct StageBuffer {
    pub inputs: Vec<Option<Raster>>,
    pub output: Option<Raster>,
}

impl StageBuffer {
    /// Buffer for a single-input stage.
    pub fn single(input: Raster) -> Self {
        Self {
            inputs: vec![Some(input)],
            output: None,
        }
    }

    pub fn input(&self, index: usize) -> Result<&Raster, StageError> {
        self.inputs
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(StageError::MissingInput(index))
    }

    /// Takes the output raster, leaving the buffer empty.
    pub fn take_output(&mut self) -> Option<Raster> {
        self.output.take()
    }

    /// Input `index` alongside the output slot, for stages that read one
    /// while writing the other.
    pub(crate) fn split(&mut self, index: usize) -> Result<(&Raster, &mut Option<Raster>), StageError> {
        let input = self
            .inputs
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(StageError::MissingInput(index))?;
        Ok((input, &mut self.output))
    }
}

/// Output raster of `shape` and the given size, reusing the slot's raster
/// when it already matches.
pub(crate) fn prepare_output(
    slot: &mut Option<Raster>,
    width: u32,
    height: u32,
    shape: RasterShape,
) -> &mut Raster {
    let reusable = slot
        .as_ref()
        .is_some_and(|o| o.width() == width && o.height() == height && o.shape() == shape);
    if !reusable {
        *slot = Some(Raster::new(width, height, shape));
    }
    slot.get_or_insert_with(|| Raster::new(width, height, shape))
}

/// A raster transform with declared input and output shapes.
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind {
        self.settings().kind()
    }

    /// The settings this stage reads, shared with any editor.
    fn settings(&self) -> &StageSettingsHandle;

    /// Shapes accepted on input `input`.
    fn consumes(&self, input: usize) -> Vec<RasterShape>;

    /// Shape of the output raster.
    fn produces(&self) -> RasterShape;

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::DropLeg
    }

    /// Processes input `input` from `buffer` into `buffer.output`.
    ///
    /// Only pixels inside `changed` (raster pixel coordinates) are
    /// transformed. On return `changed` holds the pixels actually written,
    /// which callers must pass on downstream.
    fn process(
        &self,
        input: usize,
        buffer: &mut StageBuffer,
        changed: &mut RegionSet,
    ) -> Result<(), StageError>;

    /// Whether input `input` accepts `shape`.
    fn accepts(&self, input: usize, shape: RasterShape) -> bool {
        self.consumes(input).contains(&shape)
    }
}

/// Builds the stage for `settings`. The stage shares the handle.
pub fn build_stage(settings: StageSettingsHandle) -> Box<dyn Stage> {
    match settings.kind() {
        StageKind::Grayscale => Box::new(Grayscale::new(settings)),
        StageKind::LinearStretch => Box::new(LinearStretch::new(settings)),
        StageKind::Colormap => Box::new(Colormap::new(settings)),
        StageKind::Hillshade => Box::new(Hillshade::new(settings)),
        StageKind::Opacity => Box::new(Opacity::new(settings)),
        StageKind::Overlay => Box::new(Overlay::new(settings)),
    }
}

/// Builds a stage with default settings for `kind`.
pub fn default_stage(kind: StageKind) -> Box<dyn Stage> {
    build_stage(StageSettingsHandle::new(StageSettings::default_for(kind)))
}

/// Region covering a whole `width` × `height` raster.
pub fn full_area(width: u32, height: u32) -> RegionSet {
    RegionSet::from_rect(Rect::new(0.0, 0.0, width as f64, height as f64))
}

/// Integer pixel spans `(x0, y0, x1, y1)` of `region`, clipped to the raster.
pub(crate) fn pixel_spans(region: &RegionSet, width: u32, height: u32) -> Vec<(u32, u32, u32, u32)> {
    let bounds = Rect::new(0.0, 0.0, width as f64, height as f64);
    region
        .rects()
        .iter()
        .filter_map(|r| r.intersection(&bounds))
        .map(|r| {
            (
                r.min_x.floor() as u32,
                r.min_y.floor() as u32,
                (r.max_x.ceil() as u32).min(width),
                (r.max_y.ceil() as u32).min(height),
            )
        })
        .collect()
}

/// Applies `f` to every pixel of `region` inside the raster.
pub(crate) fn for_each_pixel(region: &RegionSet, width: u32, height: u32, mut f: impl FnMut(u32, u32)) {
    for (x0, y0, x1, y1) in pixel_spans(region, width, height) {
        for y in y0..y1 {
            for x in x0..x1 {
                f(x, y);
            }
        }
    }
}

/// Checks that input `input` of `stage` accepts `raster`.
pub(crate) fn expect_shape(stage: &dyn Stage, input: usize, raster: &Raster) -> Result<(), StageError> {
    if stage.accepts(input, raster.shape()) {
        Ok(())
    } else {
        Err(StageError::UnexpectedShape {
            stage: stage.kind(),
            shape: raster.shape(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_spans_clip_to_raster() {
        let mut region = RegionSet::from_rect(Rect::new(-1.0, -1.0, 2.0, 2.0));
        region.add_rect(Rect::new(3.5, 0.0, 10.0, 1.0));
        let spans = pixel_spans(&region, 4, 4);
        assert_eq!(spans, vec![(0, 0, 2, 2), (3, 0, 4, 1)]);
    }

    #[test]
    fn test_build_stage_shares_settings() {
        let handle = StageSettingsHandle::new(StageSettings::Opacity { alpha: 0.5 });
        let stage = build_stage(handle.clone());
        assert_eq!(stage.kind(), StageKind::Opacity);
        assert!(stage.settings().shares_with(&handle));
    }

    #[test]
    fn test_prepare_output_reuses_matching_raster() {
        let mut slot = None;
        prepare_output(&mut slot, 2, 2, RasterShape::GRAY8).set_sample(0, 0, 0, 9.0);
        assert_eq!(prepare_output(&mut slot, 2, 2, RasterShape::GRAY8).sample(0, 0, 0), 9.0);
        assert_eq!(prepare_output(&mut slot, 3, 2, RasterShape::GRAY8).sample(0, 0, 0), 0.0);
    }

    #[test]
    fn test_missing_input() {
        let buffer = StageBuffer::default();
        assert_eq!(buffer.input(0).unwrap_err(), StageError::MissingInput(0));
    }
}
