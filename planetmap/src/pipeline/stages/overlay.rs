//! The overlay composite: legs drawn over one another in order.

use crate::geo::RegionSet;
use crate::pipeline::error::StageError;
use crate::pipeline::settings::StageSettingsHandle;
use crate::pipeline::stage::{expect_shape, for_each_pixel, prepare_output, FailurePolicy, Stage, StageBuffer};
use crate::raster::{Raster, RasterShape};

/// Draws input `i` over the output with source-over alpha blending.
///
/// Inputs are processed in leg order, so later legs end up on top. Gray and
/// RGB inputs are opaque.
pub struct Overlay {
    settings: StageSettingsHandle,
}

impl Overlay {
    pub fn new(settings: StageSettingsHandle) -> Self {
        Self { settings }
    }
}

fn rgba(src: &Raster, x: u32, y: u32) -> [f64; 4] {
    match src.bands() {
        1 => {
            let g = src.sample(x, y, 0);
            [g, g, g, 255.0]
        }
        3 => [src.sample(x, y, 0), src.sample(x, y, 1), src.sample(x, y, 2), 255.0],
        _ => [
            src.sample(x, y, 0),
            src.sample(x, y, 1),
            src.sample(x, y, 2),
            src.sample(x, y, 3),
        ],
    }
}

impl Stage for Overlay {
    fn settings(&self) -> &StageSettingsHandle {
        &self.settings
    }

    fn consumes(&self, _input: usize) -> Vec<RasterShape> {
        vec![RasterShape::GRAY8, RasterShape::RGB8, RasterShape::RGBA8]
    }

    fn produces(&self) -> RasterShape {
        RasterShape::RGBA8
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::FailTile
    }

    fn process(
        &self,
        input: usize,
        buffer: &mut StageBuffer,
        changed: &mut RegionSet,
    ) -> Result<(), StageError> {
        let (src, slot) = buffer.split(input)?;
        expect_shape(self, input, src)?;
        let (width, height) = (src.width(), src.height());
        if let Some(out) = slot.as_ref() {
            if (out.width(), out.height()) != (width, height) {
                return Err(StageError::SizeMismatch {
                    expected: (out.width(), out.height()),
                    actual: (width, height),
                });
            }
        }
        let out = prepare_output(slot, width, height, RasterShape::RGBA8);

        for_each_pixel(changed, width, height, |x, y| {
            let [sr, sg, sb, sa] = rgba(src, x, y);
            let a = sa / 255.0;
            if a >= 1.0 {
                out.set_pixel(x, y, &[sr, sg, sb, 255.0]);
                return;
            }
            if a <= 0.0 {
                return;
            }
            let da = out.sample(x, y, 3) / 255.0;
            let oa = a + da * (1.0 - a);
            let blend = |s: f64, d: f64| (s * a + d * da * (1.0 - a)) / oa;
            let pixel = [
                blend(sr, out.sample(x, y, 0)),
                blend(sg, out.sample(x, y, 1)),
                blend(sb, out.sample(x, y, 2)),
                oa * 255.0,
            ];
            out.set_pixel(x, y, &pixel);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::settings::StageSettings;
    use crate::pipeline::stage::full_area;

    fn overlay() -> Overlay {
        Overlay::new(StageSettings::Overlay.into())
    }

    #[test]
    fn test_later_input_on_top() {
        let stage = overlay();
        let mut buffer = StageBuffer {
            inputs: vec![
                Some(Raster::filled(2, 2, RasterShape::GRAY8, &[10.0])),
                Some(Raster::filled(2, 2, RasterShape::RGB8, &[200.0, 0.0, 0.0])),
            ],
            output: None,
        };
        stage.process(0, &mut buffer, &mut full_area(2, 2)).unwrap();
        stage.process(1, &mut buffer, &mut full_area(2, 2)).unwrap();

        let out = buffer.take_output().unwrap();
        assert_eq!(out.shape(), RasterShape::RGBA8);
        assert_eq!(
            (0..4).map(|b| out.sample(1, 1, b)).collect::<Vec<_>>(),
            vec![200.0, 0.0, 0.0, 255.0]
        );
    }

    #[test]
    fn test_half_transparent_blend() {
        let stage = overlay();
        let mut buffer = StageBuffer {
            inputs: vec![
                Some(Raster::filled(1, 1, RasterShape::GRAY8, &[0.0])),
                Some(Raster::filled(1, 1, RasterShape::RGBA8, &[255.0, 255.0, 255.0, 127.5])),
            ],
            output: None,
        };
        stage.process(0, &mut buffer, &mut full_area(1, 1)).unwrap();
        stage.process(1, &mut buffer, &mut full_area(1, 1)).unwrap();

        let out = buffer.take_output().unwrap();
        assert_eq!(out.sample(0, 0, 3), 255.0);
        let r = out.sample(0, 0, 0);
        assert!((127.0..=129.0).contains(&r), "r = {}", r);
    }

    #[test]
    fn test_transparent_input_leaves_output() {
        let stage = overlay();
        let mut buffer = StageBuffer {
            inputs: vec![Some(Raster::new(1, 1, RasterShape::RGBA8))],
            output: None,
        };
        stage.process(0, &mut buffer, &mut full_area(1, 1)).unwrap();
        assert_eq!(buffer.take_output().unwrap().sample(0, 0, 3), 0.0);
    }

    #[test]
    fn test_size_mismatch() {
        let stage = overlay();
        let mut buffer = StageBuffer {
            inputs: vec![Some(Raster::new(2, 2, RasterShape::GRAY8))],
            output: Some(Raster::new(3, 3, RasterShape::RGBA8)),
        };
        let err = stage.process(0, &mut buffer, &mut full_area(2, 2)).unwrap_err();
        assert!(matches!(err, StageError::SizeMismatch { .. }));
        assert_eq!(stage.failure_policy(), FailurePolicy::FailTile);
    }
}
