//! Per-pixel tone stages: grayscale, linear stretch, colormap and opacity.

use crate::geo::RegionSet;
use crate::pipeline::error::StageError;
use crate::pipeline::settings::{StageKind, StageSettings, StageSettingsHandle};
use crate::pipeline::stage::{expect_shape, for_each_pixel, prepare_output, Stage, StageBuffer};
use crate::raster::{luma, RasterShape};

/// Single-band shapes accepted by the value-mapping stages.
const SCALAR_SHAPES: [RasterShape; 4] = [
    RasterShape::GRAY8,
    RasterShape::ELEVATION16,
    RasterShape::ELEVATION_U16,
    RasterShape::ELEVATION32,
];

/// Validated `[min, max]` value window.
fn window(stage: StageKind, min: f64, max: f64) -> Result<(f64, f64), StageError> {
    if !(min.is_finite() && max.is_finite()) || max <= min {
        return Err(StageError::InvalidSettings {
            stage,
            reason: format!("value range [{}, {}] is empty", min, max),
        });
    }
    Ok((min, max))
}

/// Color to single-band luma.
pub struct Grayscale {
    settings: StageSettingsHandle,
}

impl Grayscale {
    pub fn new(settings: StageSettingsHandle) -> Self {
        Self { settings }
    }
}

impl Stage for Grayscale {
    fn settings(&self) -> &StageSettingsHandle {
        &self.settings
    }

    fn consumes(&self, _input: usize) -> Vec<RasterShape> {
        vec![RasterShape::RGB8, RasterShape::RGBA8]
    }

    fn produces(&self) -> RasterShape {
        RasterShape::GRAY8
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
        let out = prepare_output(slot, width, height, RasterShape::GRAY8);

        for_each_pixel(changed, width, height, |x, y| {
            let g = luma(
                src.sample(x, y, 0) as u8,
                src.sample(x, y, 1) as u8,
                src.sample(x, y, 2) as u8,
            );
            out.set_sample(x, y, 0, g as f64);
        });
        Ok(())
    }
}

/// Maps a value window linearly onto 0..=255.
pub struct LinearStretch {
    settings: StageSettingsHandle,
}

impl LinearStretch {
    pub fn new(settings: StageSettingsHandle) -> Self {
        Self { settings }
    }
}

impl Stage for LinearStretch {
    fn settings(&self) -> &StageSettingsHandle {
        &self.settings
    }

    fn consumes(&self, _input: usize) -> Vec<RasterShape> {
        SCALAR_SHAPES.to_vec()
    }

    fn produces(&self) -> RasterShape {
        RasterShape::GRAY8
    }

    fn process(
        &self,
        input: usize,
        buffer: &mut StageBuffer,
        changed: &mut RegionSet,
    ) -> Result<(), StageError> {
        let StageSettings::LinearStretch { min, max } = self.settings.get() else {
            return Err(StageError::InvalidSettings {
                stage: self.kind(),
                reason: "settings of another stage kind".to_string(),
            });
        };
        let (min, max) = window(StageKind::LinearStretch, min, max)?;

        let (src, slot) = buffer.split(input)?;
        expect_shape(self, input, src)?;
        let (width, height) = (src.width(), src.height());
        let out = prepare_output(slot, width, height, RasterShape::GRAY8);

        for_each_pixel(changed, width, height, |x, y| {
            let v = src.sample(x, y, 0);
            let g = if v.is_finite() {
                ((v - min) / (max - min) * 255.0).clamp(0.0, 255.0)
            } else {
                0.0
            };
            out.set_sample(x, y, 0, g);
        });
        Ok(())
    }
}

/// Maps a value window through a color ramp to RGBA.
///
/// Non-finite samples become transparent.
pub struct Colormap {
    settings: StageSettingsHandle,
}

impl Colormap {
    pub fn new(settings: StageSettingsHandle) -> Self {
        Self { settings }
    }
}

impl Stage for Colormap {
    fn settings(&self) -> &StageSettingsHandle {
        &self.settings
    }

    fn consumes(&self, _input: usize) -> Vec<RasterShape> {
        SCALAR_SHAPES.to_vec()
    }

    fn produces(&self) -> RasterShape {
        RasterShape::RGBA8
    }

    fn process(
        &self,
        input: usize,
        buffer: &mut StageBuffer,
        changed: &mut RegionSet,
    ) -> Result<(), StageError> {
        let StageSettings::Colormap { min, max, ramp } = self.settings.get() else {
            return Err(StageError::InvalidSettings {
                stage: self.kind(),
                reason: "settings of another stage kind".to_string(),
            });
        };
        let (min, max) = window(StageKind::Colormap, min, max)?;

        let (src, slot) = buffer.split(input)?;
        expect_shape(self, input, src)?;
        let (width, height) = (src.width(), src.height());
        let out = prepare_output(slot, width, height, RasterShape::RGBA8);

        for_each_pixel(changed, width, height, |x, y| {
            let v = src.sample(x, y, 0);
            if !v.is_finite() {
                out.set_pixel(x, y, &[0.0, 0.0, 0.0, 0.0]);
                return;
            }
            let [r, g, b] = ramp.color((v - min) / (max - min));
            out.set_pixel(x, y, &[r as f64, g as f64, b as f64, 255.0]);
        });
        Ok(())
    }
}

/// Scales the alpha band.
pub struct Opacity {
    settings: StageSettingsHandle,
}

impl Opacity {
    pub fn new(settings: StageSettingsHandle) -> Self {
        Self { settings }
    }
}

impl Stage for Opacity {
    fn settings(&self) -> &StageSettingsHandle {
        &self.settings
    }

    fn consumes(&self, _input: usize) -> Vec<RasterShape> {
        vec![RasterShape::RGBA8]
    }

    fn produces(&self) -> RasterShape {
        RasterShape::RGBA8
    }

    fn process(
        &self,
        input: usize,
        buffer: &mut StageBuffer,
        changed: &mut RegionSet,
    ) -> Result<(), StageError> {
        let StageSettings::Opacity { alpha } = self.settings.get() else {
            return Err(StageError::InvalidSettings {
                stage: self.kind(),
                reason: "settings of another stage kind".to_string(),
            });
        };
        if !(0.0..=1.0).contains(&alpha) {
            return Err(StageError::InvalidSettings {
                stage: StageKind::Opacity,
                reason: format!("alpha {} is outside [0, 1]", alpha),
            });
        }

        let (src, slot) = buffer.split(input)?;
        expect_shape(self, input, src)?;
        let (width, height) = (src.width(), src.height());
        let out = prepare_output(slot, width, height, RasterShape::RGBA8);

        for_each_pixel(changed, width, height, |x, y| {
            out.copy_pixel_from(src, x, y, x, y);
            out.set_sample(x, y, 3, src.sample(x, y, 3) * alpha);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Rect;
    use crate::pipeline::settings::ColorRamp;
    use crate::pipeline::stage::full_area;
    use crate::raster::Raster;

    fn run(stage: &dyn Stage, input: Raster, changed: &mut RegionSet) -> Result<Raster, StageError> {
        let mut buffer = StageBuffer::single(input);
        stage.process(0, &mut buffer, changed)?;
        Ok(buffer.take_output().unwrap())
    }

    #[test]
    fn test_grayscale_luma() {
        let stage = Grayscale::new(StageSettings::Grayscale.into());
        let input = Raster::filled(2, 2, RasterShape::RGB8, &[255.0, 0.0, 0.0]);
        let out = run(&stage, input, &mut full_area(2, 2)).unwrap();
        assert_eq!(out.shape(), RasterShape::GRAY8);
        assert_eq!(out.sample(1, 1, 0), 76.0);
    }

    #[test]
    fn test_grayscale_rejects_gray() {
        let stage = Grayscale::new(StageSettings::Grayscale.into());
        let input = Raster::new(1, 1, RasterShape::GRAY8);
        let err = run(&stage, input, &mut full_area(1, 1)).unwrap_err();
        assert!(matches!(err, StageError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_stretch_maps_window() {
        let stage = LinearStretch::new(StageSettings::LinearStretch { min: 0.0, max: 1000.0 }.into());
        let input = Raster::from_i16(3, 1, 1, vec![-50, 500, 4000]).unwrap();
        let out = run(&stage, input, &mut full_area(3, 1)).unwrap();
        assert_eq!(out.sample(0, 0, 0), 0.0);
        assert_eq!(out.sample(1, 0, 0), 128.0);
        assert_eq!(out.sample(2, 0, 0), 255.0);
    }

    #[test]
    fn test_stretch_rejects_empty_window() {
        let stage = LinearStretch::new(StageSettings::LinearStretch { min: 5.0, max: 5.0 }.into());
        let input = Raster::new(1, 1, RasterShape::ELEVATION16);
        let err = run(&stage, input, &mut full_area(1, 1)).unwrap_err();
        assert!(matches!(err, StageError::InvalidSettings { .. }));
    }

    #[test]
    fn test_stretch_touches_only_changed_area() {
        let stage = LinearStretch::new(StageSettings::LinearStretch { min: 0.0, max: 1.0 }.into());
        let input = Raster::filled(4, 1, RasterShape::ELEVATION32, &[1.0]);
        let mut changed = RegionSet::from_rect(Rect::new(0.0, 0.0, 2.0, 1.0));
        let out = run(&stage, input, &mut changed).unwrap();
        assert_eq!(out.sample(1, 0, 0), 255.0);
        assert_eq!(out.sample(2, 0, 0), 0.0);
        assert_eq!(changed, RegionSet::from_rect(Rect::new(0.0, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn test_colormap_nan_is_transparent() {
        let stage = Colormap::new(
            StageSettings::Colormap {
                min: 0.0,
                max: 1.0,
                ramp: ColorRamp::Gray,
            }
            .into(),
        );
        let input = Raster::from_f32(2, 1, 1, vec![1.0, f32::NAN]).unwrap();
        let out = run(&stage, input, &mut full_area(2, 1)).unwrap();
        assert_eq!(out.shape(), RasterShape::RGBA8);
        assert_eq!(
            (0..4).map(|b| out.sample(0, 0, b)).collect::<Vec<_>>(),
            vec![255.0, 255.0, 255.0, 255.0]
        );
        assert_eq!(out.sample(1, 0, 3), 0.0);
    }

    #[test]
    fn test_opacity_scales_alpha() {
        let stage = Opacity::new(StageSettings::Opacity { alpha: 0.5 }.into());
        let input = Raster::filled(1, 1, RasterShape::RGBA8, &[10.0, 20.0, 30.0, 200.0]);
        let out = run(&stage, input, &mut full_area(1, 1)).unwrap();
        assert_eq!(out.sample(0, 0, 0), 10.0);
        assert_eq!(out.sample(0, 0, 3), 100.0);
    }

    #[test]
    fn test_settings_edit_applies_to_next_call() {
        let handle = StageSettingsHandle::new(StageSettings::Opacity { alpha: 1.0 });
        let stage = Opacity::new(handle.clone());
        handle.set(StageSettings::Opacity { alpha: 0.0 });

        let input = Raster::filled(1, 1, RasterShape::RGBA8, &[1.0, 1.0, 1.0, 255.0]);
        let out = run(&stage, input, &mut full_area(1, 1)).unwrap();
        assert_eq!(out.sample(0, 0, 3), 0.0);
    }
}
