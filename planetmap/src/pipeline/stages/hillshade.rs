//! Shaded relief from elevation.

use crate::geo::{Rect, RegionSet};
use crate::pipeline::error::StageError;
use crate::pipeline::settings::{StageSettings, StageSettingsHandle};
use crate::pipeline::stage::{expect_shape, pixel_spans, prepare_output, Stage, StageBuffer};
use crate::raster::{Raster, RasterShape};

/// Illumination of elevation data by a distant light, using Horn's slope
/// estimate over each pixel's 3×3 neighborhood.
///
/// A pixel's shade depends on its neighbors, so the written area is the
/// requested area grown by one pixel and clipped to the raster.
pub struct Hillshade {
    settings: StageSettingsHandle,
}

impl Hillshade {
    pub fn new(settings: StageSettingsHandle) -> Self {
        Self { settings }
    }
}

impl Stage for Hillshade {
    fn settings(&self) -> &StageSettingsHandle {
        &self.settings
    }

    fn consumes(&self, _input: usize) -> Vec<RasterShape> {
        vec![
            RasterShape::ELEVATION16,
            RasterShape::ELEVATION_U16,
            RasterShape::ELEVATION32,
        ]
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
        let StageSettings::Hillshade {
            azimuth,
            altitude,
            z_factor,
        } = self.settings.get()
        else {
            return Err(StageError::InvalidSettings {
                stage: self.kind(),
                reason: "settings of another stage kind".to_string(),
            });
        };
        if !(0.0..=90.0).contains(&altitude) || !z_factor.is_finite() {
            return Err(StageError::InvalidSettings {
                stage: self.kind(),
                reason: format!("altitude {} or z factor {} out of range", altitude, z_factor),
            });
        }

        let (src, slot) = buffer.split(input)?;
        expect_shape(self, input, src)?;
        let (width, height) = (src.width(), src.height());

        let bounds = Rect::new(0.0, 0.0, width as f64, height as f64);
        let mut grown = RegionSet::new();
        for rect in changed.rects() {
            if let Some(r) = rect.inflate(1.0).intersection(&bounds) {
                grown.add_rect(r);
            }
        }

        let light = Light::new(azimuth, altitude);
        let out = prepare_output(slot, width, height, RasterShape::GRAY8);
        for (x0, y0, x1, y1) in pixel_spans(&grown, width, height) {
            for y in y0..y1 {
                for x in x0..x1 {
                    out.set_sample(x, y, 0, light.shade(src, x, y, z_factor));
                }
            }
        }

        *changed = grown;
        Ok(())
    }
}

struct Light {
    zenith: f64,
    azimuth: f64,
}

impl Light {
    fn new(azimuth_deg: f64, altitude_deg: f64) -> Self {
        Self {
            zenith: (90.0 - altitude_deg).to_radians(),
            // compass bearing to math angle
            azimuth: (360.0 - azimuth_deg + 90.0).rem_euclid(360.0).to_radians(),
        }
    }

    fn shade(&self, src: &Raster, x: u32, y: u32, z_factor: f64) -> f64 {
        let at = |dx: i64, dy: i64| {
            let sx = (x as i64 + dx).clamp(0, src.width() as i64 - 1) as u32;
            let sy = (y as i64 + dy).clamp(0, src.height() as i64 - 1) as u32;
            let v = src.sample(sx, sy, 0);
            if v.is_finite() {
                v
            } else {
                src.sample(x, y, 0)
            }
        };
        let (a, b, c) = (at(-1, -1), at(0, -1), at(1, -1));
        let (d, f) = (at(-1, 0), at(1, 0));
        let (g, h, i) = (at(-1, 1), at(0, 1), at(1, 1));

        let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / 8.0;
        let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / 8.0;
        if !(dz_dx.is_finite() && dz_dy.is_finite()) {
            return 0.0;
        }

        let slope = (z_factor * dz_dx.hypot(dz_dy)).atan();
        let aspect = dz_dy.atan2(-dz_dx);
        let shade = self.zenith.cos() * slope.cos()
            + self.zenith.sin() * slope.sin() * (self.azimuth - aspect).cos();
        (255.0 * shade).clamp(0.0, 255.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::full_area;

    fn hillshade() -> Hillshade {
        Hillshade::new(
            StageSettings::Hillshade {
                azimuth: 315.0,
                altitude: 45.0,
                z_factor: 1.0,
            }
            .into(),
        )
    }

    #[test]
    fn test_flat_terrain_shade() {
        let stage = hillshade();
        let mut buffer = StageBuffer::single(Raster::filled(3, 3, RasterShape::ELEVATION16, &[100.0]));
        stage.process(0, &mut buffer, &mut full_area(3, 3)).unwrap();

        let out = buffer.take_output().unwrap();
        // 255 * sin(45°)
        assert_eq!(out.sample(1, 1, 0), 180.0);
    }

    #[test]
    fn test_changed_area_grows_and_clips() {
        let stage = hillshade();
        let mut buffer = StageBuffer::single(Raster::new(4, 4, RasterShape::ELEVATION32));
        let mut changed = RegionSet::from_rect(Rect::new(0.0, 1.0, 1.0, 2.0));
        stage.process(0, &mut buffer, &mut changed).unwrap();

        assert!(changed.is_equivalent(&RegionSet::from_rect(Rect::new(0.0, 0.0, 2.0, 3.0))));
        let out = buffer.take_output().unwrap();
        assert_eq!(out.sample(1, 2, 0), 180.0);
        assert_eq!(out.sample(3, 3, 0), 0.0);
    }

    #[test]
    fn test_rejects_color_input() {
        let stage = hillshade();
        let mut buffer = StageBuffer::single(Raster::new(1, 1, RasterShape::RGB8));
        let err = stage.process(0, &mut buffer, &mut full_area(1, 1)).unwrap_err();
        assert!(matches!(err, StageError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_slope_facing_light_is_brighter() {
        let stage = hillshade();
        // Rising toward the east faces west, toward a north-west light.
        let east = Raster::from_f32(3, 3, 1, vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0]).unwrap();
        let west = Raster::from_f32(3, 3, 1, vec![2.0, 1.0, 0.0, 2.0, 1.0, 0.0, 2.0, 1.0, 0.0]).unwrap();

        let mut a = StageBuffer::single(east);
        stage.process(0, &mut a, &mut full_area(3, 3)).unwrap();
        let mut b = StageBuffer::single(west);
        stage.process(0, &mut b, &mut full_area(3, 3)).unwrap();

        let lit_east = a.take_output().unwrap().sample(1, 1, 0);
        let lit_west = b.take_output().unwrap().sample(1, 1, 0);
        assert!(lit_east > lit_west);
    }
}
