//! Stage settings and their shared, observable handles.
//!
//! [`StageSettings`] is plain data describing one stage. Editors and the
//! stages built from it share a [`StageSettingsHandle`]: updates through any
//! clone of the handle are seen by all of them, and subscribers are notified.
//! [`StageSettingsHandle::deep_copy`] starts an independent lineage with its
//! own value and no subscribers.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Stage behavior selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Grayscale,
    LinearStretch,
    Colormap,
    Hillshade,
    Opacity,
    Overlay,
}

impl StageKind {
    /// Whether this kind merges legs rather than transforming one.
    pub fn is_composite(&self) -> bool {
        matches!(self, StageKind::Overlay)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Grayscale => "grayscale",
            StageKind::LinearStretch => "linear_stretch",
            StageKind::Colormap => "colormap",
            StageKind::Hillshade => "hillshade",
            StageKind::Opacity => "opacity",
            StageKind::Overlay => "overlay",
        };
        f.write_str(name)
    }
}

/// Color ramps for the colormap stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRamp {
    Gray,
    Terrain,
    Heat,
}

impl ColorRamp {
    fn stops(&self) -> &'static [[u8; 3]] {
        match self {
            ColorRamp::Gray => &[[0, 0, 0], [255, 255, 255]],
            ColorRamp::Terrain => &[
                [20, 40, 120],
                [40, 140, 70],
                [200, 180, 90],
                [140, 90, 60],
                [250, 250, 250],
            ],
            ColorRamp::Heat => &[[0, 0, 0], [180, 20, 0], [255, 200, 0], [255, 255, 255]],
        }
    }

    /// Color at `t` in `[0, 1]`, interpolated between stops.
    pub fn color(&self, t: f64) -> [u8; 3] {
        let stops = self.stops();
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let scaled = t * (stops.len() - 1) as f64;
        let i = (scaled.floor() as usize).min(stops.len() - 2);
        let frac = scaled - i as f64;
        let (a, b) = (stops[i], stops[i + 1]);
        let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * frac).round() as u8;
        [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
    }
}

/// Settings of one pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageSettings {
    Grayscale,
    LinearStretch { min: f64, max: f64 },
    Colormap { min: f64, max: f64, ramp: ColorRamp },
    Hillshade { azimuth: f64, altitude: f64, z_factor: f64 },
    Opacity { alpha: f64 },
    Overlay,
}

impl StageSettings {
    pub fn kind(&self) -> StageKind {
        match self {
            StageSettings::Grayscale => StageKind::Grayscale,
            StageSettings::LinearStretch { .. } => StageKind::LinearStretch,
            StageSettings::Colormap { .. } => StageKind::Colormap,
            StageSettings::Hillshade { .. } => StageKind::Hillshade,
            StageSettings::Opacity { .. } => StageKind::Opacity,
            StageSettings::Overlay => StageKind::Overlay,
        }
    }

    /// Default settings for a stage kind.
    pub fn default_for(kind: StageKind) -> Self {
        match kind {
            StageKind::Grayscale => StageSettings::Grayscale,
            StageKind::LinearStretch => StageSettings::LinearStretch {
                min: -8000.0,
                max: 21000.0,
            },
            StageKind::Colormap => StageSettings::Colormap {
                min: -8000.0,
                max: 21000.0,
                ramp: ColorRamp::Terrain,
            },
            StageKind::Hillshade => StageSettings::Hillshade {
                azimuth: 315.0,
                altitude: 45.0,
                z_factor: 1.0,
            },
            StageKind::Opacity => StageSettings::Opacity { alpha: 1.0 },
            StageKind::Overlay => StageSettings::Overlay,
        }
    }
}

/// Shared, observable stage settings.
///
/// Cloning the handle shares the settings. Use [`Self::deep_copy`] for an
/// independent copy.
#[derive(Clone)]
pub struct StageSettingsHandle {
    sender: Arc<watch::Sender<StageSettings>>,
}

impl StageSettingsHandle {
    pub fn new(settings: StageSettings) -> Self {
        let (sender, _) = watch::channel(settings);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.sender.borrow().kind()
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> StageSettings {
        self.sender.borrow().clone()
    }

    /// Replaces the settings and notifies subscribers.
    ///
    /// The stage kind is fixed for the life of a handle; a replacement of
    /// another kind is ignored and `false` is returned.
    pub fn set(&self, settings: StageSettings) -> bool {
        if settings.kind() != self.kind() {
            return false;
        }
        self.sender.send_replace(settings);
        true
    }

    /// Edits the settings in place and notifies subscribers.
    ///
    /// Edits that change the stage kind are reverted.
    pub fn update(&self, edit: impl FnOnce(&mut StageSettings)) {
        self.sender.send_modify(|settings| {
            let before = settings.clone();
            edit(settings);
            if settings.kind() != before.kind() {
                *settings = before;
            }
        });
    }

    /// Receiver notified of every change from now on.
    pub fn subscribe(&self) -> watch::Receiver<StageSettings> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// An independent copy of the current settings with no subscribers.
    pub fn deep_copy(&self) -> Self {
        Self::new(self.get())
    }

    /// Whether both handles share the same settings.
    pub fn shares_with(&self, other: &StageSettingsHandle) -> bool {
        Arc::ptr_eq(&self.sender, &other.sender)
    }
}

impl fmt::Debug for StageSettingsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StageSettingsHandle")
            .field(&*self.sender.borrow())
            .finish()
    }
}

impl From<StageSettings> for StageSettingsHandle {
    fn from(settings: StageSettings) -> Self {
        Self::new(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            StageKind::Grayscale,
            StageKind::LinearStretch,
            StageKind::Colormap,
            StageKind::Hillshade,
            StageKind::Opacity,
            StageKind::Overlay,
        ] {
            assert_eq!(StageSettings::default_for(kind).kind(), kind);
        }
        assert!(StageKind::Overlay.is_composite());
        assert!(!StageKind::Hillshade.is_composite());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(StageKind::LinearStretch.to_string(), "linear_stretch");
        assert_eq!(StageSettings::default_for(StageKind::Hillshade).kind().to_string(), "hillshade");
        assert_eq!(StageKind::Overlay.to_string(), "overlay");
    }

    #[test]
    fn test_clones_share_settings() {
        let handle = StageSettingsHandle::new(StageSettings::Opacity { alpha: 1.0 });
        let editor = handle.clone();
        editor.update(|s| {
            if let StageSettings::Opacity { alpha } = s {
                *alpha = 0.5;
            }
        });
        assert_eq!(handle.get(), StageSettings::Opacity { alpha: 0.5 });
        assert!(handle.shares_with(&editor));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let handle = StageSettingsHandle::new(StageSettings::Opacity { alpha: 1.0 });
        let _rx = handle.subscribe();
        let copy = handle.deep_copy();

        assert_eq!(copy.subscriber_count(), 0);
        assert_eq!(handle.subscriber_count(), 1);
        assert!(!copy.shares_with(&handle));

        copy.set(StageSettings::Opacity { alpha: 0.1 });
        assert_eq!(handle.get(), StageSettings::Opacity { alpha: 1.0 });
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let handle = StageSettingsHandle::new(StageSettings::Opacity { alpha: 1.0 });
        let mut rx = handle.subscribe();

        assert!(handle.set(StageSettings::Opacity { alpha: 0.25 }));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), StageSettings::Opacity { alpha: 0.25 });
    }

    #[test]
    fn test_kind_cannot_change() {
        let handle = StageSettingsHandle::new(StageSettings::Grayscale);
        assert!(!handle.set(StageSettings::Opacity { alpha: 0.5 }));
        handle.update(|s| *s = StageSettings::Overlay);
        assert_eq!(handle.kind(), StageKind::Grayscale);
    }

    #[test]
    fn test_ramp_endpoints() {
        assert_eq!(ColorRamp::Gray.color(0.0), [0, 0, 0]);
        assert_eq!(ColorRamp::Gray.color(1.0), [255, 255, 255]);
        assert_eq!(ColorRamp::Gray.color(f64::NAN), [0, 0, 0]);
        assert_eq!(ColorRamp::Terrain.color(2.0), [250, 250, 250]);
    }
}
