//! Registry of available stage kinds.
//!
//! Editing tools ask the registry which stages may go where, and new
//! pipelines use it to bridge a source's raster shape to what the composite
//! accepts.

use super::error::PipelineError;
use super::settings::{StageKind, StageSettings, StageSettingsHandle};
use super::stage::{default_stage, Stage};
use crate::raster::RasterShape;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Longest stage chain [`StageRegistry::auto_fill`] will build.
pub const MAX_AUTO_FILL: usize = 3;

/// Where a candidate stage would sit: the shape flowing into it and the
/// stage input that would consume its output.
pub struct Slot<'a> {
    pub input_shape: RasterShape,
    pub successor: &'a dyn Stage,
    pub successor_input: usize,
}

/// Whether `candidate` fits `slot`: it accepts the shape flowing in and its
/// output is accepted downstream.
pub fn can_insert(candidate: &dyn Stage, slot: &Slot<'_>) -> bool {
    !candidate.kind().is_composite()
        && candidate.accepts(0, slot.input_shape)
        && slot.successor.accepts(slot.successor_input, candidate.produces())
}

/// Stage kinds known to a pipeline builder.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    kinds: Vec<StageKind>,
}

impl StageRegistry {
    pub fn new(kinds: Vec<StageKind>) -> Self {
        Self { kinds }
    }

    /// All built-in stages.
    pub fn standard() -> Self {
        Self::new(vec![
            StageKind::Grayscale,
            StageKind::LinearStretch,
            StageKind::Colormap,
            StageKind::Hillshade,
            StageKind::Opacity,
            StageKind::Overlay,
        ])
    }

    pub fn kinds(&self) -> &[StageKind] {
        &self.kinds
    }

    pub fn contains(&self, kind: StageKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Fresh settings for a registered kind.
    pub fn create(&self, kind: StageKind) -> Option<StageSettingsHandle> {
        self.contains(kind)
            .then(|| StageSettingsHandle::new(StageSettings::default_for(kind)))
    }

    /// The composite used for new pipelines.
    pub fn default_composite(&self) -> Option<StageKind> {
        self.kinds.iter().copied().find(StageKind::is_composite)
    }

    /// Registered transform kinds that fit `slot`.
    pub fn candidates(&self, slot: &Slot<'_>) -> Vec<StageKind> {
        self.transforms()
            .filter(|kind| can_insert(default_stage(*kind).as_ref(), slot))
            .collect()
    }

    /// Shortest chain of at most [`MAX_AUTO_FILL`] transform stages turning
    /// `from` into a shape accepted by input `input` of `target`.
    ///
    /// Returns an empty chain when `target` already accepts `from`. Ties
    /// between equally short chains go to the kind registered first.
    pub fn auto_fill(
        &self,
        from: RasterShape,
        target: &dyn Stage,
        input: usize,
    ) -> Result<Vec<StageKind>, PipelineError> {
        if target.accepts(input, from) {
            return Ok(Vec::new());
        }

        let stages: Vec<Box<dyn Stage>> = self.transforms().map(default_stage).collect();
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([(from, Vec::new())]);

        while let Some((shape, chain)) = queue.pop_front() {
            if chain.len() >= MAX_AUTO_FILL {
                continue;
            }
            for stage in &stages {
                if !stage.accepts(0, shape) {
                    continue;
                }
                let next = stage.produces();
                let mut extended: Vec<StageKind> = chain.clone();
                extended.push(stage.kind());

                if target.accepts(input, next) {
                    debug!(from = %from, chain = ?extended, "Auto-filled stage chain");
                    return Ok(extended);
                }
                if seen.insert(next) {
                    queue.push_back((next, extended));
                }
            }
        }

        Err(PipelineError::NoBridge { from })
    }

    fn transforms(&self) -> impl Iterator<Item = StageKind> + '_ {
        self.kinds.iter().copied().filter(|k| !k.is_composite())
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay() -> Box<dyn Stage> {
        default_stage(StageKind::Overlay)
    }

    #[test]
    fn test_auto_fill_passthrough() {
        let registry = StageRegistry::standard();
        let chain = registry.auto_fill(RasterShape::RGB8, overlay().as_ref(), 0).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_auto_fill_elevation() {
        let registry = StageRegistry::standard();
        let chain = registry
            .auto_fill(RasterShape::ELEVATION16, overlay().as_ref(), 0)
            .unwrap();
        assert_eq!(chain, vec![StageKind::LinearStretch]);
    }

    #[test]
    fn test_auto_fill_other_target() {
        // Opacity takes RGBA only; colormap bridges from elevation.
        let registry = StageRegistry::new(vec![StageKind::Colormap, StageKind::Opacity]);
        let target = default_stage(StageKind::Opacity);
        let chain = registry
            .auto_fill(RasterShape::ELEVATION32, target.as_ref(), 0)
            .unwrap();
        assert_eq!(chain, vec![StageKind::Colormap]);

        let registry = StageRegistry::new(vec![StageKind::Hillshade]);
        let err = registry
            .auto_fill(RasterShape::ELEVATION32, target.as_ref(), 0)
            .unwrap_err();
        assert_eq!(err, PipelineError::NoBridge { from: RasterShape::ELEVATION32 });
    }

    #[test]
    fn test_can_insert() {
        let composite = overlay();
        let slot = Slot {
            input_shape: RasterShape::ELEVATION16,
            successor: composite.as_ref(),
            successor_input: 0,
        };
        assert!(can_insert(default_stage(StageKind::Hillshade).as_ref(), &slot));
        assert!(!can_insert(default_stage(StageKind::Grayscale).as_ref(), &slot));
        assert!(!can_insert(default_stage(StageKind::Overlay).as_ref(), &slot));

        let registry = StageRegistry::standard();
        assert_eq!(
            registry.candidates(&slot),
            vec![StageKind::LinearStretch, StageKind::Colormap, StageKind::Hillshade]
        );
    }

    #[test]
    fn test_create_only_registered() {
        let registry = StageRegistry::new(vec![StageKind::Opacity]);
        assert!(registry.create(StageKind::Opacity).is_some());
        assert!(registry.create(StageKind::Hillshade).is_none());
        assert_eq!(registry.default_composite(), None);
        assert_eq!(StageRegistry::standard().default_composite(), Some(StageKind::Overlay));
    }
}
