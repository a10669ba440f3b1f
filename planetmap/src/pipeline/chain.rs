//! Pipelines: legs of stages feeding one composite.
//!
//! ```text
//! source A ─► stage ─► stage ─┐
//!                             ├─► composite ─► raster
//! source B ─► stage ──────────┘
//! ```
//!
//! Cloning a [`Pipeline`] deep-copies every stage's settings, so per-tile
//! clones never share state with each other or with an editor.

use super::error::{PipelineError, StageError};
use super::registry::{can_insert, Slot, StageRegistry};
use super::settings::{StageKind, StageSettings, StageSettingsHandle};
use super::stage::{build_stage, full_area, FailurePolicy, Stage, StageBuffer};
use crate::geo::{Offset, RegionSet};
use crate::raster::{Raster, RasterShape};
use crate::source::MapSource;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

struct LegFailure {
    stage: StageKind,
    policy: FailurePolicy,
    error: StageError,
}

/// One source and the stages applied to its rasters.
pub struct Leg {
    source: Arc<dyn MapSource>,
    stages: Vec<Box<dyn Stage>>,
}

impl Leg {
    pub fn source(&self) -> &Arc<dyn MapSource> {
        &self.source
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    /// Settings of each stage, in order.
    pub fn settings(&self) -> Vec<StageSettingsHandle> {
        self.stages.iter().map(|s| s.settings().clone()).collect()
    }

    /// Shape flowing into stage `index` (the output shape when `index` is
    /// the stage count).
    pub fn shape_at(&self, index: usize) -> RasterShape {
        match index.checked_sub(1).and_then(|i| self.stages.get(i)) {
            Some(stage) => stage.produces(),
            None => self.source.shape(),
        }
    }

    pub fn output_shape(&self) -> RasterShape {
        self.shape_at(self.stages.len())
    }

    /// Runs the leg's stages over `raster`.
    ///
    /// `changed` starts as the whole raster and carries each stage's
    /// reported area on to the next.
    fn run(&self, raster: Raster, changed: &mut RegionSet) -> Result<Raster, LegFailure> {
        let mut raster = raster;
        for stage in &self.stages {
            let fail = |error| LegFailure {
                stage: stage.kind(),
                policy: stage.failure_policy(),
                error,
            };
            let mut buffer = StageBuffer::single(raster);
            stage.process(0, &mut buffer, changed).map_err(fail)?;
            raster = buffer
                .take_output()
                .ok_or_else(|| fail(StageError::MissingInput(0)))?;
        }
        Ok(raster)
    }
}

impl Clone for Leg {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            stages: self
                .stages
                .iter()
                .map(|s| build_stage(s.settings().deep_copy()))
                .collect(),
        }
    }
}

impl fmt::Debug for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leg")
            .field("source", self.source.id())
            .field("stages", &self.stages.iter().map(|s| s.kind()).collect::<Vec<_>>())
            .finish()
    }
}

/// Result of running a pipeline over one tile.
#[derive(Debug)]
pub struct PipelineOutput {
    pub raster: Raster,
    /// Pixels the composite wrote.
    pub changed: RegionSet,
    /// Legs dropped after a stage failure.
    pub dropped_legs: Vec<usize>,
}

/// Legs feeding a composite stage.
pub struct Pipeline {
    name: String,
    legs: Vec<Leg>,
    composite: Box<dyn Stage>,
}

impl Pipeline {
    /// Creates a pipeline with no legs.
    pub fn new(name: impl Into<String>, composite: StageSettingsHandle) -> Result<Self, PipelineError> {
        let kind = composite.kind();
        if !kind.is_composite() {
            return Err(PipelineError::NotComposite(kind));
        }
        Ok(Self {
            name: name.into(),
            legs: Vec::new(),
            composite: build_stage(composite),
        })
    }

    /// A one-leg pipeline for `source`, with stages auto-filled from the
    /// registry to bridge the source's shape to the default composite.
    pub fn for_source(registry: &StageRegistry, source: Arc<dyn MapSource>) -> Result<Self, PipelineError> {
        let composite = registry
            .default_composite()
            .ok_or(PipelineError::NotComposite(StageKind::Overlay))?;
        let mut pipeline = Pipeline::new(
            source.id().as_str(),
            StageSettingsHandle::new(StageSettings::default_for(composite)),
        )?;

        let chain = registry.auto_fill(source.shape(), pipeline.composite.as_ref(), 0)?;
        let stages = chain
            .into_iter()
            .map(|kind| StageSettingsHandle::new(StageSettings::default_for(kind)))
            .collect();
        pipeline.add_leg(source, stages)?;
        Ok(pipeline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn composite(&self) -> &dyn Stage {
        self.composite.as_ref()
    }

    /// World offset of the first leg's source.
    pub fn nudge(&self) -> Offset {
        self.legs
            .first()
            .map(|leg| leg.source.nudge())
            .unwrap_or(Offset::ZERO)
    }

    /// Appends a leg, checking every stage against its neighbors.
    pub fn add_leg(
        &mut self,
        source: Arc<dyn MapSource>,
        stages: Vec<StageSettingsHandle>,
    ) -> Result<(), PipelineError> {
        let leg = Leg {
            source,
            stages: stages.into_iter().map(build_stage).collect(),
        };
        self.check_leg(&leg, self.legs.len())?;
        self.legs.push(leg);
        Ok(())
    }

    pub fn remove_leg(&mut self, leg: usize) -> Result<Leg, PipelineError> {
        self.check_leg_index(leg)?;
        Ok(self.legs.remove(leg))
    }

    /// Inserts a stage at `index` of leg `leg`.
    ///
    /// Refused unless the stage accepts the shape flowing in and its output
    /// is accepted by the next stage (or the composite).
    pub fn insert_stage(
        &mut self,
        leg: usize,
        index: usize,
        settings: StageSettingsHandle,
    ) -> Result<(), PipelineError> {
        self.check_leg_index(leg)?;
        let candidate = build_stage(settings);
        let target = &self.legs[leg];
        if index > target.stages.len() {
            return Err(PipelineError::OutOfRange {
                index,
                len: target.stages.len(),
            });
        }
        if candidate.kind().is_composite() {
            return Err(PipelineError::CompositeInLeg(candidate.kind()));
        }

        let slot = Slot {
            input_shape: target.shape_at(index),
            successor: target
                .stages
                .get(index)
                .map(|s| s.as_ref())
                .unwrap_or(self.composite.as_ref()),
            successor_input: if index < target.stages.len() { 0 } else { leg },
        };
        if !can_insert(candidate.as_ref(), &slot) {
            return Err(PipelineError::IncompatibleStage {
                stage: candidate.kind(),
                index,
                reason: format!(
                    "takes {:?} and produces {}, but {} flows in",
                    candidate.consumes(0),
                    candidate.produces(),
                    slot.input_shape
                ),
            });
        }

        self.legs[leg].stages.insert(index, candidate);
        Ok(())
    }

    /// Removes stage `index` of leg `leg`, returning its settings.
    ///
    /// Refused when the neighbors would no longer fit together.
    pub fn remove_stage(&mut self, leg: usize, index: usize) -> Result<StageSettingsHandle, PipelineError> {
        self.check_leg_index(leg)?;
        let len = self.legs[leg].stages.len();
        if index >= len {
            return Err(PipelineError::OutOfRange { index, len });
        }

        let target = &self.legs[leg];
        let input_shape = target.shape_at(index);
        let fits = match target.stages.get(index + 1) {
            Some(next) => next.accepts(0, input_shape),
            None => self.composite.accepts(leg, input_shape),
        };
        if !fits {
            return Err(PipelineError::IncompatibleStage {
                stage: target.stages[index].kind(),
                index,
                reason: format!("removing it would pass {} downstream", input_shape),
            });
        }

        let stage = self.legs[leg].stages.remove(index);
        Ok(stage.settings().clone())
    }

    /// Checks every leg.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (i, leg) in self.legs.iter().enumerate() {
            self.check_leg(leg, i)?;
        }
        Ok(())
    }

    /// Runs the pipeline over one tile's leg rasters, in leg order.
    ///
    /// Legs without data are skipped. A failing transform stage drops its
    /// leg; a failing composite fails the whole call.
    pub fn execute(&self, inputs: Vec<Option<Raster>>) -> Result<PipelineOutput, PipelineError> {
        if inputs.len() != self.legs.len() {
            return Err(PipelineError::InputCount {
                legs: self.legs.len(),
                inputs: inputs.len(),
            });
        }

        let mut buffer = StageBuffer::default();
        let mut areas = Vec::with_capacity(inputs.len());
        let mut dropped_legs = Vec::new();

        for (i, (leg, input)) in self.legs.iter().zip(inputs).enumerate() {
            let Some(raster) = input else {
                buffer.inputs.push(None);
                areas.push(RegionSet::new());
                continue;
            };
            let mut changed = full_area(raster.width(), raster.height());
            match leg.run(raster, &mut changed) {
                Ok(out) => {
                    buffer.inputs.push(Some(out));
                    areas.push(changed);
                }
                Err(LegFailure { stage, policy, error }) => {
                    if policy == FailurePolicy::FailTile {
                        return Err(PipelineError::Stage { stage, source: error });
                    }
                    warn!(
                        pipeline = %self.name,
                        leg = i,
                        %stage,
                        error = %error,
                        "Stage failed, dropping leg"
                    );
                    buffer.inputs.push(None);
                    areas.push(RegionSet::new());
                    dropped_legs.push(i);
                }
            }
        }

        let mut changed = RegionSet::new();
        for (i, mut area) in areas.into_iter().enumerate() {
            if buffer.inputs[i].is_none() {
                continue;
            }
            self.composite
                .process(i, &mut buffer, &mut area)
                .map_err(|source| PipelineError::Stage {
                    stage: self.composite.kind(),
                    source,
                })?;
            changed.add_region(&area);
        }

        let raster = buffer.take_output().ok_or(PipelineError::NoData)?;
        trace!(pipeline = %self.name, dropped = dropped_legs.len(), "Pipeline executed");
        Ok(PipelineOutput {
            raster,
            changed,
            dropped_legs,
        })
    }

    fn check_leg_index(&self, leg: usize) -> Result<(), PipelineError> {
        if leg >= self.legs.len() {
            return Err(PipelineError::OutOfRange {
                index: leg,
                len: self.legs.len(),
            });
        }
        Ok(())
    }

    fn check_leg(&self, leg: &Leg, position: usize) -> Result<(), PipelineError> {
        let mut shape = leg.source.shape();
        for (index, stage) in leg.stages.iter().enumerate() {
            if stage.kind().is_composite() {
                return Err(PipelineError::CompositeInLeg(stage.kind()));
            }
            if !stage.accepts(0, shape) {
                return Err(PipelineError::IncompatibleStage {
                    stage: stage.kind(),
                    index,
                    reason: format!("{} flows in", shape),
                });
            }
            shape = stage.produces();
        }
        if !self.composite.accepts(position, shape) {
            return Err(PipelineError::IncompatibleStage {
                stage: self.composite.kind(),
                index: leg.stages.len(),
                reason: format!("leg {} ends in {}", position, shape),
            });
        }
        Ok(())
    }
}

impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            legs: self.legs.clone(),
            composite: build_stage(self.composite.settings().deep_copy()),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("legs", &self.legs)
            .field("composite", &self.composite.kind())
            .finish()
    }
}
