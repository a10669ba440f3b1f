//! Error types for stages and pipelines.

use super::settings::StageKind;
use crate::raster::RasterShape;
use thiserror::Error;

/// Failure of one stage invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error("stage input {0} is missing")]
    MissingInput(usize),

    #[error("{stage} stage cannot process {shape} rasters")]
    UnexpectedShape { stage: StageKind, shape: RasterShape },

    #[error("input is {actual:?} pixels but the output is {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("invalid {stage} settings: {reason}")]
    InvalidSettings { stage: StageKind, reason: String },
}

/// Errors editing or running a pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The stage cannot sit at that position given its neighbors' shapes.
    #[error("{stage} stage cannot be placed at position {index}: {reason}")]
    IncompatibleStage {
        stage: StageKind,
        index: usize,
        reason: String,
    },

    #[error("{0} is not a composite stage")]
    NotComposite(StageKind),

    #[error("{0} is a composite stage and cannot be used in a leg")]
    CompositeInLeg(StageKind),

    #[error("index {index} out of range (length {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("no stage chain converts {from} into a shape the composite accepts")]
    NoBridge { from: RasterShape },

    #[error("pipeline has {legs} legs but {inputs} inputs were supplied")]
    InputCount { legs: usize, inputs: usize },

    #[error("no leg produced data")]
    NoData,

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: StageError,
    },
}
