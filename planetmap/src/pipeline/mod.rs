//! Raster processing pipelines.
//!
//! A [`Pipeline`] is a set of legs, each one source plus an ordered list of
//! transform stages, feeding a composite stage that merges them into one
//! raster per tile.
//!
//! # Architecture
//!
//! ```text
//! StageSettings ──(shared handle)──► Stage ──► Leg ──► Pipeline ──► PipelineOutput
//!       ▲                                                   │
//!       └── editors subscribe                   clone() deep-copies settings
//! ```
//!
//! Settings (data) and stages (behavior) are separate types: a
//! [`StageSettingsHandle`] can be edited and observed while stages built
//! from it read a snapshot on every call.
//!
//! Every stage declares the raster shapes it consumes and produces.
//! Editing operations and [`StageRegistry::auto_fill`] use those
//! declarations to keep each leg well-formed.
//!
//! # Failure policy
//!
//! Transform stages are [`FailurePolicy::DropLeg`]: when one fails its leg
//! contributes nothing to that tile. The composite is
//! [`FailurePolicy::FailTile`]. Stages are never retried.

mod chain;
mod error;
mod registry;
mod settings;
mod stage;
pub mod stages;

pub use chain::{Leg, Pipeline, PipelineOutput};
pub use error::{PipelineError, StageError};
pub use registry::{can_insert, Slot, StageRegistry, MAX_AUTO_FILL};
pub use settings::{ColorRamp, StageKind, StageSettings, StageSettingsHandle};
pub use stage::{build_stage, default_stage, full_area, FailurePolicy, Stage, StageBuffer};
