//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - sample and magnet metadata (`SampleProperties`, `MagnetGeometry`)
//! - the physical constants bundle handed to the decay model (`FitContext`)
//! - fit outputs (`GuessFit`, `ParamEstimate`)
//! - configuration enums (`ModelKind`, `Metric`, `Solvent`, `MagnetGrade`)

pub mod types;

pub use types::*;
