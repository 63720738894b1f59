//! Input/output helpers.
//!
//! - raw trace file reading + validation (`trace`)
//! - run spec JSON (sample/magnet metadata) (`run_spec`)
//! - result exports (report text, audit CSV, results JSON) (`export`)

pub mod export;
pub mod run_spec;
pub mod trace;

pub use export::*;
pub use run_spec::*;
pub use trace::*;
