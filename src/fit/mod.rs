//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - generate guess grids for the decay model parameters
//! - enforce parameter bounds via smooth transforms
//! - run bounded nonlinear least squares per guess (parallel)
//! - track the running optimum per enabled metric

pub mod bounded;
pub mod guess_grid;
pub mod optimizer;
pub mod selection;

pub use bounded::*;
pub use guess_grid::*;
pub use optimizer::*;
pub use selection::*;
