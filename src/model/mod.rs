//! The magnetophoretic capture model.
//!
//! Closed-form solution of the damped second-order ODE approximating particle
//! capture, evaluated as `concentration(t)` given physical parameters.

pub mod decay;

pub use decay::*;
