//! Mathematical utilities: least squares and Savitzky–Golay filtering.

pub mod ols;
pub mod savgol;

pub use ols::*;
pub use savgol::*;
