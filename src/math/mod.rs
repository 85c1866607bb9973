//! Mathematical utilities: line shapes and (non-negative) least squares.

pub mod lineshape;
pub mod ols;

pub use lineshape::*;
pub use ols::*;
