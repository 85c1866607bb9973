//! Multiplet line-pattern synthesis.
//!
//! The splitting cascade is a small pure function over explicit scratch
//! buffers so that the fit engine can rerun it on every evaluation without
//! allocating.

pub mod pattern;
pub mod splitting;

pub use pattern::*;
pub use splitting::*;
