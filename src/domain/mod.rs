//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - coupling and signal descriptions (`CouplingItem`, `SignalShape`)
//! - fit configuration enums (`AmplitudeMode`, `LineShape`, `OptimizerKind`)
//! - parameter boxes (`ParamBound`, `ParameterBounds`)
//! - decoded fit outputs (`FittedSignal`, `FittedLine`)

pub mod types;

pub use types::*;
