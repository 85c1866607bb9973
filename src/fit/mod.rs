//! Spectral fitting.
//!
//! Responsibilities:
//!
//! - lay out signal parameters in a flat vector
//! - map parameters to and from the optimizer's `[0, 100]` box
//! - evaluate the model (direct or separable amplitudes) and its residual
//! - drive a bounded derivative-free optimizer and keep the best point

pub mod cmaes;
pub mod engine;
pub mod layout;
pub mod optimizer;
pub mod scaling;
pub mod session;
pub mod trust_region;

pub use cmaes::*;
pub use engine::*;
pub use layout::*;
pub use optimizer::*;
pub use scaling::*;
pub use session::*;
pub use trust_region::*;
