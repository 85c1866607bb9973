//! Input/output helpers.
//!
//! - fit request JSON (`request`)
//! - spectrum and model CSV (`spectrum`)
//! - fit result JSON (`result`)

pub mod request;
pub mod result;
pub mod spectrum;

pub use request::*;
pub use result::*;
pub use spectrum::*;
