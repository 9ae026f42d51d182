//! Common types, traits, and error definitions for pole_ekf
//!
//! This module provides the foundational building blocks shared by the
//! motion model, the observation model and the filter cycle.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
