//! Core data structures.
//!
//! This module contains the fundamental types used throughout the system:
//! - `ParameterVector`: face coefficients plus light, position and scale
//! - `RenderedImage` / `TargetImage`: per-pixel data the cost is computed on
//! - Math utilities: spherical conversion, rotation offset
//!
//! All types here are "pure data" - no I/O, no rendering logic.

pub mod frame;
pub mod math;
pub mod parameters;

// Re-export public types
pub use frame::{RenderedImage, TargetImage};
pub use math::{spherical_to_cartesian, InitialRotation};
pub use parameters::{
    flat_len, vector3, ParameterError, ParameterVector, ToFace, DIRECTION_COMPONENTS_COUNT,
    LIGHT_COMPONENTS_COUNT, NON_PCS_COUNT, SCALE_COMPONENTS_COUNT,
};
