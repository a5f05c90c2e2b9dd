//! I/O operations.
//!
//! Only the debug shading artifact lives here; loading target images and
//! models is left to the host.

mod artifact;

// Re-export public types and functions
pub use artifact::{save_shading_png, shading_to_luma8, ArtifactError};
