//! # face-fit: analysis-by-synthesis face model fitting
//!
//! This crate fits a parametric 3D face model to a 2D target image. Candidate
//! parameters are rendered by an external renderer, compared against the
//! target, and refined with finite-difference gradient descent.
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - `core`: Fundamental data structures (parameter vector, rendered/target images)
//! - `render`: Renderer contract (request/response, labels, sync adapter)
//! - `optim`: Fitting protocol, batch gradient descent, light estimation, config
//! - `io`: Debug artifact output
//!
//! ## Driving a fit
//!
//! ```no_run
//! use face_fit::core::{InitialRotation, ParameterVector, RenderedImage, TargetImage};
//! use face_fit::optim::{BatchGradientDescent, FitConfig, FitSession, LeastSquaresLight};
//! use face_fit::render::{ImmediateRenderer, RenderError};
//!
//! fn render(params: &ParameterVector, rotation: &InitialRotation) -> Result<RenderedImage, RenderError> {
//!     // Rasterize the face model into a normal map here.
//!     # unimplemented!()
//! }
//!
//! let target = TargetImage::filled(500, 500, 0.0);
//! let fitter = BatchGradientDescent::new(
//!     target,
//!     ImmediateRenderer::new(render),
//!     LeastSquaresLight::default(),
//!     &FitConfig::default(),
//! )?
//! .with_finish_callback(|face| println!("{face}"));
//!
//! let fitter = FitSession::new(fitter).run()?;
//! # Ok::<(), face_fit::optim::FitError>(())
//! ```

// Core data structures
pub mod core;

// Renderer contract
pub mod render;

// Optimization (protocol, gradient descent, light)
pub mod optim;

// I/O operations (debug artifact)
pub mod io;

// Re-export commonly used types at crate root for convenience
pub use crate::core::{InitialRotation, ParameterError, ParameterVector, RenderedImage, TargetImage};
pub use crate::optim::{BatchGradientDescent, FitConfig, FitError, FitSession, ModelFitter};
pub use crate::render::{RenderLabel, Renderer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
