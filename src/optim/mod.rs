//! Optimization components.
//!
//! This module contains everything needed for fitting:
//! - The fitting protocol (request/response discipline, cost)
//! - Batch gradient descent over finite-difference gradients
//! - Light estimation and shading
//! - Configuration and the host loop

pub mod bgd;
pub mod config;
pub mod light;
pub mod loss;
pub mod protocol;
pub mod session;

pub use bgd::{BatchGradientDescent, Phase};
pub use config::FitConfig;
pub use light::{shade, FixedLight, LeastSquaresLight, LightEstimator};
pub use protocol::{FinishCallback, FitError, FittingProtocol, ModelFitter};
pub use session::FitSession;
