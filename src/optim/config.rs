//! Fitting configuration.
//!
//! Every field has a default, so a JSON file only needs to list what differs:
//!
//! ```json
//! { "dimensions": 40, "max_loops": 5, "artifact_path": null }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{InitialRotation, ParameterVector};
use crate::optim::FitError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Number of principal coefficients `P`; zero fits only direction, scale
    /// and light
    pub dimensions: usize,

    /// Finite-difference step
    pub dx: f32,

    /// Gradient descent learning rate
    pub step_size: f32,

    /// Iteration cap.
    ///
    /// Zero behaves like one: a fit always completes one full sweep over every
    /// coordinate and applies its gradient before finishing, so the result is
    /// never just the starting point. `L` loops cost `L·(2D + 1) + 1` renders.
    pub max_loops: usize,

    /// Seed face; coefficient count is corrected to `dimensions`
    pub initial_face: Option<ParameterVector>,

    /// Offset added to light and head angles before cartesian conversion
    pub initial_rotation: InitialRotation,

    /// Where to write the final shading image; `None` skips it
    pub artifact_path: Option<PathBuf>,

    /// Start descent from `initial_face` instead of the zero vector
    pub warm_start: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            dimensions: 199,
            dx: 0.01,
            step_size: 0.1,
            max_loops: 1,
            initial_face: None,
            initial_rotation: InitialRotation::default(),
            artifact_path: Some(PathBuf::from("img.png")),
            warm_start: false,
        }
    }
}

impl FitConfig {
    pub fn from_json_str(json: &str) -> Result<Self, FitError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, FitError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if !(self.dx.is_finite() && self.dx > 0.0) {
            return Err(FitError::InvalidConfig(format!(
                "dx must be a positive number, got {}",
                self.dx
            )));
        }
        if !self.step_size.is_finite() {
            return Err(FitError::InvalidConfig(format!(
                "step_size must be finite, got {}",
                self.step_size
            )));
        }
        Ok(())
    }
}
