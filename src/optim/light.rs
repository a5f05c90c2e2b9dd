//! Light estimation and shading.
//!
//! The fitter only needs two things from lighting: a light vector for a given
//! normal map, and the per-pixel shading `normal · light`. Light is a 4-vector
//! so the validity channel of each pixel picks up the ambient term:
//!
//! ```text
//! shade_i = nx·lx + ny·ly + nz·lz + validity·ambient
//! ```
//!
//! How the light vector is found is pluggable via [`LightEstimator`].

use nalgebra::{DMatrix, DVector, Vector4};

use crate::core::{RenderedImage, TargetImage};
use crate::optim::FitError;

/// Maps a rendered normal map (and the target it is compared to) to a light vector.
pub trait LightEstimator {
    fn estimate_light(
        &self,
        normals: &RenderedImage,
        target: &TargetImage,
    ) -> Result<Vector4<f32>, FitError>;
}

impl<L: LightEstimator + ?Sized> LightEstimator for Box<L> {
    fn estimate_light(
        &self,
        normals: &RenderedImage,
        target: &TargetImage,
    ) -> Result<Vector4<f32>, FitError> {
        (**self).estimate_light(normals, target)
    }
}

/// Per-pixel shading `pixel · light`.
pub fn shade(normals: &RenderedImage, light: &Vector4<f32>) -> Vec<f32> {
    normals.pixels().iter().map(|p| p.dot(light)).collect()
}

/// Always returns the same light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedLight(pub Vector4<f32>);

impl LightEstimator for FixedLight {
    fn estimate_light(&self, _: &RenderedImage, _: &TargetImage) -> Result<Vector4<f32>, FitError> {
        Ok(self.0)
    }
}

/// Least-squares light: minimize Σ (n_i · l - target_i)² over valid pixels.
///
/// Solved with SVD, so tall systems are fine.
#[derive(Clone, Copy, Debug)]
pub struct LeastSquaresLight {
    /// Singular value cutoff passed to the SVD solve
    pub tolerance: f32,
}

impl Default for LeastSquaresLight {
    fn default() -> Self {
        Self { tolerance: 1e-6 }
    }
}

impl LightEstimator for LeastSquaresLight {
    fn estimate_light(
        &self,
        normals: &RenderedImage,
        target: &TargetImage,
    ) -> Result<Vector4<f32>, FitError> {
        if normals.len() != target.len() {
            return Err(FitError::ShapeMismatch {
                expected: target.len(),
                got: normals.len(),
            });
        }

        let rows: Vec<usize> = (0..normals.len())
            .filter(|&i| normals.is_valid(i) && target.is_valid(i))
            .collect();
        if rows.len() < 4 {
            return Err(FitError::LightEstimation(format!(
                "need at least 4 valid pixels, got {}",
                rows.len()
            )));
        }

        let pixels = normals.pixels();
        let a = DMatrix::from_fn(rows.len(), 4, |r, c| pixels[rows[r]][c]);
        let b = DVector::from_iterator(rows.len(), rows.iter().map(|&i| target.values()[i]));

        let svd = a.svd(true, true);
        let solution = svd
            .solve(&b, self.tolerance)
            .map_err(|e| FitError::LightEstimation(e.to_string()))?;
        if !solution.iter().all(|v| v.is_finite()) {
            return Err(FitError::LightEstimation("non-finite light vector".into()));
        }

        Ok(Vector4::new(solution[0], solution[1], solution[2], solution[3]))
    }
}
