//! Mathematical utilities (spherical angles, rotation offset).

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Global rotation added to every encoded angle pair.
///
/// Light and head direction are both stored as `[sin φ, sin θ, _]`; when
/// converted to cartesian form the offset is added after `asin`. Passed
/// explicitly so two fitters can run with different offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialRotation {
    pub phi: f32,
    pub theta: f32,
}

impl InitialRotation {
    pub fn new(phi: f32, theta: f32) -> Self {
        Self { phi, theta }
    }
}

/// Convert spherical coordinates to cartesian.
///
/// `phi` is the azimuthal angle, `theta` the polar angle:
/// (x, y, z) = r · (sin θ cos φ, sin θ sin φ, cos θ)
pub fn spherical_to_cartesian(phi: f32, theta: f32, radius: f32) -> Vector3<f32> {
    let (sin_phi, cos_phi) = phi.sin_cos();
    let (sin_theta, cos_theta) = theta.sin_cos();

    Vector3::new(
        radius * sin_theta * cos_phi,
        radius * sin_theta * sin_phi,
        radius * cos_theta,
    )
}
