//! Face parameter vector.
//!
//! A face is described by:
//! - Principal coefficients (weights of the shape basis)
//! - Position (two encoded angles + one free component)
//! - Per-axis scale
//! - Directed light (two encoded angles + intensity)
//! - Ambient light (kept out of the flat form)
//!
//! The flat form used by the optimizer is laid out as
//! `[coefficients: P][direction: 3][scale: 3][light: 3]`, with the three fixed
//! groups addressed from the end of the vector.

use std::borrow::Cow;
use std::fmt;

use nalgebra::{DMatrix, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::math::{spherical_to_cartesian, InitialRotation};

pub const LIGHT_COMPONENTS_COUNT: usize = 3;
pub const DIRECTION_COMPONENTS_COUNT: usize = 3;
pub const SCALE_COMPONENTS_COUNT: usize = 3;

/// Number of trailing non-coefficient entries in the flat form.
pub const NON_PCS_COUNT: usize =
    LIGHT_COMPONENTS_COUNT + DIRECTION_COMPONENTS_COUNT + SCALE_COMPONENTS_COUNT;

// Offsets from the end of the flat vector.
const DIRECTION_FROM_END: usize = NON_PCS_COUNT;
const SCALE_FROM_END: usize = DIRECTION_FROM_END - DIRECTION_COMPONENTS_COUNT;
const LIGHT_FROM_END: usize = SCALE_FROM_END - SCALE_COMPONENTS_COUNT;

/// Errors raised while building a [`ParameterVector`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParameterError {
    #[error("{field} should be represented by 3D vector, but array of length {len} provided")]
    NotVector3 { field: &'static str, len: usize },

    #[error("Coefficients should be represented by flat array, but matrix of shape ({rows}, {cols}) provided")]
    NotFlat { rows: usize, cols: usize },

    #[error("Flat parameter array needs at least {NON_PCS_COUNT} values, got {len}")]
    TooShort { len: usize },
}

/// Validate that `values` holds exactly three components.
pub fn vector3(values: &[f32], field: &'static str) -> Result<Vector3<f32>, ParameterError> {
    match values {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(ParameterError::NotVector3 {
            field,
            len: values.len(),
        }),
    }
}

/// Full flat length for `pcs` principal coefficients.
pub fn flat_len(pcs: usize) -> usize {
    pcs + NON_PCS_COUNT
}

/// Model coefficients plus light, position and scale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterVector {
    /// Shape basis weights
    pub coefficients: Vec<f32>,

    /// Head direction: `[sin φ, sin θ, free]`
    pub position: Vector3<f32>,

    /// Axis scale factors
    pub scale: Vector3<f32>,

    /// Directed light: `[sin φ, sin θ, intensity]`
    pub directed_light: Vector3<f32>,

    pub ambient_light: f32,
}

impl Default for ParameterVector {
    fn default() -> Self {
        Self {
            coefficients: Vec::new(),
            position: Vector3::new(0.0, 0.0, 1.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
            directed_light: Vector3::zeros(),
            ambient_light: 0.0,
        }
    }
}

impl ParameterVector {
    /// Build a vector from loosely-shaped inputs, validating every 3D field.
    pub fn new(
        coefficients: Vec<f32>,
        position: &[f32],
        scale: &[f32],
        directed_light: &[f32],
        ambient_light: f32,
    ) -> Result<Self, ParameterError> {
        Ok(Self {
            coefficients,
            position: vector3(position, "Position")?,
            scale: vector3(scale, "Scale")?,
            directed_light: vector3(directed_light, "Light")?,
            ambient_light,
        })
    }

    /// Default face with the given coefficients.
    pub fn with_coefficients(coefficients: Vec<f32>) -> Self {
        Self {
            coefficients,
            ..Self::default()
        }
    }

    /// Zero coefficients for `pcs` principal components.
    pub fn zeros(pcs: usize) -> Self {
        Self::with_coefficients(vec![0.0; pcs])
    }

    /// Take coefficients from a row or column matrix.
    pub fn coefficients_from_matrix(matrix: &DMatrix<f32>) -> Result<Vec<f32>, ParameterError> {
        let (rows, cols) = matrix.shape();
        if rows > 1 && cols > 1 {
            return Err(ParameterError::NotFlat { rows, cols });
        }
        Ok(matrix.iter().copied().collect())
    }

    pub fn pcs(&self) -> usize {
        self.coefficients.len()
    }

    /// Length of the flat form.
    pub fn dimensions(&self) -> usize {
        flat_len(self.pcs())
    }

    /// Copy with exactly `pcs` coefficients.
    ///
    /// Longer inputs are truncated, shorter ones zero padded. Everything except
    /// the coefficient tail is kept as is.
    pub fn with_coefficient_count(&self, pcs: usize) -> Self {
        let mut coefficients = vec![0.0; pcs];
        let count = pcs.min(self.coefficients.len());
        coefficients[..count].copy_from_slice(&self.coefficients[..count]);
        Self {
            coefficients,
            ..self.clone()
        }
    }

    /// Flat `[coefficients][direction][scale][light]` form.
    pub fn to_flat(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dimensions());
        out.extend_from_slice(&self.coefficients);
        out.extend(self.position.iter());
        out.extend(self.scale.iter());
        out.extend(self.directed_light.iter());
        out
    }

    /// Rebuild from the flat form produced by [`ParameterVector::to_flat`].
    ///
    /// Ambient light is not part of the flat form and resets to zero.
    pub fn from_flat(values: &[f32]) -> Result<Self, ParameterError> {
        let len = values.len();
        if len < NON_PCS_COUNT {
            return Err(ParameterError::TooShort { len });
        }
        let face = Self::new(
            values[..len - NON_PCS_COUNT].to_vec(),
            &values[len - DIRECTION_FROM_END..len - SCALE_FROM_END],
            &values[len - SCALE_FROM_END..len - LIGHT_FROM_END],
            &values[len - LIGHT_FROM_END..],
            0.0,
        )?;
        log::debug!("{face}");
        Ok(face)
    }

    /// Position as a unit cartesian direction.
    pub fn position_cartesian(&self, rotation: &InitialRotation) -> Vector3<f32> {
        encoded_direction(&self.position, rotation)
    }

    /// Directed light as a unit cartesian direction.
    pub fn directed_light_cartesian(&self, rotation: &InitialRotation) -> Vector3<f32> {
        encoded_direction(&self.directed_light, rotation)
    }

    /// Directed light plus ambient term.
    pub fn light(&self) -> Vector4<f32> {
        let l = &self.directed_light;
        Vector4::new(l.x, l.y, l.z, self.ambient_light)
    }

    /// Cartesian light direction followed by the intensity channel.
    pub fn light_cartesian(&self, rotation: &InitialRotation) -> Vector4<f32> {
        let d = self.directed_light_cartesian(rotation);
        Vector4::new(d.x, d.y, d.z, self.directed_light.z)
    }
}

/// A face given either as a [`ParameterVector`] or in its flat form.
pub trait ToFace {
    fn to_face(&self) -> Result<Cow<'_, ParameterVector>, ParameterError>;
}

impl ToFace for ParameterVector {
    fn to_face(&self) -> Result<Cow<'_, ParameterVector>, ParameterError> {
        Ok(Cow::Borrowed(self))
    }
}

impl ToFace for [f32] {
    fn to_face(&self) -> Result<Cow<'_, ParameterVector>, ParameterError> {
        ParameterVector::from_flat(self).map(Cow::Owned)
    }
}

impl ToFace for Vec<f32> {
    fn to_face(&self) -> Result<Cow<'_, ParameterVector>, ParameterError> {
        self.as_slice().to_face()
    }
}

fn encoded_direction(v: &Vector3<f32>, rotation: &InitialRotation) -> Vector3<f32> {
    let phi = v.x.asin() + rotation.phi;
    let theta = v.y.asin() + rotation.theta;
    spherical_to_cartesian(phi, theta, 1.0)
}

fn write_group(f: &mut fmt::Formatter<'_>, values: &[f32]) -> fmt::Result {
    write!(f, "<")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v:>6.4}")?;
    }
    write!(f, ">")
}

impl fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Light: ")?;
        write_group(f, self.directed_light.as_slice())?;
        write!(f, "; Direction: ")?;
        write_group(f, self.position.as_slice())?;
        write!(f, "; Scale: ")?;
        write_group(f, self.scale.as_slice())?;
        write!(f, "; Coefficients: ")?;
        write_group(f, &self.coefficients)
    }
}
