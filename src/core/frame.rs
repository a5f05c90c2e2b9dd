//! Rendered normal maps and target images (frames).
//!
//! Both images are flat pixel arrays in the renderer's native order. The
//! optimizer relies on that order being identical across renders so pixel
//! `i` of every render lines up with pixel `i` of the target.

use image::GrayImage;
use nalgebra::{Vector3, Vector4};

use crate::render::RenderError;

/// Per-pixel normal map with a trailing validity channel.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedImage {
    width: u32,
    height: u32,
    /// `(nx, ny, nz, validity)` per pixel
    pixels: Vec<Vector4<f32>>,
}

impl RenderedImage {
    pub fn new(width: u32, height: u32, pixels: Vec<Vector4<f32>>) -> Result<Self, RenderError> {
        let expected = (width as usize) * (height as usize);
        if pixels.len() != expected {
            return Err(RenderError::Shape {
                expected,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Image from normals plus a validity flag per pixel.
    pub fn from_normals(
        width: u32,
        height: u32,
        normals: &[Vector3<f32>],
        valid: &[bool],
    ) -> Result<Self, RenderError> {
        if normals.len() != valid.len() {
            return Err(RenderError::Shape {
                expected: normals.len(),
                got: valid.len(),
            });
        }
        let pixels = normals
            .iter()
            .zip(valid)
            .map(|(n, &v)| Vector4::new(n.x, n.y, n.z, if v { 1.0 } else { 0.0 }))
            .collect();
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Vector4<f32>] {
        &self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// First channel of every pixel.
    pub fn first_channel(&self) -> Vec<f32> {
        self.pixels.iter().map(|p| p.x).collect()
    }

    /// Validity channel of every pixel.
    pub fn validity(&self) -> Vec<f32> {
        self.pixels.iter().map(|p| p.w).collect()
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.pixels.get(index).is_some_and(|p| p.w != 0.0)
    }

    pub fn valid_count(&self) -> usize {
        self.pixels.iter().filter(|p| p.w != 0.0).count()
    }
}

/// Grayscale image the model is fitted to.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetImage {
    width: u32,
    height: u32,
    /// Intensities in [0, 1]
    values: Vec<f32>,
    /// Optional per-pixel mask; `None` means every pixel counts.
    mask: Option<Vec<bool>>,
}

impl TargetImage {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, RenderError> {
        let expected = (width as usize) * (height as usize);
        if values.len() != expected {
            return Err(RenderError::Shape {
                expected,
                got: values.len(),
            });
        }
        Ok(Self {
            width,
            height,
            values,
            mask: None,
        })
    }

    /// Uniform image, mostly useful for tests.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value; (width as usize) * (height as usize)],
            mask: None,
        }
    }

    /// Convert 8-bit intensities to [0, 1].
    pub fn from_luma8(image: &GrayImage) -> Self {
        let values = image.pixels().map(|p| p.0[0] as f32 / 255.0).collect();
        Self {
            width: image.width(),
            height: image.height(),
            values,
            mask: None,
        }
    }

    /// Restrict the cost to pixels where `mask` is true.
    pub fn with_mask(mut self, mask: Vec<bool>) -> Result<Self, RenderError> {
        if mask.len() != self.values.len() {
            return Err(RenderError::Shape {
                expected: self.values.len(),
                got: mask.len(),
            });
        }
        self.mask = Some(mask);
        Ok(self)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether pixel `index` takes part in the cost.
    pub fn is_valid(&self, index: usize) -> bool {
        self.mask
            .as_ref()
            .map_or(true, |m| m.get(index).copied().unwrap_or(false))
    }
}
