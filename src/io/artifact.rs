//! Debug shading image written when a fit finishes.
//!
//! Pixel rules:
//! - intensity = round(255 · shading), clamped to 0..=255
//! - pixel order is reversed relative to the render's native order
//! - pixels whose validity channel is zero are written as 0

use std::path::Path;

use image::GrayImage;
use thiserror::Error;

use crate::core::RenderedImage;
use crate::render::RenderError;

/// Errors that can occur while producing the debug artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{0}")]
    Shape(#[from] RenderError),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

fn to_u8(value: f32) -> u8 {
    // `as` saturates and maps NaN to 0.
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Build the 8-bit grayscale shading image for `normals`.
pub fn shading_to_luma8(normals: &RenderedImage, shading: &[f32]) -> Result<GrayImage, ArtifactError> {
    if shading.len() != normals.len() {
        return Err(RenderError::Shape {
            expected: normals.len(),
            got: shading.len(),
        }
        .into());
    }

    let data: Vec<u8> = shading
        .iter()
        .zip(normals.pixels())
        .rev()
        .map(|(&s, p)| if p.w != 0.0 { to_u8(s) } else { 0 })
        .collect();

    let (width, height) = (normals.width(), normals.height());
    let got = data.len();
    GrayImage::from_raw(width, height, data).ok_or(ArtifactError::Shape(RenderError::Shape {
        expected: width as usize * height as usize,
        got,
    }))
}

/// Write the shading image as PNG to `path`.
pub fn save_shading_png(
    path: &Path,
    normals: &RenderedImage,
    shading: &[f32],
) -> Result<(), ArtifactError> {
    let image = shading_to_luma8(normals, shading)?;
    image.save(path)?;
    log::info!("wrote shading image to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector4;

    #[test]
    fn test_pixels_are_reversed_rounded_and_masked() {
        let normals = RenderedImage::new(
            2,
            2,
            vec![
                Vector4::new(0.0, 0.0, 1.0, 1.0),
                Vector4::new(0.0, 0.0, 1.0, 0.0),
                Vector4::new(0.0, 0.0, 1.0, 1.0),
                Vector4::new(0.0, 0.0, 1.0, 1.0),
            ],
        )
        .unwrap();
        let shading = [0.5, 0.9, 1.5, -0.2];

        let img = shading_to_luma8(&normals, &shading).unwrap();
        // Reversed: [-0.2, 1.5, 0.9 (masked), 0.5]
        assert_eq!(img.as_raw(), &vec![0, 255, 0, 128]);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let normals = RenderedImage::new(1, 1, vec![Vector4::new(0.0, 0.0, 1.0, 1.0)]).unwrap();
        assert!(shading_to_luma8(&normals, &[0.1, 0.2]).is_err());
    }

    #[test]
    fn test_save_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shading.png");
        let normals = RenderedImage::new(1, 1, vec![Vector4::new(0.0, 0.0, 1.0, 1.0)]).unwrap();

        save_shading_png(&path, &normals, &[0.25]).unwrap();
        let loaded = image::open(&path).unwrap().to_luma8();
        assert_eq!(loaded.as_raw(), &vec![64]);
    }
}
