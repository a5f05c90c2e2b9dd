//! Pixel losses.

/// Masked mean squared error between two scalar images.
///
/// Only pixels with `valid[i] == true` contribute; the sum is normalized by the
/// number of such pixels. Returns `None` when no pixel is valid.
pub fn masked_mse(rendered: &[f32], target: &[f32], valid: &[bool]) -> Option<f32> {
    assert_eq!(rendered.len(), target.len());
    assert_eq!(rendered.len(), valid.len());

    // Accumulate in f64: finite differences subtract two nearly equal losses.
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for i in 0..rendered.len() {
        if !valid[i] {
            continue;
        }
        let diff = (rendered[i] - target[i]) as f64;
        sum += diff * diff;
        count += 1;
    }

    if count == 0 {
        return None;
    }
    Some((sum / count as f64) as f32)
}

/// Forward finite-difference slope between `y0 = f(x)` and `y1 = f(x + dx)`.
pub fn forward_difference(y0: f32, y1: f32, dx: f32) -> f32 {
    (y1 - y0) / dx
}
