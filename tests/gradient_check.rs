//! Gradient checking tests.
//!
//! The fitter never sees an analytic gradient; it builds one coordinate at a
//! time from forward differences of the render cost. These tests drive it with
//! renderers whose cost has a closed form and compare:
//! - Numerical: (cost(x + dx·e_p) - cost(x)) / dx, as produced by the fitter
//! - Analytical: ∂cost/∂x_p + dx/2 · ∂²cost/∂x_p² (the forward-difference bias)

#[cfg(test)]
mod tests {
    use nalgebra::{Vector3, Vector4};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use face_fit::core::{flat_len, InitialRotation, ParameterVector, RenderedImage, TargetImage};
    use face_fit::optim::{
        BatchGradientDescent, FitConfig, FitSession, FixedLight, LeastSquaresLight,
    };
    use face_fit::render::{ImmediateRenderer, RenderError};

    /// One pixel per flat coordinate, first channel `x_i - c_i`.
    ///
    /// With light `(1, 0, 0, 0)` and a zero target the cost is
    /// `Σ (x_i - c_i)² / D`.
    fn quadratic_model(
        centers: Vec<f32>,
    ) -> impl FnMut(&ParameterVector, &InitialRotation) -> Result<RenderedImage, RenderError> {
        move |params: &ParameterVector, _: &InitialRotation| {
            let flat = params.to_flat();
            let pixels = flat
                .iter()
                .zip(&centers)
                .map(|(x, c)| Vector4::new(x - c, 0.0, 0.0, 1.0))
                .collect();
            RenderedImage::new(centers.len() as u32, 1, pixels)
        }
    }

    fn config(pcs: usize, dx: f32, step_size: f32, max_loops: usize) -> FitConfig {
        FitConfig {
            dimensions: pcs,
            dx,
            step_size,
            max_loops,
            artifact_path: None,
            ..FitConfig::default()
        }
    }

    #[test]
    fn test_forward_difference_gradient_matches_quadratic() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng = StdRng::seed_from_u64(0x6AD_C4EC_u64);

        for pcs in [1usize, 2, 7] {
            let d = flat_len(pcs);
            let centers: Vec<f32> = (0..d).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let dx = 1e-2f32;

            let fitter = BatchGradientDescent::new(
                TargetImage::filled(d as u32, 1, 0.0),
                ImmediateRenderer::new(quadratic_model(centers.clone())),
                FixedLight(Vector4::new(1.0, 0.0, 0.0, 0.0)),
                &config(pcs, dx, 0.1, 1),
            )
            .unwrap();
            let fitter = FitSession::new(fitter).run().unwrap();

            // Single sweep at x = 0: f'(0) = -2c/D, forward bias dx/D.
            for (p, (&num, &c)) in fitter.derivatives().iter().zip(&centers).enumerate() {
                let ana = (-2.0 * c + dx) / d as f32;
                let abs_err = (num - ana).abs();
                assert!(
                    abs_err < 1e-4,
                    "gradient mismatch: pcs={pcs} p={p} num={num} ana={ana} abs_err={abs_err}"
                );
            }

            // The step was applied exactly once.
            for (x, g) in fitter.coefficients().iter().zip(fitter.derivatives()) {
                assert!((x + 0.1 * g).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_descent_cost_is_non_increasing() {
        let pcs = 2;
        let d = flat_len(pcs);
        // Centers well above dx/2 so the iterates approach them from one side.
        let centers: Vec<f32> = (0..d).map(|i| 0.3 + 0.05 * i as f32).collect();

        let fitter = BatchGradientDescent::new(
            TargetImage::filled(d as u32, 1, 0.0),
            ImmediateRenderer::new(quadratic_model(centers.clone())),
            FixedLight(Vector4::new(1.0, 0.0, 0.0, 0.0)),
            &config(pcs, 1e-2, 1.0, 15),
        )
        .unwrap();
        let fitter = FitSession::new(fitter).run().unwrap();

        let costs = fitter.cost_history();
        assert_eq!(costs.len(), 16);
        for pair in costs.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-7, "cost went up: {costs:?}");
        }
        assert!(costs[costs.len() - 1] < 0.5 * costs[0], "{costs:?}");

        // Fixed point of the biased descent sits dx/2 below each center.
        let result = fitter.result().unwrap().to_flat();
        for (x, c) in result.iter().zip(&centers) {
            assert!((x - c).abs() < 0.2 * c, "x={x} c={c}");
        }
    }

    #[test]
    fn test_least_squares_light_absorbs_constant_offset() {
        // Shifting every normal's x component by s is matched exactly by moving
        // the ambient term, so the fitted cost stays at zero.
        let base = vec![
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.6, 0.0, 0.8),
            Vector3::new(0.0, 0.6, 0.8),
            Vector3::new(-0.6, 0.0, 0.8),
            Vector3::new(0.0, -0.6, 0.8),
            Vector3::new(0.48, 0.36, 0.8),
        ];
        let light = Vector4::new(0.2, 0.3, 0.9, 0.1);
        let values: Vec<f32> = base
            .iter()
            .map(|n| Vector4::new(n.x, n.y, n.z, 1.0).dot(&light))
            .collect();
        let target = TargetImage::new(3, 2, values).unwrap();

        let model = move |params: &ParameterVector, _: &InitialRotation| {
            let shift = params.coefficients[0];
            let pixels = base
                .iter()
                .map(|n| Vector4::new(n.x + shift, n.y, n.z, 1.0))
                .collect();
            RenderedImage::new(3, 2, pixels)
        };

        let fitter = BatchGradientDescent::new(
            target,
            ImmediateRenderer::new(model),
            LeastSquaresLight::default(),
            &config(1, 1e-2, 0.1, 2),
        )
        .unwrap();
        let fitter = FitSession::new(fitter).run().unwrap();

        assert_eq!(fitter.cost_history().len(), 3);
        for &cost in fitter.cost_history() {
            assert!(cost.is_finite() && cost < 1e-6, "cost={cost}");
        }
    }
}
