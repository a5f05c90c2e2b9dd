//! Request sequencing of the gradient descent fitter.
//!
//! A recording renderer keeps every request it was handed, so the tests can
//! check the label order, the per-iteration request count and the exact
//! parameters of each probe.

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::Vector4;

use face_fit::core::{flat_len, InitialRotation, ParameterVector, RenderedImage, TargetImage};
use face_fit::optim::{BatchGradientDescent, FitConfig, FitError, FitSession, FixedLight, ModelFitter, Phase};
use face_fit::render::{RenderError, RenderLabel, RenderRequest, RenderResponse, Renderer};

/// Answers every request at once with a constant normal map and logs it.
#[derive(Default)]
struct Recorder {
    requests: Vec<RenderRequest>,
    ready: Vec<RenderResponse>,
}

impl Recorder {
    fn labels(&self) -> Vec<RenderLabel> {
        self.requests.iter().map(|r| r.label).collect()
    }
}

fn constant_image() -> RenderedImage {
    RenderedImage::new(2, 2, vec![Vector4::new(0.25, 0.0, 1.0, 1.0); 4]).unwrap()
}

impl Renderer for Recorder {
    fn request_image(&mut self, request: RenderRequest) -> Result<(), RenderError> {
        self.ready.push(RenderResponse::answering(&request, constant_image()));
        self.requests.push(request);
        Ok(())
    }

    fn poll_response(&mut self) -> Result<Option<RenderResponse>, RenderError> {
        Ok(self.ready.pop())
    }

    fn is_idle(&self) -> bool {
        self.ready.is_empty()
    }
}

fn config(pcs: usize, max_loops: usize) -> FitConfig {
    FitConfig {
        dimensions: pcs,
        dx: 0.01,
        step_size: 0.1,
        max_loops,
        artifact_path: None,
        ..FitConfig::default()
    }
}

fn fitter(pcs: usize, max_loops: usize) -> BatchGradientDescent<Recorder, FixedLight> {
    BatchGradientDescent::new(
        TargetImage::filled(2, 2, 0.0),
        Recorder::default(),
        FixedLight(Vector4::new(1.0, 0.0, 0.0, 0.0)),
        &config(pcs, max_loops),
    )
    .unwrap()
}

/// Labels of one full iteration over `d` coordinates.
fn sweep(d: usize) -> Vec<RenderLabel> {
    let mut labels = vec![RenderLabel::IterationBase];
    for _ in 0..d {
        labels.push(RenderLabel::ParameterPerturbed);
        labels.push(RenderLabel::ParameterBase);
    }
    labels
}

#[test]
fn test_single_loop_request_sequence() {
    let _ = env_logger::builder().is_test(true).try_init();

    let pcs = 2;
    let d = flat_len(pcs);
    let finished = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&finished);

    let fitter = fitter(pcs, 1).with_finish_callback(move |face| sink.borrow_mut().push(face.clone()));
    let fitter = FitSession::new(fitter).run().unwrap();

    let renderer = fitter.protocol().renderer();
    let mut expected = sweep(d);
    expected.push(RenderLabel::IterationBase);
    assert_eq!(renderer.labels(), expected);
    assert_eq!(renderer.requests.len(), 2 * d + 2);

    // Every request carries P coefficients.
    for request in &renderer.requests {
        assert_eq!(request.params.pcs(), pcs);
    }

    // Flat image everywhere: the gradient is zero and nothing moves.
    assert!(fitter.derivatives().iter().all(|&g| g == 0.0));
    assert_eq!(fitter.coefficients(), vec![0.0; d].as_slice());

    assert_eq!(fitter.phase(), Phase::Done);
    assert_eq!(fitter.loop_index(), 2);
    assert_eq!(finished.borrow().len(), 1);
    assert_eq!(finished.borrow()[0], ParameterVector::from_flat(&vec![0.0; d]).unwrap());
}

#[test]
fn test_request_count_scales_with_loops() {
    for max_loops in 1..=3 {
        let pcs = 1;
        let d = flat_len(pcs);
        let fitter = FitSession::new(fitter(pcs, max_loops)).run().unwrap();

        let renderer = fitter.protocol().renderer();
        assert_eq!(renderer.requests.len(), max_loops * (2 * d + 1) + 1);
        assert_eq!(fitter.cost_history().len(), max_loops + 1);
        assert_eq!(fitter.protocol().requests_issued(), renderer.requests.len());
    }
}

#[test]
fn test_zero_max_loops_still_runs_one_sweep() {
    let pcs = 3;
    let d = flat_len(pcs);
    let fitter = FitSession::new(fitter(pcs, 0)).run().unwrap();
    let requests = &fitter.protocol().renderer().requests;

    assert_eq!(requests.len(), 2 * d + 2);

    // No gradient step before the sweep: every unperturbed render is the zero
    // vector, and each probe moves exactly one coordinate by dx.
    let zero = vec![0.0f32; d];
    let mut probed = 0;
    for request in &requests[..2 * d + 1] {
        let flat = request.params.to_flat();
        match request.label {
            RenderLabel::IterationBase | RenderLabel::ParameterBase => assert_eq!(flat, zero),
            RenderLabel::ParameterPerturbed => {
                let mut expected = zero.clone();
                expected[probed] = 0.01;
                assert_eq!(flat, expected);
                probed += 1;
            }
        }
    }
    assert_eq!(probed, d);
}

#[test]
fn test_zero_coefficients_fits_pose_and_light_only() {
    let fitter = FitSession::new(fitter(0, 1)).run().unwrap();
    let requests = &fitter.protocol().renderer().requests;

    assert_eq!(flat_len(0), 9);
    assert_eq!(requests.len(), 2 * 9 + 2);
    assert!(requests.iter().all(|r| r.params.coefficients.is_empty()));
    assert_eq!(fitter.result().unwrap().pcs(), 0);
}

#[test]
fn test_rotation_travels_with_every_request() {
    let rotation = InitialRotation::new(0.1, -0.2);
    let config = FitConfig {
        initial_rotation: rotation,
        ..config(1, 1)
    };
    let fitter = BatchGradientDescent::new(
        TargetImage::filled(2, 2, 0.0),
        Recorder::default(),
        FixedLight(Vector4::new(1.0, 0.0, 0.0, 0.0)),
        &config,
    )
    .unwrap();

    let fitter = FitSession::new(fitter).run().unwrap();
    assert!(fitter
        .protocol()
        .renderer()
        .requests
        .iter()
        .all(|r| r.rotation == rotation));
}

#[test]
fn test_warm_start_seeds_from_initial_face() {
    let mut face = ParameterVector::with_coefficients(vec![0.5, -0.5, 9.0]);
    face.scale.x = 2.0;
    let config = FitConfig {
        initial_face: Some(face),
        warm_start: true,
        ..config(2, 1)
    };
    let fitter = BatchGradientDescent::new(
        TargetImage::filled(2, 2, 0.0),
        Recorder::default(),
        FixedLight(Vector4::new(1.0, 0.0, 0.0, 0.0)),
        &config,
    )
    .unwrap();
    let fitter = FitSession::new(fitter).run().unwrap();

    // Third coefficient truncated away, scale kept.
    let first = &fitter.protocol().renderer().requests[0].params;
    assert_eq!(first.coefficients, vec![0.5, -0.5]);
    assert_eq!(first.scale.x, 2.0);
}

#[test]
fn test_finished_fitter_rejects_more_work() {
    let mut fitter = FitSession::new(fitter(1, 1)).run().unwrap();
    assert!(fitter.is_finished());
    assert!(fitter.protocol().outstanding().is_none());

    assert!(matches!(
        fitter.receive(constant_image(), RenderLabel::IterationBase),
        Err(FitError::Finished)
    ));
    assert!(matches!(fitter.start(), Err(FitError::AlreadyStarted)));
}

#[test]
fn test_stale_response_is_rejected() {
    let mut fitter = fitter(1, 1);
    fitter.start().unwrap();

    let first = fitter.protocol_mut().renderer_mut().poll_response().unwrap().unwrap();
    let replay = first.clone();
    fitter.handle_response(first).unwrap();

    let err = fitter.handle_response(replay).unwrap_err();
    assert!(matches!(err, FitError::UnexpectedResponse { ticket: 0 }));

    // The genuine follow-up is still accepted.
    let next = fitter.protocol_mut().renderer_mut().poll_response().unwrap().unwrap();
    assert_eq!(next.label, RenderLabel::ParameterPerturbed);
    fitter.handle_response(next).unwrap();
}
