//! Batch gradient descent with finite-difference gradients.
//!
//! Each iteration renders the current coefficients once, then probes every
//! coordinate `p` with a forward difference:
//!
//! ```text
//! deriv[p] = (cost(coeffs + dx·e_p) - cost(coeffs)) / dx
//! ```
//!
//! and finally applies `coeffs -= step_size · deriv` at the start of the next
//! iteration. The unperturbed render that closes coordinate `p` doubles as the
//! baseline of coordinate `p + 1`, so an iteration costs `2D + 1` renders
//! instead of `3D`.
//!
//! The fitter is a state machine: it issues one request, returns, and resumes
//! in [`ModelFitter::receive`] when the matching response arrives. Transitions
//! are keyed by `(phase, label)`:
//!
//! | phase              | label              | action                                   |
//! |--------------------|--------------------|------------------------------------------|
//! | IterationBase      | IterationBase      | finish if over the cap, else probe p = 0 |
//! | ParameterBase      | ParameterBase      | next iteration if p = D-1, else probe p+1|
//! | ParameterPerturbed | ParameterPerturbed | finalize deriv[p], restore coeffs        |

use std::path::PathBuf;

use nalgebra::Vector4;

use crate::core::{ParameterVector, RenderedImage, TargetImage};
use crate::io::save_shading_png;
use crate::optim::config::FitConfig;
use crate::optim::light::{shade, LightEstimator};
use crate::optim::loss::forward_difference;
use crate::optim::protocol::{FitError, FittingProtocol, ModelFitter};
use crate::render::{RenderLabel, Renderer};

/// Where the machine is in an iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Not started yet
    Idle,
    /// Waiting for the iteration baseline render
    IterationBase,
    /// Waiting for an unperturbed render (end of one probe, start of the next)
    ParameterBase,
    /// Waiting for the render with coordinate `step` moved by `dx`
    ParameterPerturbed,
    /// Finished; the result is available
    Done,
}

impl Phase {
    /// Label of the response this phase waits for.
    pub fn awaiting(self) -> Option<RenderLabel> {
        match self {
            Phase::IterationBase => Some(RenderLabel::IterationBase),
            Phase::ParameterBase => Some(RenderLabel::ParameterBase),
            Phase::ParameterPerturbed => Some(RenderLabel::ParameterPerturbed),
            Phase::Idle | Phase::Done => None,
        }
    }
}

/// Light, shading and cost for one rendered image.
struct Evaluation {
    light: Vector4<f32>,
    shading: Vec<f32>,
    cost: f32,
}

/// Coordinate-wise finite-difference gradient descent.
pub struct BatchGradientDescent<R, L> {
    protocol: FittingProtocol<R>,
    light: L,

    dx: f32,
    step_size: f32,
    max_loops: usize,
    warm_start: bool,
    artifact_path: Option<PathBuf>,

    phase: Phase,
    loop_index: usize,
    /// Coordinate being probed, -1 before the first probe of an iteration
    step: isize,
    coeffs: Vec<f32>,
    deriv: Vec<f32>,

    cost_history: Vec<f32>,
    result: Option<ParameterVector>,
}

impl<R: Renderer, L: LightEstimator> BatchGradientDescent<R, L> {
    pub fn new(
        target: TargetImage,
        renderer: R,
        light: L,
        config: &FitConfig,
    ) -> Result<Self, FitError> {
        config.validate()?;
        let protocol = FittingProtocol::new(
            target,
            config.dimensions,
            renderer,
            config.initial_face.clone(),
        )
        .with_rotation(config.initial_rotation);

        Ok(Self {
            protocol,
            light,
            dx: config.dx,
            step_size: config.step_size,
            max_loops: config.max_loops,
            warm_start: config.warm_start,
            artifact_path: config.artifact_path.clone(),
            phase: Phase::Idle,
            loop_index: 0,
            step: -1,
            coeffs: Vec::new(),
            deriv: Vec::new(),
            cost_history: Vec::new(),
            result: None,
        })
    }

    pub fn with_finish_callback(mut self, callback: impl FnMut(&ParameterVector) + 'static) -> Self {
        self.protocol = self.protocol.with_finish_callback(callback);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current iteration, starting at 1 once started.
    pub fn loop_index(&self) -> usize {
        self.loop_index
    }

    pub fn step(&self) -> isize {
        self.step
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coeffs
    }

    pub fn derivatives(&self) -> &[f32] {
        &self.deriv
    }

    /// Cost of every iteration baseline seen so far.
    pub fn cost_history(&self) -> &[f32] {
        &self.cost_history
    }

    /// Fitted parameters once the machine is done.
    pub fn result(&self) -> Option<&ParameterVector> {
        self.result.as_ref()
    }

    pub fn light_estimator(&self) -> &L {
        &self.light
    }

    fn dimensions(&self) -> usize {
        self.coeffs.len()
    }

    fn evaluate(&self, image: &RenderedImage) -> Result<Evaluation, FitError> {
        let light = self.light.estimate_light(image, self.protocol.target())?;
        let shading = shade(image, &light);
        let cost = self.protocol.shading_cost(&shading, image)?;
        Ok(Evaluation {
            light,
            shading,
            cost,
        })
    }

    fn request(&mut self, coeffs: &[f32], label: RenderLabel) -> Result<(), FitError> {
        let params = ParameterVector::from_flat(coeffs)?;
        self.protocol.request_render(params, label)
    }

    fn begin_iteration(&mut self) -> Result<(), FitError> {
        self.loop_index += 1;
        self.step = -1;
        for (c, d) in self.coeffs.iter_mut().zip(&self.deriv) {
            *c -= self.step_size * d;
        }

        self.phase = Phase::IterationBase;
        let coeffs = self.coeffs.clone();
        self.request(&coeffs, RenderLabel::IterationBase)
    }

    fn on_iteration_base(&mut self, image: RenderedImage) -> Result<(), FitError> {
        let eval = self.evaluate(&image)?;
        self.cost_history.push(eval.cost);
        log::info!("{:03}: cost {:.6}", self.loop_index, eval.cost);

        // The first sweep always runs, even with max_loops = 0 (see FitConfig::max_loops).
        if self.loop_index > self.max_loops.max(1) {
            return self.complete(&image, &eval);
        }

        // This render is also the baseline of coordinate 0.
        self.step += 1;
        self.probe_base(eval.cost)
    }

    fn on_parameter_base(&mut self, image: RenderedImage) -> Result<(), FitError> {
        if self.step >= self.dimensions() as isize - 1 {
            return self.begin_iteration();
        }

        self.step += 1;
        let eval = self.evaluate(&image)?;
        self.probe_base(eval.cost)
    }

    /// Stash the base cost in `deriv[p]` and render `coeffs + dx·e_p`.
    fn probe_base(&mut self, cost: f32) -> Result<(), FitError> {
        let p = self.step as usize;
        self.deriv[p] = cost;

        let mut probe = self.coeffs.clone();
        probe[p] += self.dx;
        self.phase = Phase::ParameterPerturbed;
        self.request(&probe, RenderLabel::ParameterPerturbed)
    }

    fn on_parameter_perturbed(&mut self, image: RenderedImage) -> Result<(), FitError> {
        let eval = self.evaluate(&image)?;
        let p = self.step as usize;
        self.deriv[p] = forward_difference(self.deriv[p], eval.cost, self.dx);
        log::debug!("d[{p}] = {:.6}", self.deriv[p]);

        self.phase = Phase::ParameterBase;
        let coeffs = self.coeffs.clone();
        self.request(&coeffs, RenderLabel::ParameterBase)
    }

    fn complete(&mut self, image: &RenderedImage, eval: &Evaluation) -> Result<(), FitError> {
        if let Some(path) = &self.artifact_path {
            save_shading_png(path, image, &eval.shading)?;
        }

        let params = ParameterVector::from_flat(&self.coeffs)?;
        log::info!(
            "finished after {} iterations, cost {:.6}, light {:?}",
            self.loop_index - 1,
            eval.cost,
            eval.light.as_slice()
        );
        self.protocol.finish(&params);
        self.result = Some(params);
        self.phase = Phase::Done;
        Ok(())
    }
}

impl<R: Renderer, L: LightEstimator> ModelFitter for BatchGradientDescent<R, L> {
    type Renderer = R;

    fn protocol(&self) -> &FittingProtocol<R> {
        &self.protocol
    }

    fn protocol_mut(&mut self) -> &mut FittingProtocol<R> {
        &mut self.protocol
    }

    fn start(&mut self) -> Result<(), FitError> {
        if self.phase != Phase::Idle {
            return Err(FitError::AlreadyStarted);
        }

        let d = self.protocol.dimensions();
        self.coeffs = if self.warm_start {
            self.protocol.initial_face().to_flat()
        } else {
            vec![0.0; d]
        };
        self.deriv = vec![0.0; d];
        self.loop_index = 0;
        self.begin_iteration()
    }

    fn receive(&mut self, image: RenderedImage, label: RenderLabel) -> Result<(), FitError> {
        match (self.phase, label) {
            (Phase::Idle, _) => Err(FitError::NotStarted),
            (Phase::Done, _) => Err(FitError::Finished),
            (Phase::IterationBase, RenderLabel::IterationBase) => self.on_iteration_base(image),
            (Phase::ParameterBase, RenderLabel::ParameterBase) => self.on_parameter_base(image),
            (Phase::ParameterPerturbed, RenderLabel::ParameterPerturbed) => {
                self.on_parameter_perturbed(image)
            }
            (phase, got) => match phase.awaiting() {
                Some(expected) => Err(FitError::UnexpectedLabel { expected, got }),
                None => Err(FitError::Finished),
            },
        }
    }

    fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }
}
