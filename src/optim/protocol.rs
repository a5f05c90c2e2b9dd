//! Fitting protocol shared by every fitter.
//!
//! [`FittingProtocol`] owns the target image and the renderer handle, computes
//! the cost, and enforces the request/response discipline: at most one render
//! request is outstanding, and a response is only accepted if it answers that
//! request. Concrete fitters implement [`ModelFitter`] on top of it.

use thiserror::Error;

use crate::core::{
    InitialRotation, ParameterError, ParameterVector, RenderedImage, TargetImage, ToFace,
};
use crate::io::ArtifactError;
use crate::optim::loss::masked_mse;
use crate::render::{
    ImmediateRenderer, RenderError, RenderLabel, RenderModel, RenderRequest, RenderResponse,
    Renderer,
};

/// Errors raised while fitting.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("{0} is not implemented for this fitter")]
    NotImplemented(&'static str),

    #[error("Invalid parameters: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Failed to write artifact: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("A {0} render request is already outstanding")]
    RequestOutstanding(RenderLabel),

    #[error("Response with ticket {ticket} does not answer an outstanding request")]
    UnexpectedResponse { ticket: u64 },

    #[error("Expected a {expected} response, got {got}")]
    UnexpectedLabel {
        expected: RenderLabel,
        got: RenderLabel,
    },

    #[error("Image has {got} pixels but the target has {expected}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("Image has no valid pixels to compare")]
    NoValidPixels,

    #[error("Light estimation failed: {0}")]
    LightEstimation(String),

    #[error("Fitting has not been started")]
    NotStarted,

    #[error("Fitting was already started")]
    AlreadyStarted,

    #[error("Fitting has already finished")]
    Finished,

    #[error("Renderer is idle but a {0} request was never answered")]
    Stalled(RenderLabel),
}

/// Called once with the fitted parameters.
pub type FinishCallback = Box<dyn FnMut(&ParameterVector)>;

/// State and services shared by all fitters.
pub struct FittingProtocol<R> {
    target: TargetImage,
    pcs: usize,
    renderer: R,
    initial_face: ParameterVector,
    rotation: InitialRotation,
    on_finish: Option<FinishCallback>,
    next_ticket: u64,
    outstanding: Option<(u64, RenderLabel)>,
    requests_issued: usize,
}

impl<R: Renderer> FittingProtocol<R> {
    /// Set up fitting of `pcs` principal coefficients to `target`.
    ///
    /// A missing initial face defaults to zero coefficients. An initial face
    /// with a different coefficient count is truncated or zero padded.
    pub fn new(
        target: TargetImage,
        pcs: usize,
        renderer: R,
        initial_face: Option<ParameterVector>,
    ) -> Self {
        let initial_face = match initial_face {
            Some(face) if face.pcs() != pcs => {
                log::debug!(
                    "initial face has {} coefficients, adjusting to {pcs}",
                    face.pcs()
                );
                face.with_coefficient_count(pcs)
            }
            Some(face) => face,
            None => ParameterVector::zeros(pcs),
        };

        Self {
            target,
            pcs,
            renderer,
            initial_face,
            rotation: InitialRotation::default(),
            on_finish: None,
            next_ticket: 0,
            outstanding: None,
            requests_issued: 0,
        }
    }

    pub fn with_rotation(mut self, rotation: InitialRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_finish_callback(mut self, callback: impl FnMut(&ParameterVector) + 'static) -> Self {
        self.on_finish = Some(Box::new(callback));
        self
    }

    pub fn target(&self) -> &TargetImage {
        &self.target
    }

    /// Number of principal coefficients.
    pub fn pcs(&self) -> usize {
        self.pcs
    }

    /// Length of the flat parameter vector being optimized.
    pub fn dimensions(&self) -> usize {
        crate::core::flat_len(self.pcs)
    }

    pub fn initial_face(&self) -> &ParameterVector {
        &self.initial_face
    }

    pub fn rotation(&self) -> InitialRotation {
        self.rotation
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Label of the request awaiting a response, if any.
    pub fn outstanding(&self) -> Option<RenderLabel> {
        self.outstanding.map(|(_, label)| label)
    }

    /// Total number of requests handed to the renderer.
    pub fn requests_issued(&self) -> usize {
        self.requests_issued
    }

    /// Ask the renderer for an image of `params`, tagged with `label`.
    pub fn request_render(
        &mut self,
        params: ParameterVector,
        label: RenderLabel,
    ) -> Result<(), FitError> {
        if let Some((_, pending)) = self.outstanding {
            return Err(FitError::RequestOutstanding(pending));
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        log::trace!("request #{ticket} ({label})");

        self.renderer.request_image(RenderRequest {
            ticket,
            label,
            params,
            rotation: self.rotation,
        })?;
        self.outstanding = Some((ticket, label));
        self.requests_issued += 1;
        Ok(())
    }

    /// Match `response` against the outstanding request and release it.
    pub fn accept(&mut self, response: RenderResponse) -> Result<(RenderedImage, RenderLabel), FitError> {
        match self.outstanding {
            Some((ticket, label)) if ticket == response.ticket => {
                if label != response.label {
                    return Err(FitError::UnexpectedLabel {
                        expected: label,
                        got: response.label,
                    });
                }
                log::trace!("response #{ticket} ({label})");
                self.outstanding = None;
                Ok((response.image, label))
            }
            _ => Err(FitError::UnexpectedResponse {
                ticket: response.ticket,
            }),
        }
    }

    /// Mean squared error of the image's first channel against the target.
    pub fn cost(&self, image: &RenderedImage) -> Result<f32, FitError> {
        self.shading_cost(&image.first_channel(), image)
    }

    /// Mean squared error of `shading` against the target, over pixels valid
    /// in both `normals` and the target mask.
    pub fn shading_cost(&self, shading: &[f32], normals: &RenderedImage) -> Result<f32, FitError> {
        let expected = self.target.len();
        for got in [shading.len(), normals.len()] {
            if got != expected {
                return Err(FitError::ShapeMismatch { expected, got });
            }
        }

        let valid: Vec<bool> = (0..expected)
            .map(|i| normals.is_valid(i) && self.target.is_valid(i))
            .collect();
        masked_mse(shading, self.target.values(), &valid).ok_or(FitError::NoValidPixels)
    }

    /// Hand the final parameters to the host.
    pub fn finish(&mut self, params: &ParameterVector) {
        if let Some(callback) = self.on_finish.as_mut() {
            callback(params);
        }
    }
}

/// Synchronous evaluation, available when the model renders on the calling thread.
///
/// These renders bypass the request queue, so they neither need nor disturb
/// an outstanding request.
impl<M: RenderModel> FittingProtocol<ImmediateRenderer<M>> {
    /// Render `face`, given as a [`ParameterVector`] or in flat form.
    pub fn face_image<F: ToFace + ?Sized>(&mut self, face: &F) -> Result<RenderedImage, FitError> {
        let face = face.to_face()?;
        let image = self.renderer.render_now(&face, &self.rotation)?;
        Ok(image)
    }

    /// Cost of `face` against the target.
    pub fn face_deviation<F: ToFace + ?Sized>(&mut self, face: &F) -> Result<f32, FitError> {
        let image = self.face_image(face)?;
        self.cost(&image)
    }
}

/// A fitting procedure driven by render responses.
///
/// Both [`ModelFitter::start`] and [`ModelFitter::receive`] must be provided by
/// a concrete fitter; the defaults report [`FitError::NotImplemented`].
pub trait ModelFitter {
    type Renderer: Renderer;

    fn protocol(&self) -> &FittingProtocol<Self::Renderer>;

    fn protocol_mut(&mut self) -> &mut FittingProtocol<Self::Renderer>;

    /// Issue the first request.
    fn start(&mut self) -> Result<(), FitError> {
        Err(FitError::NotImplemented("start"))
    }

    /// Advance on a rendered image tagged with `label`.
    fn receive(&mut self, _image: RenderedImage, _label: RenderLabel) -> Result<(), FitError> {
        Err(FitError::NotImplemented("receive"))
    }

    fn is_finished(&self) -> bool {
        false
    }

    /// Validate a renderer response and route it to [`ModelFitter::receive`].
    fn handle_response(&mut self, response: RenderResponse) -> Result<(), FitError> {
        let (image, label) = self.protocol_mut().accept(response)?;
        self.receive(image, label)
    }
}
