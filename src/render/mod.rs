//! Renderer contract.
//!
//! The fitter never renders anything itself. It hands a [`RenderRequest`] to a
//! [`Renderer`] and later receives exactly one [`RenderResponse`] carrying the
//! same ticket and label. Renderers may answer immediately or after any amount
//! of deferred work; the host polls them and routes responses back.
//!
//! No rendering code lives here - see `immediate` for the adapter that wraps a
//! synchronous model.

pub mod immediate;

use std::fmt;

use thiserror::Error;

use crate::core::{InitialRotation, ParameterVector, RenderedImage};

pub use immediate::{ImmediateRenderer, RenderModel};

/// Errors reported by a renderer or while assembling rendered images.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("Image shape mismatch: expected {expected} pixels, got {got}")]
    Shape { expected: usize, got: usize },

    #[error("Renderer failed: {0}")]
    Backend(String),
}

/// Why an image was requested.
///
/// The label travels with the request and comes back untouched, so the fitter
/// can route the response without remembering anything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderLabel {
    /// Baseline render at the start of an iteration
    IterationBase,
    /// Unperturbed render, baseline for the next coordinate
    ParameterBase,
    /// Render with one coordinate moved by `dx`
    ParameterPerturbed,
}

impl fmt::Display for RenderLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderLabel::IterationBase => "iteration-base",
            RenderLabel::ParameterBase => "parameter-base",
            RenderLabel::ParameterPerturbed => "parameter-perturbed",
        };
        f.write_str(name)
    }
}

/// A single render request.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderRequest {
    /// Monotonic id assigned by the issuing protocol
    pub ticket: u64,
    pub label: RenderLabel,
    pub params: ParameterVector,
    /// Offset for the cartesian conversion of light and head angles
    pub rotation: InitialRotation,
}

/// The renderer's answer to one [`RenderRequest`].
#[derive(Clone, Debug, PartialEq)]
pub struct RenderResponse {
    pub ticket: u64,
    pub label: RenderLabel,
    pub image: RenderedImage,
}

impl RenderResponse {
    /// Response echoing the ticket and label of `request`.
    pub fn answering(request: &RenderRequest, image: RenderedImage) -> Self {
        Self {
            ticket: request.ticket,
            label: request.label,
            image,
        }
    }
}

/// Asynchronous, request-tagged renderer.
///
/// Every accepted request must eventually produce exactly one response from
/// [`Renderer::poll_response`], and every image from the same renderer must use
/// the same pixel order.
pub trait Renderer {
    /// Queue a request. Errors mean the request was not accepted.
    fn request_image(&mut self, request: RenderRequest) -> Result<(), RenderError>;

    /// Next finished response, or `None` if nothing is ready yet.
    fn poll_response(&mut self) -> Result<Option<RenderResponse>, RenderError>;

    /// True when no request is queued or in flight.
    fn is_idle(&self) -> bool;
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn request_image(&mut self, request: RenderRequest) -> Result<(), RenderError> {
        (**self).request_image(request)
    }

    fn poll_response(&mut self) -> Result<Option<RenderResponse>, RenderError> {
        (**self).poll_response()
    }

    fn is_idle(&self) -> bool {
        (**self).is_idle()
    }
}
