//! Adapter for models that render synchronously.
//!
//! The wrapped model runs as soon as a request arrives; the response is parked
//! until the host polls for it. From the fitter's point of view this is just a
//! renderer that happens to be fast.

use std::collections::VecDeque;

use crate::core::{InitialRotation, ParameterVector, RenderedImage};
use crate::render::{RenderError, RenderRequest, RenderResponse, Renderer};

/// A model that turns parameters into a normal map on the calling thread.
///
/// `rotation` is the offset to add when converting the encoded light and head
/// angles to cartesian form (see [`ParameterVector::light_cartesian`]).
pub trait RenderModel {
    fn render(
        &mut self,
        params: &ParameterVector,
        rotation: &InitialRotation,
    ) -> Result<RenderedImage, RenderError>;
}

impl<F> RenderModel for F
where
    F: FnMut(&ParameterVector, &InitialRotation) -> Result<RenderedImage, RenderError>,
{
    fn render(
        &mut self,
        params: &ParameterVector,
        rotation: &InitialRotation,
    ) -> Result<RenderedImage, RenderError> {
        self(params, rotation)
    }
}

/// [`Renderer`] over a synchronous [`RenderModel`].
pub struct ImmediateRenderer<M> {
    model: M,
    ready: VecDeque<RenderResponse>,
    rendered: usize,
}

impl<M: RenderModel> ImmediateRenderer<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            ready: VecDeque::new(),
            rendered: 0,
        }
    }

    /// Number of images rendered so far.
    pub fn rendered(&self) -> usize {
        self.rendered
    }

    /// Render `params` on the spot, bypassing the request queue.
    pub fn render_now(
        &mut self,
        params: &ParameterVector,
        rotation: &InitialRotation,
    ) -> Result<RenderedImage, RenderError> {
        let image = self.model.render(params, rotation)?;
        self.rendered += 1;
        Ok(image)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_inner(self) -> M {
        self.model
    }
}

impl<M: RenderModel> Renderer for ImmediateRenderer<M> {
    fn request_image(&mut self, request: RenderRequest) -> Result<(), RenderError> {
        let image = self.model.render(&request.params, &request.rotation)?;
        self.rendered += 1;
        self.ready.push_back(RenderResponse::answering(&request, image));
        Ok(())
    }

    fn poll_response(&mut self) -> Result<Option<RenderResponse>, RenderError> {
        Ok(self.ready.pop_front())
    }

    fn is_idle(&self) -> bool {
        self.ready.is_empty()
    }
}
