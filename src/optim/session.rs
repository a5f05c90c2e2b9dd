//! Host loop connecting a fitter to its renderer.
//!
//! The fitter never waits: it issues a request and returns. Something has to
//! collect the renderer's responses and feed them back; [`FitSession`] is that
//! something. Use [`FitSession::run`] for renderers that always make progress
//! when polled, or call [`FitSession::pump`] from your own event loop when
//! rendering completes elsewhere.

use crate::optim::protocol::{FitError, ModelFitter};
use crate::render::Renderer;

pub struct FitSession<F> {
    fitter: F,
    delivered: usize,
}

impl<F: ModelFitter> FitSession<F> {
    pub fn new(fitter: F) -> Self {
        Self {
            fitter,
            delivered: 0,
        }
    }

    pub fn fitter(&self) -> &F {
        &self.fitter
    }

    pub fn fitter_mut(&mut self) -> &mut F {
        &mut self.fitter
    }

    pub fn into_inner(self) -> F {
        self.fitter
    }

    /// Responses delivered to the fitter so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn start(&mut self) -> Result<(), FitError> {
        self.fitter.start()
    }

    /// Deliver at most one ready response. Returns whether one was delivered.
    pub fn pump(&mut self) -> Result<bool, FitError> {
        let response = self.fitter.protocol_mut().renderer_mut().poll_response()?;
        match response {
            Some(response) => {
                self.fitter.handle_response(response)?;
                self.delivered += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Start the fitter and pump until it finishes.
    ///
    /// There is no timeout: a renderer that stays busy forever keeps this
    /// loop spinning. A renderer that goes idle with a request unanswered
    /// fails with [`FitError::Stalled`].
    pub fn run(mut self) -> Result<F, FitError> {
        self.start()?;
        while !self.fitter.is_finished() {
            if self.pump()? {
                continue;
            }

            let protocol = self.fitter.protocol();
            match protocol.outstanding() {
                Some(label) if protocol.renderer().is_idle() => {
                    return Err(FitError::Stalled(label));
                }
                Some(_) => std::thread::yield_now(),
                // Nothing requested and nothing finished: the fitter gave up driving.
                None => return Err(FitError::NotStarted),
            }
        }

        log::debug!("session finished after {} responses", self.delivered);
        Ok(self.fitter)
    }
}
