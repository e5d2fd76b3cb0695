//! The accelerator side of the bus.
//!
//! A responder is evaluated in two steps per cycle, like any synchronous
//! circuit: its outputs (`request_ready`, `response`) are a function of its
//! current state, then [`Responder::clock`] latches the outcome of both
//! handshakes into the next state.

mod mux;
pub mod state;
mod unit;

pub use mux::InterfaceMux;
pub use state::{StateContexts, StateOp};
pub use unit::{CompletionOrder, FunctionUnit};

use crate::{
    bus::{Request, Response},
    params::ParameterSet,
};

/// What happened on the bus at one clock edge, from the responder's view.
#[derive(Debug, Clone, Default)]
pub struct Edge {
    pub cycle: u64,
    /// The request accepted at this edge.
    pub request: Option<Request>,
    /// Whether the response presented this cycle was accepted.
    pub response_taken: bool,
}

pub trait Responder {
    /// Must equal the requester's parameters, see
    /// [`ParameterSet::check_compatible`].
    fn params(&self) -> &ParameterSet;

    /// `ready` on the request channel, given the request being offered and
    /// whether the response presented this cycle is being accepted. The
    /// latter frees a slot at the coming edge, so a full responder may still
    /// take the request.
    fn request_ready(&self, request: &Request, response_taken: bool) -> bool;

    /// The response presented on the response channel this cycle.
    fn response(&self) -> Option<Response>;

    /// Clock edge. A taken response must be dropped before the new request
    /// is admitted, since the request may reuse the response's tag.
    fn clock(&mut self, edge: Edge);

    fn reset(&mut self);

    /// Whether any accepted request is still owed a response.
    fn is_busy(&self) -> bool;
}

impl<R: Responder + ?Sized> Responder for Box<R> {
    fn params(&self) -> &ParameterSet {
        (**self).params()
    }
    fn request_ready(&self, request: &Request, response_taken: bool) -> bool {
        (**self).request_ready(request, response_taken)
    }
    fn response(&self) -> Option<Response> {
        (**self).response()
    }
    fn clock(&mut self, edge: Edge) {
        (**self).clock(edge)
    }
    fn reset(&mut self) {
        (**self).reset()
    }
    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }
}
