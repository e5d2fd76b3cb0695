use crate::{
    bus::{Outcome, ReorderId, Request, Response},
    error::ConfigError,
    params::ParameterSet,
    utils::mask,
};

use super::{
    state::{StateContexts, StateOp},
    Edge, Responder,
};

pub type Compute = Box<dyn FnMut(&Request) -> Outcome>;
pub type Latency = Box<dyn Fn(&Request) -> u64>;

enum Kernel {
    Stateless(Compute),
    Stateful { contexts: StateContexts, op: StateOp },
}

impl Kernel {
    fn run(&mut self, request: &Request) -> Outcome {
        match self {
            Kernel::Stateless(compute) => compute(request),
            Kernel::Stateful { contexts, op } => contexts.execute(request, op),
        }
    }
}

/// Order in which finished jobs are presented on the response channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionOrder {
    /// A finished job waits for every older one.
    #[default]
    InOrder,
    /// The oldest finished job goes first.
    OutOfOrder,
}

struct Job {
    remaining: u64,
    response: Response,
}

/// A simulated accelerator: runs `compute` on every accepted request and
/// presents the result `1 + latency` cycles later. A stateful unit keeps one
/// context per state id instead, see [`FunctionUnit::stateful`].
pub struct FunctionUnit {
    name: String,
    params: ParameterSet,
    kernel: Kernel,
    latency: Latency,
    capacity: usize,
    order: CompletionOrder,
    /// Accepted jobs, oldest first.
    jobs: Vec<Job>,
}

impl FunctionUnit {
    pub fn new(
        name: impl Into<String>,
        params: ParameterSet,
        compute: impl FnMut(&Request) -> Outcome + 'static,
    ) -> Self {
        Self::with_kernel(name.into(), params, Kernel::Stateless(Box::new(compute)))
    }

    /// A unit holding `n_states` contexts, addressed by the request state id.
    /// Function ids in [`crate::codes::state_fn`] manage the contexts, any
    /// other id runs `op` on the selected context's state.
    pub fn stateful(
        name: impl Into<String>,
        params: ParameterSet,
        n_states: usize,
        op: StateOp,
    ) -> Result<Self, ConfigError> {
        let contexts = StateContexts::new(&params, n_states)?;
        Ok(Self::with_kernel(name.into(), params, Kernel::Stateful { contexts, op }))
    }

    fn with_kernel(name: String, params: ParameterSet, kernel: Kernel) -> Self {
        Self {
            name,
            params,
            kernel,
            latency: Box::new(|_| 0),
            capacity: params.max_outstanding() as usize,
            order: CompletionOrder::default(),
            jobs: Vec::new(),
        }
    }

    pub fn with_latency(self, cycles: u64) -> Self {
        self.with_latency_fn(move |_| cycles)
    }

    /// Latency chosen per request, e.g. by function id.
    pub fn with_latency_fn(mut self, latency: impl Fn(&Request) -> u64 + 'static) -> Self {
        self.latency = Box::new(latency);
        self
    }

    /// Jobs the unit holds at once; it stops accepting when full.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_order(mut self, order: CompletionOrder) -> Self {
        self.order = order;
        self
    }

    fn selected(&self) -> Option<usize> {
        match self.order {
            CompletionOrder::InOrder => self
                .jobs
                .first()
                .filter(|job| job.remaining == 0)
                .map(|_| 0),
            CompletionOrder::OutOfOrder => self.jobs.iter().position(|job| job.remaining == 0),
        }
    }

    fn respond(&self, tag: ReorderId, outcome: Outcome) -> Response {
        match outcome {
            Ok(data) => {
                let width = self.params.resp_data_w();
                Response::ok(tag, data.into_iter().map(|w| mask(w, width)).collect())
            }
            Err(err) => Response::error(tag, err.error_id, self.params.resp_outputs()),
        }
    }
}

impl Responder for FunctionUnit {
    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn request_ready(&self, _request: &Request, response_taken: bool) -> bool {
        let leaving = (response_taken && self.selected().is_some()) as usize;
        self.jobs.len() - leaving < self.capacity
    }

    fn response(&self) -> Option<Response> {
        self.selected().map(|i| self.jobs[i].response.clone())
    }

    fn clock(&mut self, edge: Edge) {
        if edge.response_taken {
            if let Some(i) = self.selected() {
                let job = self.jobs.remove(i);
                tracing::trace!(unit = %self.name, tag = job.response.reorder_id, "job done");
            }
        }
        for job in &mut self.jobs {
            job.remaining = job.remaining.saturating_sub(1);
        }
        if let Some(request) = edge.request {
            let remaining = (self.latency)(&request);
            let outcome = self.kernel.run(&request);
            tracing::trace!(
                unit = %self.name,
                tag = request.reorder_id,
                function = request.function_id,
                latency = remaining,
                "job accepted"
            );
            let response = self.respond(request.reorder_id, outcome);
            self.jobs.push(Job {
                remaining,
                response,
            });
        }
    }

    fn reset(&mut self) {
        self.jobs.clear();
        if let Kernel::Stateful { contexts, .. } = &mut self.kernel {
            contexts.reset();
        }
    }

    fn is_busy(&self) -> bool {
        !self.jobs.is_empty()
    }
}
