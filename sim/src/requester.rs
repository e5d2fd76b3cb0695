//! The issuing side of the bus.
//!
//! Callers queue [`Call`]s; each cycle the requester offers the oldest one on
//! the request channel under the lowest free reorder tag, and turns accepted
//! responses back into [`Completion`]s.

use std::collections::VecDeque;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use crate::{
    bus::{FunctionId, InterfaceId, Outcome, ReorderId, Request, Response, StateId, Word},
    error::ProtocolError,
    params::ParameterSet,
    tags::TagAllocator,
    utils::{check_field, check_words},
};

/// Caller-side handle of a submitted call.
pub type CallId = u64;

/// Work a caller wants done by the accelerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub interface_id: InterfaceId,
    pub function_id: FunctionId,
    pub state_id: StateId,
    pub data: Vec<Word>,
}

impl Call {
    pub fn new(interface_id: InterfaceId, function_id: FunctionId, data: Vec<Word>) -> Self {
        Self {
            interface_id,
            function_id,
            state_id: 0,
            data,
        }
    }

    /// Run the call against state context `state_id`.
    pub fn with_state(mut self, state_id: StateId) -> Self {
        self.state_id = state_id;
        self
    }
}

/// Context kept for an outstanding request until its response arrives.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub call_id: CallId,
    pub issued_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub call_id: CallId,
    pub reorder_id: ReorderId,
    pub outcome: Outcome,
    pub issued_at: u64,
    pub completed_at: u64,
}

impl Completion {
    pub fn latency(&self) -> u64 {
        self.completed_at - self.issued_at
    }
}

/// How the requester drives `ready` on the response channel.
#[derive(Debug, Clone)]
pub enum ReadyPolicy {
    Always,
    /// Ready on a random `fraction` of cycles.
    Random { fraction: f64, rng: StdRng },
}

impl ReadyPolicy {
    pub fn random(fraction: f64, seed: u64) -> Self {
        Self::Random {
            fraction: fraction.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample(&mut self) -> bool {
        match self {
            ReadyPolicy::Always => true,
            ReadyPolicy::Random { fraction, rng } => rng.gen_bool(*fraction),
        }
    }
}

pub struct Requester {
    params: ParameterSet,
    next_call: CallId,
    queue: VecDeque<(CallId, Call)>,
    tags: TagAllocator<InFlight>,
    completions: VecDeque<Completion>,
    aborted: Vec<CallId>,
    resp_ready: ReadyPolicy,
}

impl Requester {
    pub fn new(params: ParameterSet) -> Self {
        Self {
            params,
            next_call: 0,
            queue: VecDeque::new(),
            tags: TagAllocator::new(params.max_outstanding()),
            completions: VecDeque::new(),
            aborted: Vec::new(),
            resp_ready: ReadyPolicy::Always,
        }
    }

    pub fn with_response_ready(mut self, policy: ReadyPolicy) -> Self {
        self.resp_ready = policy;
        self
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Queue a call. Fields are checked against the parameter set here, so a
    /// malformed call never reaches the bus.
    pub fn submit(&mut self, call: Call) -> Result<CallId, ProtocolError> {
        let p = &self.params;
        check_field("interface_id", call.interface_id as u64, p.interface_id_w())?;
        check_field("function_id", call.function_id as u64, p.function_id_w())?;
        check_field("state_id", call.state_id as u64, p.state_id_w())?;
        check_words("request data", &call.data, p.req_inputs(), p.req_data_w())?;

        let id = self.next_call;
        self.next_call += 1;
        self.queue.push_back((id, call));
        Ok(id)
    }

    /// Calls queued but not yet accepted by the responder.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn outstanding(&self) -> usize {
        self.tags.outstanding_count()
    }

    pub fn free_tags(&self) -> usize {
        self.tags.free_count()
    }

    /// Work is waiting but every tag is in flight.
    pub fn is_backpressured(&self) -> bool {
        !self.queue.is_empty() && self.tags.is_exhausted()
    }

    /// Nothing queued and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.tags.outstanding_count() == 0
    }

    pub fn poll_completion(&mut self) -> Option<Completion> {
        self.completions.pop_front()
    }

    pub fn drain_completions(&mut self) -> impl Iterator<Item = Completion> + '_ {
        self.completions.drain(..)
    }

    /// Calls that were in flight when reset hit. They produced no response;
    /// resubmitting is up to the caller.
    pub fn take_aborted(&mut self) -> Vec<CallId> {
        std::mem::take(&mut self.aborted)
    }

    pub(crate) fn sample_response_ready(&mut self) -> bool {
        self.resp_ready.sample()
    }

    /// The request to present this cycle. `freeing` is a tag whose response
    /// is accepted in this same cycle and may therefore be reused at once.
    pub(crate) fn offer_request(&self, freeing: Option<ReorderId>) -> Option<Request> {
        let (_, call) = self.queue.front()?;
        let tag = match (self.tags.peek(), freeing) {
            (Some(free), Some(freeing)) => free.min(freeing),
            (free, freeing) => free.or(freeing)?,
        };
        Some(Request {
            interface_id: call.interface_id,
            function_id: call.function_id,
            state_id: call.state_id,
            reorder_id: tag,
            data: call.data.clone(),
        })
    }

    /// The offered request was accepted at the edge of `cycle`.
    pub(crate) fn issued(&mut self, request: &Request, cycle: u64) -> Result<(), ProtocolError> {
        let Some((call_id, _)) = self.queue.pop_front() else {
            unreachable!("accepted a request that was never offered");
        };
        tracing::trace!(call_id, tag = request.reorder_id, cycle, "request issued");
        self.tags.claim(
            request.reorder_id,
            InFlight {
                call_id,
                issued_at: cycle,
            },
        )?;
        debug_assert!(self.tags.is_consistent());
        Ok(())
    }

    /// A response was accepted at the edge of `cycle`.
    pub(crate) fn retire(&mut self, response: Response, cycle: u64) -> Result<(), ProtocolError> {
        let inflight = self.tags.reclaim(response.reorder_id)?;
        tracing::trace!(
            call_id = inflight.call_id,
            tag = response.reorder_id,
            cycle,
            "request retired"
        );
        self.completions.push_back(Completion {
            call_id: inflight.call_id,
            reorder_id: response.reorder_id,
            outcome: response.outcome(),
            issued_at: inflight.issued_at,
            completed_at: cycle,
        });
        debug_assert!(self.tags.is_consistent());
        Ok(())
    }

    /// Abort everything in flight and free every tag. Queued calls stay
    /// queued: they never reached the bus.
    pub fn reset(&mut self) {
        let aborted = self.tags.reset();
        if !aborted.is_empty() {
            tracing::debug!(count = aborted.len(), "reset aborted in-flight requests");
        }
        self.aborted
            .extend(aborted.into_iter().map(|(_, inflight)| inflight.call_id));
    }
}
