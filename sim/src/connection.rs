//! A requester and a responder joined by a request/response channel pair.

use crate::{
    bus::{Request, Response},
    channel::Channel,
    checker::Checker,
    error::{ConfigError, ProtocolError},
    requester::Requester,
    responder::{Edge, Responder},
};

/// What one clock cycle did on the bus.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub issued: Option<Request>,
    pub retired: Option<Response>,
    /// A request was offered but not accepted.
    pub request_stalled: bool,
    /// A response was offered but not accepted.
    pub response_stalled: bool,
    /// Work was queued but no tag was free.
    pub backpressured: bool,
}

pub struct Connection<R: Responder> {
    requester: Requester,
    responder: R,
    req_channel: Channel<Request>,
    resp_channel: Channel<Response>,
    checker: Checker,
}

impl<R: Responder> Connection<R> {
    /// Join the two endpoints. They must have been built from the same
    /// parameter set.
    pub fn new(requester: Requester, responder: R) -> Result<Self, ConfigError> {
        let params = *requester.params();
        params.check_compatible(responder.params())?;
        Ok(Self {
            requester,
            responder,
            req_channel: Channel::default(),
            resp_channel: Channel::default(),
            checker: Checker::new(params),
        })
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }
    pub fn requester_mut(&mut self) -> &mut Requester {
        &mut self.requester
    }
    pub fn responder(&self) -> &R {
        &self.responder
    }
    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    /// Consecutive cycles the request channel has been stalled on `ready`.
    pub fn request_stalled_for(&self) -> u64 {
        self.req_channel.stalled_for()
    }

    /// Consecutive cycles the response channel has been stalled on `ready`.
    pub fn response_stalled_for(&self) -> u64 {
        self.resp_channel.stalled_for()
    }

    /// Run one clock cycle.
    ///
    /// The response channel is evaluated first: a tag whose response is
    /// accepted this cycle is already available to the request offered in
    /// the same cycle. At the edge the responder drops the answered job
    /// before admitting the new request, and the requester retires before
    /// it issues.
    pub fn tick(&mut self, cycle: u64) -> Result<TickReport, ProtocolError> {
        self.resp_channel.drive(self.responder.response());
        self.resp_channel
            .set_ready(self.requester.sample_response_ready());
        let response_taken = self.resp_channel.fires();
        let freeing = match response_taken {
            true => self.resp_channel.offered().map(|r| r.reorder_id),
            false => None,
        };

        self.req_channel.drive(self.requester.offer_request(freeing));
        let req_ready = self
            .req_channel
            .offered()
            .is_some_and(|req| self.responder.request_ready(req, response_taken));
        self.req_channel.set_ready(req_ready);

        let mut report = TickReport {
            request_stalled: self.req_channel.is_stalled(),
            response_stalled: self.resp_channel.is_stalled(),
            backpressured: self.requester.pending() > 0 && !self.req_channel.valid(),
            ..Default::default()
        };

        // clock edge
        let retired = self.resp_channel.edge();
        let issued = self.req_channel.edge();

        if let Some(resp) = &retired {
            self.checker.observe_response(resp).inspect_err(|e| {
                tracing::warn!(cycle, "protocol violation on response channel: {e}")
            })?;
        }
        if let Some(req) = &issued {
            self.checker.observe_request(req).inspect_err(|e| {
                tracing::warn!(cycle, "protocol violation on request channel: {e}")
            })?;
        }

        self.responder.clock(Edge {
            cycle,
            request: issued.clone(),
            response_taken: retired.is_some(),
        });
        if let Some(resp) = &retired {
            tracing::debug!(
                cycle,
                tag = resp.reorder_id,
                error_id = resp.error_id,
                "response accepted"
            );
            self.requester.retire(resp.clone(), cycle)?;
        }
        if let Some(req) = &issued {
            tracing::debug!(
                cycle,
                tag = req.reorder_id,
                interface = req.interface_id,
                function = req.function_id,
                state = req.state_id,
                "request accepted"
            );
            self.requester.issued(req, cycle)?;
        }

        // an idle responder will never answer what is still outstanding
        if !self.responder.is_busy() {
            self.checker.expect_drained().inspect_err(|e| {
                tracing::warn!(cycle, "protocol violation: {e}")
            })?;
        }

        report.issued = issued;
        report.retired = retired;
        Ok(report)
    }

    /// Deassert both channels and return every endpoint to its initial state.
    pub fn reset(&mut self) {
        self.req_channel.reset();
        self.resp_channel.reset();
        self.requester.reset();
        self.responder.reset();
        self.checker.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{params::ParameterSet, requester::Call, responder::FunctionUnit};

    fn params() -> ParameterSet {
        ParameterSet::builder()
            .reorder_id_w(2)
            .max_outstanding(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_mismatch_rejected() {
        let other = ParameterSet::builder()
            .reorder_id_w(2)
            .max_outstanding(1)
            .build()
            .unwrap();
        let unit = FunctionUnit::new("u", other, |_| Ok(vec![0]));
        let err = Connection::new(Requester::new(params()), unit).err();
        assert_eq!(
            err,
            Some(ConfigError::Mismatch {
                param: "max_outstanding",
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_single_call() -> Result<(), ProtocolError> {
        let unit = FunctionUnit::new("add", params(), |req| Ok(vec![req.data[0] + req.data[1]]));
        let mut conn = Connection::new(Requester::new(params()), unit).unwrap();
        let id = conn.requester_mut().submit(Call::new(0, 0, vec![2, 3]))?;

        let first = conn.tick(0)?;
        assert_eq!(first.issued.map(|r| r.reorder_id), Some(0));
        assert_eq!(conn.checker().outstanding(), 1);

        let second = conn.tick(1)?;
        assert_eq!(second.retired, Some(Response::ok(0, vec![5])));
        let done = conn.requester_mut().poll_completion().unwrap();
        assert_eq!(done.call_id, id);
        assert_eq!(done.outcome, Ok(vec![5]));
        assert!(conn.requester().is_idle());
        Ok(())
    }
}
