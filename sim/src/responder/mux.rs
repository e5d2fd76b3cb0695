use std::collections::VecDeque;

use crate::{
    bus::{Request, Response},
    codes::status,
    error::ConfigError,
    params::ParameterSet,
};

use super::{Edge, Responder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// A locally generated `ERROR_CFU` response.
    Rejected,
    Target(usize),
}

/// Several accelerators behind one channel pair, selected by `interface_id`.
///
/// Requests go to the target whose index equals their interface id.
/// Requests for an interface with no target are answered by the mux itself
/// with [`status::ERROR_CFU`]. Responses from the targets are arbitrated
/// round-robin, with local rejections first.
pub struct InterfaceMux {
    params: ParameterSet,
    targets: Vec<Box<dyn Responder>>,
    rejected: VecDeque<Response>,
    /// Round-robin pointer: the target checked first.
    next: usize,
}

impl InterfaceMux {
    pub fn new(
        params: ParameterSet,
        targets: Vec<Box<dyn Responder>>,
    ) -> Result<Self, ConfigError> {
        if targets.is_empty() || targets.len() as u64 > params.interface_count() {
            return Err(ConfigError::OutOfRange {
                param: "targets",
                value: targets.len() as u64,
                min: 1,
                max: params.interface_count(),
            });
        }
        for target in &targets {
            params.check_compatible(target.params())?;
        }
        Ok(Self {
            params,
            targets,
            rejected: VecDeque::new(),
            next: 0,
        })
    }

    fn select(&self) -> Option<Source> {
        if !self.rejected.is_empty() {
            return Some(Source::Rejected);
        }
        let n = self.targets.len();
        (0..n)
            .map(|k| (self.next + k) % n)
            .find(|&i| self.targets[i].response().is_some())
            .map(Source::Target)
    }
}

impl Responder for InterfaceMux {
    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn request_ready(&self, request: &Request, response_taken: bool) -> bool {
        let index = request.interface_id as usize;
        match self.targets.get(index) {
            Some(target) => {
                let taken = response_taken && self.select() == Some(Source::Target(index));
                target.request_ready(request, taken)
            }
            // every tag fits in the rejection queue, so it never fills
            None => true,
        }
    }

    fn response(&self) -> Option<Response> {
        match self.select()? {
            Source::Rejected => self.rejected.front().cloned(),
            Source::Target(i) => self.targets[i].response(),
        }
    }

    fn clock(&mut self, edge: Edge) {
        let taken = if edge.response_taken {
            self.select()
        } else {
            None
        };
        if taken == Some(Source::Rejected) {
            self.rejected.pop_front();
        }

        let route = edge
            .request
            .as_ref()
            .map(|request| request.interface_id as usize);
        let mut request = edge.request;
        if let Some(interface) = route.filter(|&i| i >= self.targets.len()) {
            if let Some(request) = request.take() {
                tracing::debug!(
                    interface,
                    tag = request.reorder_id,
                    "no accelerator on interface, rejecting"
                );
                self.rejected.push_back(Response::error(
                    request.reorder_id,
                    status::ERROR_CFU,
                    self.params.resp_outputs(),
                ));
            }
        }

        for (i, target) in self.targets.iter_mut().enumerate() {
            target.clock(Edge {
                cycle: edge.cycle,
                request: if route == Some(i) { request.take() } else { None },
                response_taken: taken == Some(Source::Target(i)),
            });
        }

        if let Some(Source::Target(i)) = taken {
            self.next = (i + 1) % self.targets.len();
        }
    }

    fn reset(&mut self) {
        for target in &mut self.targets {
            target.reset();
        }
        self.rejected.clear();
        self.next = 0;
    }

    fn is_busy(&self) -> bool {
        !self.rejected.is_empty() || self.targets.iter().any(|t| t.is_busy())
    }
}
