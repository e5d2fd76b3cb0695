//! Passive protocol checker sitting on the channel pair.
//!
//! It keeps its own copy of the outstanding set, built only from observed
//! transfers, so a defect in either endpoint is caught at the cycle it shows
//! up on the bus.

use crate::{
    bus::{Request, Response},
    error::ProtocolError,
    params::ParameterSet,
    tags::TagAllocator,
    utils::{check_field, check_words},
};

pub struct Checker {
    params: ParameterSet,
    shadow: TagAllocator<()>,
}

impl Checker {
    pub fn new(params: ParameterSet) -> Self {
        Self {
            params,
            shadow: TagAllocator::new(params.max_outstanding()),
        }
    }

    pub fn observe_request(&mut self, request: &Request) -> Result<(), ProtocolError> {
        let p = &self.params;
        check_field("interface_id", request.interface_id as u64, p.interface_id_w())?;
        check_field("function_id", request.function_id as u64, p.function_id_w())?;
        check_field("state_id", request.state_id as u64, p.state_id_w())?;
        check_field("reorder_id", request.reorder_id as u64, p.req_resp_id_w())?;
        check_words("request data", &request.data, p.req_inputs(), p.req_data_w())?;
        // the pool is 0..max_outstanding even when the id field is wider
        self.shadow.claim(request.reorder_id, ())
    }

    pub fn observe_response(&mut self, response: &Response) -> Result<(), ProtocolError> {
        let p = &self.params;
        check_field("reorder_id", response.reorder_id as u64, p.req_resp_id_w())?;
        check_field("error_id", response.error_id as u64, p.error_id_w())?;
        // an error response's payload is undefined
        if !response.is_error() {
            check_words(
                "response data",
                &response.data,
                p.resp_outputs(),
                p.resp_data_w(),
            )?;
        }
        self.shadow.reclaim(response.reorder_id)
    }

    /// Accepted requests not yet answered.
    pub fn outstanding(&self) -> usize {
        self.shadow.outstanding_count()
    }

    /// Call once the responder owes nothing: every accepted request must
    /// have been answered by then.
    pub fn expect_drained(&self) -> Result<(), ProtocolError> {
        if self.shadow.outstanding_count() == 0 {
            Ok(())
        } else {
            Err(ProtocolError::LostResponse {
                tags: self.shadow.outstanding_tags(),
            })
        }
    }

    pub fn reset(&mut self) {
        self.shadow.reset();
    }
}
