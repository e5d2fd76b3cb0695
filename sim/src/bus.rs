//! Payloads carried by the request and response channels.

use serde::Serialize;

use crate::codes::{status, NO_ERROR};

/// One operand or result word. Data widths are at most 64 bits.
pub type Word = u64;
pub type InterfaceId = u32;
pub type FunctionId = u32;
pub type StateId = u32;
pub type ReorderId = u32;
pub type ErrorId = u32;

/// A function call in flight from requester to responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    /// Selects one of the accelerators sharing the channel.
    pub interface_id: InterfaceId,
    /// Selects the operation within that accelerator.
    pub function_id: FunctionId,
    /// Selects the state context the function operates on. Always 0 on a
    /// stateless bus.
    pub state_id: StateId,
    /// Requester-chosen tag, unique among outstanding requests.
    pub reorder_id: ReorderId,
    /// `req_inputs` operands, `req_data_w` bits each.
    pub data: Vec<Word>,
}

/// The result of one previously accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub reorder_id: ReorderId,
    /// `resp_outputs` results, `resp_data_w` bits each. Meaningless when
    /// `error_id` is not [`NO_ERROR`].
    pub data: Vec<Word>,
    pub error_id: ErrorId,
}

impl Response {
    pub fn ok(reorder_id: ReorderId, data: Vec<Word>) -> Self {
        Self {
            reorder_id,
            data,
            error_id: NO_ERROR,
        }
    }

    /// A failed call. The payload is zero-filled to the configured width.
    pub fn error(reorder_id: ReorderId, error_id: ErrorId, outputs: usize) -> Self {
        Self {
            reorder_id,
            data: vec![0; outputs],
            error_id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_id != NO_ERROR
    }

    /// What the caller sees: the data on success, the error id otherwise.
    pub fn outcome(&self) -> Outcome {
        if self.is_error() {
            Err(FunctionError {
                error_id: self.error_id,
            })
        } else {
            Ok(self.data.clone())
        }
    }
}

/// A function reported failure. This is ordinary result data: the protocol
/// neither escalates nor retries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FunctionError {
    pub error_id: ErrorId,
}

impl std::fmt::Display for FunctionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "function failed with error id {} ({})",
            self.error_id,
            status::name_of(self.error_id)
        )
    }
}

impl std::error::Error for FunctionError {}

pub type Outcome = Result<Vec<Word>, FunctionError>;
