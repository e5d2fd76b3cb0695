use crate::bus::ReorderId;

/// The two endpoints of a connection disagree on, or were built with, an
/// unusable parameter set. Detected when the connection is formed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("parameter `{param}` mismatch: expected {expected}, found {found}")]
    Mismatch {
        param: &'static str,
        expected: u64,
        found: u64,
    },
    #[error("parameter `{param}` = {value} out of range {min}..={max}")]
    OutOfRange {
        param: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("inconsistent parameters: {0}")]
    Inconsistent(String),
    #[error("could not load parameters: {0}")]
    Load(String),
}

/// A defect in one endpoint. Never recoverable at the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("reorder id {tag} reused while still outstanding")]
    TagReuse { tag: ReorderId },
    #[error("reorder id {tag} is outside the tag pool of {capacity}")]
    TagOutOfRange { tag: ReorderId, capacity: u32 },
    #[error("response for reorder id {tag}, which is not outstanding")]
    UnknownTag { tag: ReorderId },
    #[error("second response for reorder id {tag}")]
    DuplicateResponse { tag: ReorderId },
    #[error("responder went idle with reorder id(s) {tags:?} unanswered")]
    LostResponse { tags: Vec<ReorderId> },
    #[error("{field} = {value:#x} does not fit in {width} bit(s)")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        width: u32,
    },
    #[error("{field} carries {found} word(s), expected {expected}")]
    OperandCount {
        field: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Why a simulation run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(
        "deadlock at cycle {cycle}: {channel} channel stalled for {stalled} cycles \
         ({outstanding} outstanding, {pending} queued)"
    )]
    Deadlock {
        cycle: u64,
        channel: &'static str,
        stalled: u64,
        outstanding: usize,
        pending: usize,
    },
    #[error("cycle limit {0} reached before the run finished")]
    CycleLimit(u64),
}
