//! Cycle-level model of the Custom Function Unit (CFU) bus: a requester
//! dispatching tagged function calls to one or more accelerators over a
//! valid/ready request/response channel pair, with out-of-order completion.

pub mod bus;
pub mod channel;
pub mod checker;
pub mod codes;
pub mod connection;
pub mod error;
pub mod harness;
pub mod monitor;
pub mod params;
pub mod requester;
pub mod responder;
pub mod scoreboard;
pub mod tags;
pub mod utils;

pub use bus::{FunctionError, Outcome, Request, Response, StateId, Word};
pub use connection::{Connection, TickReport};
pub use error::{ConfigError, ProtocolError, SimError};
pub use harness::{FinishWhen, Harness};
pub use monitor::{Monitor, Stats, Transfer};
pub use params::{ParameterSet, ParameterSetBuilder};
pub use requester::{Call, CallId, Completion, ReadyPolicy, Requester};
pub use responder::{CompletionOrder, FunctionUnit, InterfaceMux, Responder};
pub use scoreboard::Scoreboard;
