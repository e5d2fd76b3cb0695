//! Per-state contexts of a stateful accelerator.
//!
//! Each state id owns one word of state and a context status
//! ([`context`] codes). The four standard functions in [`state_fn`] read and
//! write both; every other function id is handed to the unit's operation
//! together with the selected state word.

use crate::{
    bus::{FunctionError, Outcome, Request, Word},
    codes::{context, state_fn, status},
    error::ConfigError,
    params::ParameterSet,
    utils::mask,
};

/// Words of state per context, as reported in the status word.
const STATE_WORDS: Word = 1;

/// Operation of a stateful unit on the state word of the selected context.
pub type StateOp = Box<dyn FnMut(&mut Word, &Request) -> Outcome>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Context {
    status: u32,
    state: Word,
}

impl Context {
    const INIT: Context = Context {
        status: context::INIT,
        state: 0,
    };

    /// Status word: state size in words above the 2-bit status.
    fn status_word(&self) -> Word {
        STATE_WORDS << 2 | self.status as Word
    }
}

#[derive(Debug, Clone)]
pub struct StateContexts {
    contexts: Vec<Context>,
    outputs: usize,
    width: u32,
}

fn fail(error_id: u32) -> Outcome {
    Err(FunctionError { error_id })
}

impl StateContexts {
    /// `n_states` contexts, all addressable by the bus state id.
    pub fn new(params: &ParameterSet, n_states: usize) -> Result<Self, ConfigError> {
        if n_states == 0 || n_states as u64 > params.state_count() {
            return Err(ConfigError::OutOfRange {
                param: "n_states",
                value: n_states as u64,
                min: 1,
                max: params.state_count(),
            });
        }
        Ok(Self {
            contexts: vec![Context::INIT; n_states],
            outputs: params.resp_outputs(),
            width: params.resp_data_w(),
        })
    }

    fn word(&self, value: Word) -> Vec<Word> {
        let mut out = vec![0; self.outputs];
        out[0] = value;
        out
    }

    /// Serve one request. State only changes on success, and any change
    /// marks the context dirty.
    pub fn execute(&mut self, request: &Request, op: &mut StateOp) -> Outcome {
        let width = self.width;
        let Some(ctx) = self.contexts.get_mut(request.state_id as usize) else {
            return fail(status::ERROR_STATE);
        };
        let old = *ctx;
        let value = match request.function_id {
            state_fn::READ_STATUS => old.status_word(),
            state_fn::WRITE_STATUS => {
                match u32::try_from(request.data[0]) {
                    Ok(context::INIT) => *ctx = Context::INIT,
                    Ok(cs @ (context::OFF | context::CLEAN | context::DIRTY)) => ctx.status = cs,
                    _ => return fail(status::ERROR_OP),
                }
                old.status_word()
            }
            _ if old.status == context::OFF => return fail(status::ERROR_OFF),
            state_fn::READ_STATE => old.state,
            state_fn::WRITE_STATE => {
                ctx.state = mask(request.data[0], width);
                ctx.status = context::DIRTY;
                ctx.state
            }
            _ => {
                let out = op(&mut ctx.state, request)?;
                ctx.status = context::DIRTY;
                return Ok(out);
            }
        };
        Ok(self.word(value))
    }

    /// Every context back to `INIT`.
    pub fn reset(&mut self) {
        self.contexts.fill(Context::INIT);
    }
}

/// Function ids of the multiply-accumulate demo unit.
pub mod mulacc {
    use super::*;

    /// `acc = a * b`
    pub const MUL: u32 = 0;
    /// `acc += a * b`
    pub const MULACC: u32 = 1;

    /// Operation of a stateful multiply-accumulate unit, returning the new
    /// accumulator in the first output word.
    pub fn op(params: &ParameterSet) -> StateOp {
        let (width, outputs) = (params.resp_data_w(), params.resp_outputs());
        Box::new(move |acc, req| {
            let product = req.data[0].wrapping_mul(req.data.get(1).copied().unwrap_or(0));
            *acc = match req.function_id {
                MUL => mask(product, width),
                MULACC => mask(acc.wrapping_add(product), width),
                _ => return fail(status::ERROR_FUNC),
            };
            let mut out = vec![0; outputs];
            out[0] = *acc;
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ParameterSet {
        ParameterSet::builder()
            .state_id_w(2)
            .req_data_w(8)
            .build()
            .unwrap()
    }

    struct Unit {
        contexts: StateContexts,
        op: StateOp,
    }

    impl Unit {
        fn new(n_states: usize) -> Self {
            Self {
                contexts: StateContexts::new(&params(), n_states).unwrap(),
                op: mulacc::op(&params()),
            }
        }

        fn call(&mut self, state_id: u32, function_id: u32, a: Word, b: Word) -> Outcome {
            let req = Request {
                interface_id: 0,
                function_id,
                state_id,
                reorder_id: 0,
                data: vec![a, b],
            };
            self.contexts.execute(&req, &mut self.op)
        }
    }

    fn csw(cs: u32) -> Outcome {
        Ok(vec![STATE_WORDS << 2 | cs as Word])
    }

    fn err(error_id: u32) -> Outcome {
        Err(FunctionError { error_id })
    }

    #[test]
    fn test_context_count() {
        assert!(StateContexts::new(&params(), 4).is_ok());
        assert!(matches!(
            StateContexts::new(&params(), 5),
            Err(ConfigError::OutOfRange {
                param: "n_states",
                max: 4,
                ..
            })
        ));
        assert!(StateContexts::new(&params(), 0).is_err());
    }

    #[test]
    fn test_status_lifecycle() {
        use state_fn::*;
        let mut u = Unit::new(3);
        for s in 0..3 {
            assert_eq!(u.call(s, READ_STATUS, 0, 0), csw(context::INIT));
            assert_eq!(u.call(s, READ_STATE, 0, 0), Ok(vec![0]));
        }
        // each context keeps its own accumulator
        for s in 0..3 {
            assert_eq!(u.call(s, mulacc::MUL, s as Word, 1), Ok(vec![s as Word]));
            assert_eq!(u.call(s, READ_STATUS, 0, 0), csw(context::DIRTY));
        }
        for s in 0..3 {
            assert_eq!(u.call(s, READ_STATE, 0, 0), Ok(vec![s as Word]));
        }

        // clean keeps the state
        assert_eq!(u.call(1, WRITE_STATUS, context::CLEAN as Word, 0), csw(context::DIRTY));
        assert_eq!(u.call(1, READ_STATUS, 0, 0), csw(context::CLEAN));
        assert_eq!(u.call(1, READ_STATE, 0, 0), Ok(vec![1]));

        // writing state dirties it
        assert_eq!(u.call(1, WRITE_STATE, 2, 0), Ok(vec![2]));
        assert_eq!(u.call(1, READ_STATUS, 0, 0), csw(context::DIRTY));
        assert_eq!(u.call(1, mulacc::MULACC, 1, 1), Ok(vec![3]));

        // init clears the state
        assert_eq!(u.call(1, WRITE_STATUS, context::INIT as Word, 0), csw(context::DIRTY));
        assert_eq!(u.call(1, READ_STATE, 0, 0), Ok(vec![0]));
        assert_eq!(u.call(1, WRITE_STATUS, context::DIRTY as Word, 0), csw(context::INIT));
        assert_eq!(u.call(1, mulacc::MULACC, 0, 0), Ok(vec![0]));
    }

    #[test]
    fn test_off_and_errors() {
        use state_fn::*;
        let mut u = Unit::new(3);
        assert_eq!(u.call(0, WRITE_STATUS, context::OFF as Word, 0), csw(context::INIT));
        assert_eq!(u.call(0, mulacc::MUL, 2, 2), err(status::ERROR_OFF));
        assert_eq!(u.call(0, READ_STATE, 0, 0), err(status::ERROR_OFF));
        assert_eq!(u.call(0, READ_STATUS, 0, 0), csw(context::OFF));
        assert_eq!(u.call(0, WRITE_STATUS, context::INIT as Word, 0), csw(context::OFF));
        assert_eq!(u.call(0, mulacc::MUL, 2, 2), Ok(vec![4]));

        // state id 3 is addressable but has no context
        assert_eq!(u.call(3, READ_STATUS, 0, 0), err(status::ERROR_STATE));
        assert_eq!(u.call(1, WRITE_STATUS, 4, 0), err(status::ERROR_OP));
        assert_eq!(u.call(1, 7, 0, 0), err(status::ERROR_FUNC));
        // a failed function leaves the context untouched
        assert_eq!(u.call(1, READ_STATUS, 0, 0), csw(context::INIT));
    }

    #[test]
    fn test_accumulator_wraps_to_width() {
        let mut u = Unit::new(1);
        assert_eq!(u.call(0, mulacc::MUL, 0x10, 0x10), Ok(vec![0]));
        assert_eq!(u.call(0, mulacc::MULACC, 0xff, 2), Ok(vec![0xfe]));
        u.contexts.reset();
        assert_eq!(u.call(0, state_fn::READ_STATUS, 0, 0), csw(context::INIT));
        assert_eq!(u.call(0, state_fn::READ_STATE, 0, 0), Ok(vec![0]));
    }
}
