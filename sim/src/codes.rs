//! Well-known error ids, state context status values and the standard state
//! context functions. Responders are free to define their own error codes;
//! these are the conventional ones used by the bundled units.

use crate::bus::{ErrorId, FunctionId};

macro_rules! define_code {
    {
        @mod $modname:ident;
        @type $typ:ty;
        $( $(#[$doc:meta])* $cname:ident = $cval:expr; )*
    } => {
        pub mod $modname {
            #[allow(unused_imports)]
            use super::*;
            $( $(#[$doc])* pub const $cname : $typ = $cval; )*
            #[allow(unused)]
            pub fn name_of(code: $typ) -> &'static str {
                match code {
                    $($cname => stringify!($cname), )*
                    _ => "CUSTOM"
                }
            }
        }
    };
}

define_code! {
    @mod status;
    @type ErrorId;
    /// Success. The only value the protocol itself interprets.
    OK = 0;
    /// No accelerator behind the requested interface id.
    ERROR_CFU = 1;
    ERROR_STATE = 2;
    ERROR_OFF = 3;
    /// Function id not implemented by the accelerator.
    ERROR_FUNC = 4;
    /// Operands rejected by the function.
    ERROR_OP = 5;
    ERROR_CUSTOM = 6;
}

/// Reserved "no error" sentinel.
pub const NO_ERROR: ErrorId = status::OK;

define_code! {
    @mod context;
    @type u32;
    /// Disabled. Only the status functions are served.
    OFF = 0;
    /// Freshly reset state.
    INIT = 1;
    /// State saved elsewhere and unchanged since.
    CLEAN = 2;
    /// State modified since the last `CLEAN`.
    DIRTY = 3;
}

define_code! {
    @mod state_fn;
    @type FunctionId;
    /// Replace the state with operand 0.
    WRITE_STATE = 1020;
    READ_STATE = 1021;
    /// Set the context status to operand 0, returning the previous status
    /// word.
    WRITE_STATUS = 1022;
    READ_STATUS = 1023;
}
