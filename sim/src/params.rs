//! Bit widths and limits that both ends of a connection must agree on.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{bus::Word, error::ConfigError};

/// Widest id field (interface, function, reorder, error).
pub const MAX_ID_W: u32 = 32;
/// Widest data word.
pub const MAX_DATA_W: u32 = Word::BITS;
/// Upper bound on the tag pool, whatever the reorder id width.
pub const MAX_OUTSTANDING: u32 = 1 << 16;

/// Parameter set of one connection. Construct it with
/// [`ParameterSetBuilder`], which validates every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterSet {
    interface_id_w: u32,
    function_id_w: u32,
    state_id_w: u32,
    reorder_id_w: u32,
    req_resp_id_w: u32,
    req_inputs: u32,
    req_data_w: u32,
    resp_outputs: u32,
    resp_data_w: u32,
    error_id_w: u32,
    max_outstanding: u32,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("default parameters are valid")
    }
}

impl ParameterSet {
    pub fn builder() -> ParameterSetBuilder {
        ParameterSetBuilder::default()
    }

    /// Load a (possibly partial) parameter set from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        let builder: ParameterSetBuilder = serde_json::from_str(&text)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        builder.build()
    }

    pub fn interface_id_w(&self) -> u32 {
        self.interface_id_w
    }
    pub fn function_id_w(&self) -> u32 {
        self.function_id_w
    }
    /// Width of the state context id; 0 for a stateless bus.
    pub fn state_id_w(&self) -> u32 {
        self.state_id_w
    }
    pub fn reorder_id_w(&self) -> u32 {
        self.reorder_id_w
    }
    pub fn req_resp_id_w(&self) -> u32 {
        self.req_resp_id_w
    }
    pub fn req_inputs(&self) -> usize {
        self.req_inputs as usize
    }
    pub fn req_data_w(&self) -> u32 {
        self.req_data_w
    }
    pub fn resp_outputs(&self) -> usize {
        self.resp_outputs as usize
    }
    pub fn resp_data_w(&self) -> u32 {
        self.resp_data_w
    }
    pub fn error_id_w(&self) -> u32 {
        self.error_id_w
    }
    pub fn max_outstanding(&self) -> u32 {
        self.max_outstanding
    }

    /// Number of distinct interface ids the channel can address.
    pub fn interface_count(&self) -> u64 {
        1u64 << self.interface_id_w
    }

    /// Number of distinct state ids the channel can address.
    pub fn state_count(&self) -> u64 {
        1u64 << self.state_id_w
    }

    /// (name, value) of every parameter, in declaration order.
    pub fn fields(&self) -> [(&'static str, u64); 11] {
        [
            ("interface_id_w", self.interface_id_w as u64),
            ("function_id_w", self.function_id_w as u64),
            ("state_id_w", self.state_id_w as u64),
            ("reorder_id_w", self.reorder_id_w as u64),
            ("req_resp_id_w", self.req_resp_id_w as u64),
            ("req_inputs", self.req_inputs as u64),
            ("req_data_w", self.req_data_w as u64),
            ("resp_outputs", self.resp_outputs as u64),
            ("resp_data_w", self.resp_data_w as u64),
            ("error_id_w", self.error_id_w as u64),
            ("max_outstanding", self.max_outstanding as u64),
        ]
    }

    /// Both endpoints must be built from identical parameters. `self` is the
    /// expected side (the requester, or a mux), `other` the one plugged in.
    pub fn check_compatible(&self, other: &ParameterSet) -> Result<(), ConfigError> {
        for ((param, expected), (_, found)) in self.fields().into_iter().zip(other.fields()) {
            if expected != found {
                return Err(ConfigError::Mismatch {
                    param,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields = self.fields();
        for (i, (name, value)) in fields.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Unset fields take their defaults at [`ParameterSetBuilder::build`] time,
/// so derived defaults (`resp_data_w` follows `req_data_w`, ...) track the
/// fields they derive from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterSetBuilder {
    pub interface_id_w: Option<u32>,
    pub function_id_w: Option<u32>,
    pub state_id_w: Option<u32>,
    pub reorder_id_w: Option<u32>,
    pub req_resp_id_w: Option<u32>,
    pub req_inputs: Option<u32>,
    pub req_data_w: Option<u32>,
    pub resp_outputs: Option<u32>,
    pub resp_data_w: Option<u32>,
    pub error_id_w: Option<u32>,
    pub max_outstanding: Option<u32>,
}

macro_rules! setter {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(mut self, value: u32) -> Self {
                self.$name = Some(value);
                self
            }
        )*
    };
}

impl ParameterSetBuilder {
    setter!(
        interface_id_w,
        function_id_w,
        state_id_w,
        reorder_id_w,
        req_resp_id_w,
        req_inputs,
        req_data_w,
        resp_outputs,
        resp_data_w,
        error_id_w,
        max_outstanding,
    );

    pub fn build(&self) -> Result<ParameterSet, ConfigError> {
        let req_inputs = self.req_inputs.unwrap_or(2);
        let req_data_w = self.req_data_w.unwrap_or(32);
        let reorder_id_w = self.reorder_id_w.unwrap_or(4);
        let set = ParameterSet {
            interface_id_w: self.interface_id_w.unwrap_or(4),
            function_id_w: self.function_id_w.unwrap_or(16),
            state_id_w: self.state_id_w.unwrap_or(0),
            reorder_id_w,
            req_resp_id_w: self.req_resp_id_w.unwrap_or(reorder_id_w),
            req_inputs,
            req_data_w,
            resp_outputs: self.resp_outputs.unwrap_or(1),
            resp_data_w: self.resp_data_w.unwrap_or(req_data_w),
            error_id_w: self.error_id_w.unwrap_or(3),
            max_outstanding: self.max_outstanding.unwrap_or(req_inputs),
        };

        for (param, value, max) in [
            ("interface_id_w", set.interface_id_w, MAX_ID_W),
            ("function_id_w", set.function_id_w, MAX_ID_W),
            ("reorder_id_w", set.reorder_id_w, MAX_ID_W),
            ("req_resp_id_w", set.req_resp_id_w, MAX_ID_W),
            ("error_id_w", set.error_id_w, MAX_ID_W),
            ("req_data_w", set.req_data_w, MAX_DATA_W),
            ("resp_data_w", set.resp_data_w, MAX_DATA_W),
            ("req_inputs", set.req_inputs, u32::MAX),
            ("resp_outputs", set.resp_outputs, u32::MAX),
        ] {
            range_check(param, value as u64, 1, max as u64)?;
        }
        range_check("state_id_w", set.state_id_w as u64, 0, MAX_ID_W as u64)?;

        if set.reorder_id_w > set.req_resp_id_w {
            return Err(ConfigError::Inconsistent(format!(
                "reorder_id_w ({}) wider than the req/resp id field ({})",
                set.reorder_id_w, set.req_resp_id_w
            )));
        }

        let tag_space = (1u64 << set.reorder_id_w).min(MAX_OUTSTANDING as u64);
        range_check("max_outstanding", set.max_outstanding as u64, 1, tag_space)?;

        Ok(set)
    }
}

fn range_check(param: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            param,
            value,
            min,
            max,
        })
    }
}
