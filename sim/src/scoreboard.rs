//! Compare completions against expected outcomes.

use std::collections::BTreeMap;

use crate::{
    bus::Outcome,
    requester::{CallId, Completion},
};

#[derive(Debug, Default)]
pub struct Scoreboard {
    expected: BTreeMap<CallId, Outcome>,
    checked: u64,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(&mut self, call_id: CallId, outcome: Outcome) {
        self.expected.insert(call_id, outcome);
    }

    /// Match one completion against its expectation. Each expectation is
    /// consumed, so a call completing twice fails the second time.
    pub fn check(&mut self, completion: &Completion) -> anyhow::Result<()> {
        let Some(expected) = self.expected.remove(&completion.call_id) else {
            anyhow::bail!(
                "unexpected completion of call {} (tag {})",
                completion.call_id,
                completion.reorder_id
            );
        };
        if expected != completion.outcome {
            anyhow::bail!(
                "call {} (tag {}) mismatch: expected {:?}, got {:?}",
                completion.call_id,
                completion.reorder_id,
                expected,
                completion.outcome
            );
        }
        self.checked += 1;
        Ok(())
    }

    pub fn checked(&self) -> u64 {
        self.checked
    }

    /// Calls still awaiting completion.
    pub fn remaining(&self) -> usize {
        self.expected.len()
    }

    /// Fails if any expected call never completed.
    pub fn finish(&self) -> anyhow::Result<()> {
        if !self.expected.is_empty() {
            let ids: Vec<_> = self.expected.keys().collect();
            anyhow::bail!("{} call(s) never completed: {:?}", ids.len(), ids);
        }
        Ok(())
    }
}
