//! Discrete-event driver around a [`Connection`].
//!
//! Each call to [`Harness::advance`] is one clock cycle: the first few
//! cycles hold the design in reset, the rest tick the connection until the
//! finish condition holds. The driver loop is simply
//!
//! ```ignore
//! while harness.advance()? {}
//! ```

use crate::{
    connection::Connection,
    error::SimError,
    monitor::Monitor,
    requester::Requester,
    responder::Responder,
};

/// Reset cycles asserted before normal operation.
pub const DEFAULT_RESET_CYCLES: u64 = 2;
/// Consecutive cycles a channel may offer a payload that is not accepted
/// before the run is declared deadlocked.
pub const DEFAULT_STALL_LIMIT: u64 = 10_000;

/// When the run is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishWhen {
    /// Nothing queued, nothing in flight, responder idle.
    #[default]
    Drained,
    /// After this many cycles in total, reset cycles included.
    AfterCycles(u64),
    /// Only on an explicit [`Harness::finish`].
    Never,
}

pub struct Harness<R: Responder> {
    conn: Connection<R>,
    monitor: Monitor,
    cycle: u64,
    reset_remaining: u64,
    finish_when: FinishWhen,
    finished: bool,
    stall_limit: u64,
    cycle_limit: Option<u64>,
}

impl<R: Responder> Harness<R> {
    pub fn new(conn: Connection<R>) -> Self {
        Self {
            conn,
            monitor: Monitor::default(),
            cycle: 0,
            reset_remaining: DEFAULT_RESET_CYCLES,
            finish_when: FinishWhen::default(),
            finished: false,
            stall_limit: DEFAULT_STALL_LIMIT,
            cycle_limit: None,
        }
    }

    pub fn with_reset_cycles(mut self, cycles: u64) -> Self {
        self.reset_remaining = cycles;
        self
    }

    pub fn with_finish(mut self, finish_when: FinishWhen) -> Self {
        self.finish_when = finish_when;
        self
    }

    pub fn with_stall_limit(mut self, cycles: u64) -> Self {
        self.stall_limit = cycles.max(1);
        self
    }

    /// Fail the run with [`SimError::CycleLimit`] once `cycles` have passed
    /// without finishing.
    pub fn with_cycle_limit(mut self, cycles: u64) -> Self {
        self.cycle_limit = Some(cycles);
        self
    }

    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Hold reset for the next `cycles` cycles.
    pub fn assert_reset(&mut self, cycles: u64) {
        self.reset_remaining = self.reset_remaining.max(cycles);
        self.finished = false;
    }

    /// External "simulation finished" signal.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Cycles elapsed so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn connection(&self) -> &Connection<R> {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection<R> {
        &mut self.conn
    }

    pub fn requester_mut(&mut self) -> &mut Requester {
        self.conn.requester_mut()
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Run one cycle. Returns whether the run is still going.
    pub fn advance(&mut self) -> Result<bool, SimError> {
        if self.finished {
            return Ok(false);
        }
        if let Some(limit) = self.cycle_limit {
            if self.cycle >= limit {
                return Err(SimError::CycleLimit(limit));
            }
        }

        let cycle = self.cycle;
        self.cycle += 1;

        if self.reset_remaining > 0 {
            self.reset_remaining -= 1;
            self.conn.reset();
            self.monitor.observe_reset(cycle);
            tracing::trace!(cycle, "reset asserted");
            return Ok(true);
        }

        let report = self.conn.tick(cycle)?;
        let requester = self.conn.requester();
        self.monitor
            .observe(cycle, &report, requester.outstanding());

        // a slow responder is not a deadlock, a payload nobody takes is
        for (channel, stalled) in [
            ("request", self.conn.request_stalled_for()),
            ("response", self.conn.response_stalled_for()),
        ] {
            if stalled >= self.stall_limit {
                return Err(SimError::Deadlock {
                    cycle,
                    channel,
                    stalled,
                    outstanding: requester.outstanding(),
                    pending: requester.pending(),
                });
            }
        }

        self.finished = match self.finish_when {
            FinishWhen::Drained => requester.is_idle() && !self.conn.responder().is_busy(),
            FinishWhen::AfterCycles(n) => self.cycle >= n,
            FinishWhen::Never => false,
        };
        if self.finished {
            tracing::debug!(cycle, "run finished");
        }
        Ok(!self.finished)
    }

    /// Advance until the run finishes or fails.
    pub fn run(&mut self) -> Result<(), SimError> {
        while self.advance()? {}
        Ok(())
    }

    pub fn into_parts(self) -> (Connection<R>, Monitor) {
        (self.conn, self.monitor)
    }
}
