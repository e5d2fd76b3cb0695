//! One direction of the bus: a valid/ready handshake.
//!
//! Within a cycle the driver presents a payload (asserting `valid`) and the
//! receiver decides `ready`. At the clock edge the payload moves iff both
//! were asserted; otherwise nothing moves and both sides try again next
//! cycle. Signals never persist across an edge: each side re-drives them.

#[derive(Debug)]
pub struct Channel<T> {
    offered: Option<T>,
    ready: bool,
    /// Consecutive cycles with `valid && !ready`.
    stalled_for: u64,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            offered: None,
            ready: false,
            stalled_for: 0,
        }
    }
}

impl<T> Channel<T> {
    /// Driver side: present a payload (or nothing) for this cycle.
    pub fn drive(&mut self, offered: Option<T>) {
        self.offered = offered;
    }

    /// Receiver side.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn offered(&self) -> Option<&T> {
        self.offered.as_ref()
    }

    pub fn valid(&self) -> bool {
        self.offered.is_some()
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Whether a transfer happens at the coming edge.
    pub fn fires(&self) -> bool {
        self.valid() && self.ready
    }

    pub fn is_stalled(&self) -> bool {
        self.valid() && !self.ready
    }

    /// Clock edge. Returns the transferred payload, if any, and drops both
    /// signals.
    pub fn edge(&mut self) -> Option<T> {
        let fired = self.fires();
        let offered = self.offered.take();
        self.ready = false;
        if fired {
            self.stalled_for = 0;
            offered
        } else {
            if offered.is_some() {
                self.stalled_for += 1;
            } else {
                self.stalled_for = 0;
            }
            None
        }
    }

    pub fn stalled_for(&self) -> u64 {
        self.stalled_for
    }

    /// Deassert both signals and clear the stall count.
    pub fn reset(&mut self) {
        self.offered = None;
        self.ready = false;
        self.stalled_for = 0;
    }
}
