//! Transfer log and bus statistics.

use std::io::Write;

use ansi_term::Colour;
use serde::Serialize;

use crate::{
    bus::{Request, Response},
    codes::status,
    connection::TickReport,
    utils::fmt_words,
};

/// One completed handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum Transfer {
    Request { cycle: u64, request: Request },
    Response { cycle: u64, response: Response },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub cycles: u64,
    pub reset_cycles: u64,
    pub requests: u64,
    pub responses: u64,
    /// Responses with a non-zero error id.
    pub errors: u64,
    pub request_stalls: u64,
    pub response_stalls: u64,
    pub backpressure_cycles: u64,
    pub peak_outstanding: usize,
}

#[derive(Debug, Default)]
pub struct Monitor {
    /// Only kept after [`Monitor::with_records`].
    records: Option<Vec<Transfer>>,
    stats: Stats,
    /// Print every transfer to stderr.
    tty_out: bool,
}

impl Monitor {
    pub fn new(tty_out: bool) -> Self {
        Self {
            tty_out,
            ..Default::default()
        }
    }

    /// Keep a log of every transfer, for [`Monitor::records`] and
    /// [`Monitor::write_json`].
    pub fn with_records(mut self) -> Self {
        self.records.get_or_insert_with(Vec::new);
        self
    }

    fn record(&mut self, transfer: impl FnOnce() -> Transfer) {
        if let Some(records) = &mut self.records {
            records.push(transfer());
        }
    }

    /// Record the outcome of one cycle. `outstanding` is the number of
    /// requests in flight after the edge.
    pub fn observe(&mut self, cycle: u64, report: &TickReport, outstanding: usize) {
        self.stats.cycles += 1;
        self.stats.request_stalls += report.request_stalled as u64;
        self.stats.response_stalls += report.response_stalled as u64;
        self.stats.backpressure_cycles += report.backpressured as u64;
        self.stats.peak_outstanding = self.stats.peak_outstanding.max(outstanding);

        if let Some(response) = &report.retired {
            self.stats.responses += 1;
            if response.is_error() {
                self.stats.errors += 1;
            }
            if self.tty_out {
                print_response(cycle, response);
            }
            tracing::debug!(cycle, tag = response.reorder_id, "monitor: response");
            self.record(|| Transfer::Response {
                cycle,
                response: response.clone(),
            });
        }
        if let Some(request) = &report.issued {
            self.stats.requests += 1;
            if self.tty_out {
                print_request(cycle, request);
            }
            tracing::debug!(cycle, tag = request.reorder_id, "monitor: request");
            self.record(|| Transfer::Request {
                cycle,
                request: request.clone(),
            });
        }
    }

    pub fn observe_reset(&mut self, cycle: u64) {
        self.stats.cycles += 1;
        self.stats.reset_cycles += 1;
        if self.tty_out {
            eprintln!("{:>6} {}", cycle, Colour::Yellow.bold().paint("reset"));
        }
    }

    /// Empty unless the monitor was built [`Monitor::with_records`].
    pub fn records(&self) -> &[Transfer] {
        self.records.as_deref().unwrap_or_default()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Dump the transfer log as a JSON array.
    pub fn write_json(&self, writer: impl Write) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(writer, self.records())?;
        Ok(())
    }
}

fn print_request(cycle: u64, req: &Request) {
    eprintln!(
        "{:>6} {} if={} fn={} st={} tag={} data={}",
        cycle,
        Colour::Blue.bold().paint("req "),
        req.interface_id,
        req.function_id,
        req.state_id,
        req.reorder_id,
        fmt_words(&req.data)
    );
}

fn print_response(cycle: u64, resp: &Response) {
    if resp.is_error() {
        eprintln!(
            "{:>6} {} tag={} error={} ({})",
            cycle,
            Colour::Red.bold().paint("resp"),
            resp.reorder_id,
            resp.error_id,
            status::name_of(resp.error_id)
        );
    } else {
        eprintln!(
            "{:>6} {} tag={} data={}",
            cycle,
            Colour::Green.bold().paint("resp"),
            resp.reorder_id,
            fmt_words(&resp.data)
        );
    }
}
