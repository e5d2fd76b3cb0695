// End-to-end behaviour of the request/response bus

use std::collections::{BTreeSet, VecDeque};

use anyhow::ensure;
use cfu_sim::{
    codes::{context, state_fn, status},
    responder::{state::mulacc, Edge},
    Call, CompletionOrder, ConfigError, Connection, FinishWhen, FunctionError, FunctionUnit,
    Harness, InterfaceMux, Monitor, Outcome, ParameterSet, ProtocolError, ReadyPolicy, Request,
    Requester, Responder, Response, Scoreboard, SimError,
};

fn params(reorder_id_w: u32, max_outstanding: u32) -> ParameterSet {
    ParameterSet::builder()
        .reorder_id_w(reorder_id_w)
        .max_outstanding(max_outstanding)
        .build()
        .unwrap()
}

/// Sum of the operands; function 0 is slow.
fn adder(params: ParameterSet, order: CompletionOrder) -> FunctionUnit {
    FunctionUnit::new("adder", params, |req| Ok(vec![req.data[0] + req.data[1]]))
        .with_latency_fn(|req| if req.function_id == 0 { 5 } else { 0 })
        .with_order(order)
}

#[test]
fn test_every_call_completes_once() -> anyhow::Result<()> {
    for (order, fraction, seed) in [
        (CompletionOrder::InOrder, 1.0, 0),
        (CompletionOrder::OutOfOrder, 1.0, 1),
        (CompletionOrder::OutOfOrder, 0.3, 2),
    ] {
        let p = params(3, 8);
        let unit = FunctionUnit::new("adder", p, |req| Ok(vec![req.data[0] + req.data[1]]))
            .with_latency_fn(|req| req.data[0] % 7)
            .with_order(order);
        let requester = Requester::new(p).with_response_ready(ReadyPolicy::random(fraction, seed));
        let mut h = Harness::new(Connection::new(requester, unit)?);

        let mut sb = Scoreboard::new();
        for i in 0..200u64 {
            let (a, b) = (i * 7 % 1000, i);
            let id = h.requester_mut().submit(Call::new(0, 1, vec![a, b]))?;
            sb.expect(id, Ok(vec![a + b]));
        }
        h.run()?;

        let mut seen = BTreeSet::new();
        for c in h.connection_mut().requester_mut().drain_completions() {
            ensure!(seen.insert(c.call_id), "call {} completed twice", c.call_id);
            sb.check(&c)?;
        }
        sb.finish()?;
        ensure!(seen.len() == 200);
        let stats = h.monitor().stats();
        ensure!(stats.requests == 200 && stats.responses == 200);
        ensure!(stats.peak_outstanding <= 8);
    }
    Ok(())
}

#[test]
fn test_freed_tag_reissued_same_cycle() -> anyhow::Result<()> {
    let p = params(2, 2);
    let unit = adder(p, CompletionOrder::OutOfOrder).with_capacity(4);
    let mut conn = Connection::new(Requester::new(p), unit)?;
    let a = conn.requester_mut().submit(Call::new(0, 0, vec![1, 1]))?;
    let b = conn.requester_mut().submit(Call::new(0, 1, vec![2, 2]))?;
    let c = conn.requester_mut().submit(Call::new(0, 1, vec![3, 3]))?;

    let r0 = conn.tick(0)?;
    assert_eq!(r0.issued.map(|r| r.reorder_id), Some(0));
    let r1 = conn.tick(1)?;
    assert_eq!(r1.issued.map(|r| r.reorder_id), Some(1));
    assert!(conn.requester().is_backpressured());

    // tag 1 answers first; its tag carries the third call in the same cycle
    let r2 = conn.tick(2)?;
    assert_eq!(r2.retired, Some(Response::ok(1, vec![4])));
    assert_eq!(r2.issued.map(|r| r.reorder_id), Some(1));

    let mut order = Vec::new();
    for cycle in 3..20 {
        conn.tick(cycle)?;
    }
    while let Some(done) = conn.requester_mut().poll_completion() {
        order.push((done.call_id, done.outcome));
    }
    assert_eq!(
        order,
        vec![(b, Ok(vec![4])), (c, Ok(vec![6])), (a, Ok(vec![2]))]
    );
    assert!(conn.requester().is_idle());
    assert_eq!(conn.checker().outstanding(), 0);
    Ok(())
}

#[test]
fn test_backpressure_resumes_on_retire() -> anyhow::Result<()> {
    let p = params(4, 1);
    let unit = FunctionUnit::new("slow", p, |_| Ok(vec![0])).with_latency(3);
    let mut h = Harness::new(Connection::new(Requester::new(p), unit)?).with_reset_cycles(0);
    for _ in 0..4 {
        h.requester_mut().submit(Call::new(0, 0, vec![0, 0]))?;
    }
    h.run()?;

    let completions: Vec<_> = h
        .connection_mut()
        .requester_mut()
        .drain_completions()
        .collect();
    assert_eq!(completions.len(), 4);
    for pair in completions.windows(2) {
        // the next call goes out in the very cycle the previous one retires
        assert_eq!(pair[1].issued_at, pair[0].completed_at);
        assert_eq!(pair[1].reorder_id, 0);
    }
    assert_eq!(h.monitor().stats().peak_outstanding, 1);
    assert!(h.monitor().stats().backpressure_cycles > 0);
    Ok(())
}

#[test]
fn test_reset_clears_state() -> anyhow::Result<()> {
    let p = params(2, 4);
    let unit = FunctionUnit::new("slow", p, |_| Ok(vec![1])).with_latency(50);
    let mut h = Harness::new(Connection::new(Requester::new(p), unit)?)
        .with_monitor(Monitor::new(false).with_records())
        .with_reset_cycles(0)
        .with_finish(FinishWhen::Never);
    for _ in 0..6 {
        h.requester_mut().submit(Call::new(0, 0, vec![0, 0]))?;
    }
    for _ in 0..4 {
        h.advance()?;
    }
    assert_eq!(h.connection().requester().outstanding(), 4);
    assert_eq!(h.connection().requester().free_tags(), 0);

    h.assert_reset(1);
    h.advance()?;
    let conn = h.connection();
    assert_eq!(conn.requester().outstanding(), 0);
    assert_eq!(conn.requester().free_tags(), 4);
    assert_eq!(conn.checker().outstanding(), 0);
    assert!(!conn.responder().is_busy());
    assert_eq!(conn.requester().pending(), 2);
    assert_eq!(h.requester_mut().take_aborted(), vec![0, 1, 2, 3]);

    // the queued calls go out under the lowest tags again
    h.advance()?;
    let last = h.monitor().records().last().cloned();
    assert!(matches!(
        last,
        Some(cfu_sim::Transfer::Request { request: Request { reorder_id: 0, .. }, .. })
    ));
    Ok(())
}

#[test]
fn test_parameter_mismatch() {
    let unit = FunctionUnit::new("u", params(4, 4), |_| Ok(vec![0]));
    let err = Connection::new(Requester::new(params(3, 4)), unit).err();
    assert_eq!(
        err,
        Some(ConfigError::Mismatch {
            param: "reorder_id_w",
            expected: 3,
            found: 4
        })
    );
}

#[test]
fn test_mux_routing() -> anyhow::Result<()> {
    let p = ParameterSet::builder()
        .interface_id_w(2)
        .max_outstanding(4)
        .build()?;
    let unit = |k: u64| -> Box<dyn Responder> {
        Box::new(FunctionUnit::new(format!("mul{k}"), p, move |req| Ok(vec![req.data[0] * k])))
    };
    let mux = InterfaceMux::new(p, vec![unit(2), unit(3)])?;
    let mut h = Harness::new(Connection::new(Requester::new(p), mux)?);
    let to_first = h.requester_mut().submit(Call::new(0, 0, vec![5, 0]))?;
    let to_second = h.requester_mut().submit(Call::new(1, 0, vec![5, 0]))?;
    let to_nothing = h.requester_mut().submit(Call::new(3, 0, vec![5, 0]))?;
    h.run()?;

    let mut sb = Scoreboard::new();
    sb.expect(to_first, Ok(vec![10]));
    sb.expect(to_second, Ok(vec![15]));
    sb.expect(
        to_nothing,
        Err(FunctionError {
            error_id: status::ERROR_CFU,
        }),
    );
    for c in h.connection_mut().requester_mut().drain_completions() {
        sb.check(&c)?;
    }
    sb.finish()
}

#[test]
fn test_stateful_unit_keeps_contexts_apart() -> anyhow::Result<()> {
    let p = ParameterSet::builder()
        .state_id_w(2)
        .max_outstanding(4)
        .build()?;
    let unit = FunctionUnit::stateful("mulacc", p, 3, mulacc::op(&p))?
        .with_latency_fn(|req| req.data[0] % 3)
        .with_order(CompletionOrder::OutOfOrder);
    let mut h = Harness::new(Connection::new(Requester::new(p), unit)?);
    let csw = |cs: u32| -> Outcome { Ok(vec![1 << 2 | cs as u64]) };
    let err = |error_id: u32| -> Outcome { Err(FunctionError { error_id }) };

    // calls to one state id take effect in issue order, whatever the latency
    let mut sb = Scoreboard::new();
    let script = [
        (0, mulacc::MUL, 3, 4, Ok(vec![12])),
        (1, mulacc::MUL, 5, 5, Ok(vec![25])),
        (0, mulacc::MULACC, 1, 2, Ok(vec![14])),
        (1, state_fn::READ_STATUS, 0, 0, csw(context::DIRTY)),
        (2, state_fn::READ_STATUS, 0, 0, csw(context::INIT)),
        (2, state_fn::WRITE_STATUS, context::OFF as u64, 0, csw(context::INIT)),
        (2, mulacc::MUL, 1, 1, err(status::ERROR_OFF)),
        (3, state_fn::READ_STATUS, 0, 0, err(status::ERROR_STATE)),
        (0, state_fn::READ_STATE, 0, 0, Ok(vec![14])),
        (1, state_fn::WRITE_STATUS, context::INIT as u64, 0, csw(context::DIRTY)),
        (1, state_fn::READ_STATE, 0, 0, Ok(vec![0])),
    ];
    for (state_id, function_id, a, b, expected) in script {
        let call = Call::new(0, function_id, vec![a, b]).with_state(state_id);
        let id = h.requester_mut().submit(call)?;
        sb.expect(id, expected);
    }
    h.run()?;
    for c in h.connection_mut().requester_mut().drain_completions() {
        sb.check(&c)?;
    }
    sb.finish()?;
    assert_eq!(h.monitor().stats().errors, 2);
    Ok(())
}

#[test]
fn test_function_error_is_data() -> anyhow::Result<()> {
    let p = ParameterSet::default();
    let calls = std::rc::Rc::new(std::cell::Cell::new(0));
    let counter = calls.clone();
    let unit = FunctionUnit::new("picky", p, move |req| {
        counter.set(counter.get() + 1);
        match req.data[1] {
            0 => Err(FunctionError {
                error_id: status::ERROR_OP,
            }),
            d => Ok(vec![req.data[0] / d]),
        }
    });
    let mut h = Harness::new(Connection::new(Requester::new(p), unit)?);
    let bad = h.requester_mut().submit(Call::new(0, 0, vec![1, 0]))?;
    let good = h.requester_mut().submit(Call::new(0, 0, vec![9, 3]))?;
    h.run()?;

    let done: Vec<_> = h.connection_mut().requester_mut().drain_completions().collect();
    assert_eq!(done.len(), 2);
    assert_eq!(done[0].call_id, bad);
    assert_eq!(
        done[0].outcome,
        Err(FunctionError {
            error_id: status::ERROR_OP
        })
    );
    assert_eq!(done[1].call_id, good);
    assert_eq!(done[1].outcome, Ok(vec![3]));
    // never retried
    assert_eq!(calls.get(), 2);
    assert_eq!(h.monitor().stats().errors, 1);
    Ok(())
}

#[derive(Clone, Copy)]
enum Fault {
    /// Accept and forget.
    Drop,
    /// Answer every request twice.
    Duplicate,
    /// Answer with a tag that was never issued.
    WrongTag,
    /// Never accept anything.
    NeverReady,
}

struct Faulty {
    params: ParameterSet,
    fault: Fault,
    queue: VecDeque<Response>,
}

impl Faulty {
    fn new(params: ParameterSet, fault: Fault) -> Self {
        Self {
            params,
            fault,
            queue: VecDeque::new(),
        }
    }
}

impl Responder for Faulty {
    fn params(&self) -> &ParameterSet {
        &self.params
    }
    fn request_ready(&self, _request: &Request, _response_taken: bool) -> bool {
        !matches!(self.fault, Fault::NeverReady)
    }
    fn response(&self) -> Option<Response> {
        self.queue.front().cloned()
    }
    fn clock(&mut self, edge: Edge) {
        if edge.response_taken {
            self.queue.pop_front();
        }
        let Some(req) = edge.request else {
            return;
        };
        match self.fault {
            Fault::Drop | Fault::NeverReady => {}
            Fault::Duplicate => {
                self.queue.push_back(Response::ok(req.reorder_id, vec![0]));
                self.queue.push_back(Response::ok(req.reorder_id, vec![0]));
            }
            Fault::WrongTag => self
                .queue
                .push_back(Response::ok(req.reorder_id + 1, vec![0])),
        }
    }
    fn reset(&mut self) {
        self.queue.clear();
    }
    fn is_busy(&self) -> bool {
        !self.queue.is_empty()
    }
}

fn run_faulty(fault: Fault) -> Result<(), SimError> {
    let p = ParameterSet::default();
    let mut h = Harness::new(Connection::new(Requester::new(p), Faulty::new(p, fault))?)
        .with_stall_limit(100);
    h.requester_mut().submit(Call::new(0, 0, vec![0, 0]))?;
    h.run()
}

#[test]
fn test_faulty_responders_are_caught() {
    assert_eq!(
        run_faulty(Fault::Drop),
        Err(SimError::Protocol(ProtocolError::LostResponse { tags: vec![0] }))
    );
    assert_eq!(
        run_faulty(Fault::Duplicate),
        Err(SimError::Protocol(ProtocolError::DuplicateResponse { tag: 0 }))
    );
    assert_eq!(
        run_faulty(Fault::WrongTag),
        Err(SimError::Protocol(ProtocolError::UnknownTag { tag: 1 }))
    );
    assert!(matches!(
        run_faulty(Fault::NeverReady),
        Err(SimError::Deadlock {
            channel: "request",
            stalled: 100,
            outstanding: 0,
            pending: 1,
            ..
        })
    ));
}
