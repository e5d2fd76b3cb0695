use std::fs::File;

use anyhow::{Context, Result};
use binutils::{clap, verbose};
use cfu_sim::{
    codes::{context, state_fn, status},
    responder::{state::mulacc, StateContexts, StateOp},
    utils::mask,
    Call, CompletionOrder, Connection, FunctionError, FunctionUnit, Harness, InterfaceMux,
    Monitor, Outcome, ParameterSet, ReadyPolicy, Request, Requester, Responder, Scoreboard,
    Word,
};
use clap::{error::ErrorKind, CommandFactory, Parser};
use rand::{rngs::StdRng, Rng, SeedableRng};

// Randomized workload over the CFU request/response bus
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
)]
struct Args {
    /// JSON file with the bus parameter set
    ///
    /// Fields left out take their default. Conflicts with the individual
    /// width options.
    #[arg(
        long,
        conflicts_with_all = ["interface_id_w", "reorder_id_w", "data_w", "max_outstanding"]
    )]
    params: Option<String>,

    /// Width of the interface id
    #[arg(long)]
    interface_id_w: Option<u32>,

    /// Width of the reorder id
    #[arg(long)]
    reorder_id_w: Option<u32>,

    /// Width of request and response data words
    #[arg(long)]
    data_w: Option<u32>,

    /// Size of the tag pool
    #[arg(long)]
    max_outstanding: Option<u32>,

    /// Number of calls to issue
    #[arg(short = 'n', long, default_value_t = 100)]
    requests: u64,

    /// Number of accelerators behind the interface mux
    #[arg(long, default_value_t = 1)]
    targets: u32,

    /// Longest function latency in cycles; each call takes between 0 and this
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u64).range(0..=100_000))]
    latency: u64,

    /// Make every accelerator a multiply-accumulate unit with this many
    /// state contexts
    ///
    /// Calls then mix the context management functions with `mul` (0) and
    /// `mulacc` (1). The state id width grows to address every context.
    #[arg(long, default_value_t = 0)]
    states: usize,

    /// Let accelerators complete calls out of order
    #[arg(long)]
    out_of_order: bool,

    /// Fraction of cycles the requester accepts responses, in (0, 1]
    #[arg(long, default_value_t = 1.0)]
    resp_ready: f64,

    /// Seed for the workload and the response-ready pattern
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write the transfer log as JSON to this file
    #[arg(long)]
    trace: Option<String>,

    /// Write logs as JSON to this file instead of stderr
    #[arg(long)]
    log_file: Option<String>,

    /// Print every transfer
    #[arg(long)]
    tty: bool,

    #[command(flatten)]
    verbose: verbose::Verbosity,
}

/// Demo functions served by every accelerator.
fn demo(function_id: u32, data: &[Word], params: &ParameterSet) -> Outcome {
    let a = data[0];
    let b = data.get(1).copied().unwrap_or(0);
    let value = match function_id {
        0 => data.iter().map(|w| w.count_ones() as Word).sum(),
        1 => a.wrapping_mul(b),
        2 => a.wrapping_add(b),
        _ => {
            return Err(FunctionError {
                error_id: status::ERROR_FUNC,
            })
        }
    };
    let mut out = vec![0; params.resp_outputs()];
    out[0] = mask(value, params.resp_data_w());
    Ok(out)
}

fn load_params(args: &Args) -> Result<ParameterSet> {
    if let Some(path) = &args.params {
        return ParameterSet::from_json_file(path).context("invalid --params file");
    }
    let mut builder = ParameterSet::builder();
    if let Some(w) = args.interface_id_w {
        builder = builder.interface_id_w(w);
    }
    if let Some(w) = args.reorder_id_w {
        builder = builder.reorder_id_w(w);
    }
    if let Some(w) = args.data_w {
        builder = builder.req_data_w(w).resp_data_w(w);
    }
    if let Some(n) = args.max_outstanding {
        builder = builder.max_outstanding(n);
    }
    if args.states > 1 {
        builder = builder.state_id_w(usize::BITS - (args.states - 1).leading_zeros());
    }
    builder.build().context("invalid bus parameters")
}

/// Expected outcomes of the calls to one accelerator, in issue order.
enum Model {
    Stateless,
    Stateful(StateContexts, StateOp),
}

impl Model {
    fn new(args: &Args, params: &ParameterSet) -> Result<Self> {
        if args.states == 0 {
            return Ok(Model::Stateless);
        }
        let contexts = StateContexts::new(params, args.states)
            .context("--states does not fit the state id width")?;
        Ok(Model::Stateful(contexts, mulacc::op(params)))
    }

    fn expect(&mut self, request: &Request, params: &ParameterSet) -> Outcome {
        match self {
            Model::Stateless => demo(request.function_id, &request.data, params),
            Model::Stateful(contexts, op) => contexts.execute(request, op),
        }
    }
}

/// A random call for a stateful unit: mostly arithmetic, sometimes context
/// management, and now and then a state id with no context behind it.
fn stateful_call(rng: &mut StdRng, params: &ParameterSet, states: usize) -> (u32, u32, Word) {
    let state_id = rng.gen_range(0..params.state_count().min(states as u64 + 1)) as u32;
    let (function_id, data) = match rng.gen_range(0..16) {
        0 => (state_fn::READ_STATUS, 0),
        1 => (state_fn::WRITE_STATUS, rng.gen_range(context::OFF..=context::DIRTY) as Word),
        2 => (state_fn::READ_STATE, 0),
        3 => (state_fn::WRITE_STATE, rng.gen()),
        4 => (7, 0),
        5..=9 => (mulacc::MUL, rng.gen()),
        _ => (mulacc::MULACC, rng.gen()),
    };
    (state_id, function_id, mask(data, params.req_data_w()))
}

fn build_mux(args: &Args, params: ParameterSet) -> Result<InterfaceMux> {
    let order = if args.out_of_order {
        CompletionOrder::OutOfOrder
    } else {
        CompletionOrder::InOrder
    };
    let max_latency = args.latency;
    let targets: Vec<Box<dyn Responder>> = (0..args.targets)
        .map(|i| {
            let name = format!("cfu{i}");
            let unit = if args.states > 0 {
                FunctionUnit::stateful(name, params, args.states, mulacc::op(&params))?
            } else {
                FunctionUnit::new(name, params, move |req| {
                    demo(req.function_id, &req.data, &params)
                })
            };
            let unit = unit
                .with_latency_fn(move |req| {
                    (req.data[0] ^ req.reorder_id as Word) % (max_latency + 1)
                })
                .with_order(order);
            Ok(Box::new(unit) as Box<dyn Responder>)
        })
        .collect::<Result<_>>()?;
    InterfaceMux::new(params, targets).context("could not build the interface mux")
}

fn main() -> Result<()> {
    let args = Args::parse();
    if !(args.resp_ready > 0.0 && args.resp_ready <= 1.0) {
        let mut cmd = Args::command();
        cmd.error(
            ErrorKind::ValueValidation,
            "--resp-ready must be in (0, 1]",
        )
        .exit();
    }

    let log_file = args
        .log_file
        .as_ref()
        .map(|path| File::create(path).with_context(|| format!("could not create `{path}`")))
        .transpose()?;
    binutils::logging_setup(
        binutils::verbose_level_to_trace(args.verbose.log_level()),
        log_file.as_ref(),
    );

    let params = load_params(&args)?;
    tracing::info!(%params, "bus parameters");

    let mux = build_mux(&args, params)?;
    let ready = if args.resp_ready >= 1.0 {
        ReadyPolicy::Always
    } else {
        ReadyPolicy::random(args.resp_ready, args.seed)
    };
    let requester = Requester::new(params).with_response_ready(ready);
    let conn = Connection::new(requester, mux)?;
    let mut monitor = Monitor::new(args.tty);
    if args.trace.is_some() {
        monitor = monitor.with_records();
    }
    let mut harness = Harness::new(conn).with_monitor(monitor);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut scoreboard = Scoreboard::new();
    let mut models = (0..args.targets)
        .map(|_| Model::new(&args, &params))
        .collect::<Result<Vec<_>>>()?;
    let unrouted = (args.targets as u64) < params.interface_count();
    for _ in 0..args.requests {
        // now and then address an interface with nothing behind it
        let interface_id = if unrouted && rng.gen_ratio(1, 16) {
            args.targets
        } else {
            rng.gen_range(0..args.targets)
        };
        let mut data: Vec<Word> = (0..params.req_inputs())
            .map(|_| mask(rng.gen(), params.req_data_w()))
            .collect();
        let (state_id, function_id) = if args.states > 0 {
            let (state_id, function_id, first) = stateful_call(&mut rng, &params, args.states);
            data[0] = first;
            (state_id, function_id)
        } else {
            (0, rng.gen_range(0..4))
        };
        let call = Call::new(interface_id, function_id, data).with_state(state_id);
        let request = Request {
            interface_id,
            function_id,
            state_id,
            reorder_id: 0,
            data: call.data.clone(),
        };
        let expected = match models.get_mut(interface_id as usize) {
            Some(model) => model.expect(&request, &params),
            None => Err(FunctionError {
                error_id: status::ERROR_CFU,
            }),
        };
        let id = harness.requester_mut().submit(call)?;
        scoreboard.expect(id, expected);
    }

    let result = harness.run();
    let (mut conn, monitor) = harness.into_parts();
    if let Some(path) = &args.trace {
        let file = File::create(path).with_context(|| format!("could not create `{path}`"))?;
        monitor.write_json(file)?;
    }
    result.context("simulation failed")?;

    for completion in conn.requester_mut().drain_completions() {
        scoreboard.check(&completion)?;
    }
    scoreboard.finish()?;

    let stats = monitor.stats();
    println!(
        "{} {} calls in {} cycles",
        ansi_term::Colour::Green.bold().paint("PASS"),
        scoreboard.checked(),
        stats.cycles
    );
    println!(
        "  errors {}, request stalls {}, response stalls {}, backpressure {}, peak outstanding {}",
        stats.errors,
        stats.request_stalls,
        stats.response_stalls,
        stats.backpressure_cycles,
        stats.peak_outstanding
    );
    Ok(())
}
