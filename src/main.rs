//! chronon demo
//!
//! A UDP-echo style exchange between two nodes over a link with fixed
//! one-way delay. The client sends a packet every interval, the server
//! bounces each one back, and the client records round-trip times. The
//! scenario runs twice and the dispatch traces are compared to confirm
//! deterministic replay.
//!
//! ```bash
//! chronon-demo --packets 5 --interval-ms 1000 --link-delay-ms 2 --stop-secs 11
//! RUST_LOG=chronon=trace chronon-demo --packets 2
//! ```

use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;

use chronon::trace::traces_match;
use chronon::{
    DispatchTrace, EventId, SimDuration, SimError, SimResult, Simulator, SimulatorConfig,
    VirtualTime,
};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const CLIENT: u32 = 0;
const SERVER: u32 = 1;

/// Largest whole-second time that fits the nanosecond clock as a delay.
const MAX_SECS: u64 = i64::MAX as u64 / 1_000_000_000;

/// Echo exchange over a delayed point-to-point link.
#[derive(Parser, Debug)]
#[command(name = "chronon-demo")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of packets the client sends
    #[arg(short = 'n', long, default_value_t = 5)]
    packets: u32,

    /// Gap between consecutive sends, in milliseconds
    #[arg(short = 'i', long, default_value_t = 1000)]
    interval_ms: u32,

    /// One-way link delay, in milliseconds
    #[arg(short = 'd', long, default_value_t = 2)]
    link_delay_ms: u32,

    /// Client application start time, in seconds
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(..=MAX_SECS))]
    start_secs: u64,

    /// Client application stop time, in seconds. Any send still pending is cancelled.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(..=MAX_SECS))]
    client_stop_secs: u64,

    /// Simulation stop time, in seconds
    #[arg(short = 's', long, default_value_t = 11, value_parser = clap::value_parser!(u64).range(..=MAX_SECS))]
    stop_secs: u64,

    /// Print the dispatch trace of the first run
    #[arg(long)]
    dump_trace: bool,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    delay: SimDuration,
}

#[derive(Debug, Default)]
struct EchoClient {
    limit: u32,
    interval: SimDuration,
    sent: u32,
    rtts: Vec<SimDuration>,
    /// Next periodic send, cancelled when the application stops.
    send_event: Option<EventId>,
}

type Shared = Rc<RefCell<EchoClient>>;

struct RunReport {
    dispatched: u64,
    finished_at: VirtualTime,
    sent: u32,
    rtts: Vec<SimDuration>,
    trace: DispatchTrace,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,chronon=info,chronon_demo=info")),
        )
        .init();

    let args = Args::parse();
    info!(
        packets = args.packets,
        interval_ms = args.interval_ms,
        link_delay_ms = args.link_delay_ms,
        stop_secs = args.stop_secs,
        "starting echo simulation"
    );

    let first = match run_echo(&args) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "simulation failed");
            return ExitCode::FAILURE;
        }
    };
    let second = match run_echo(&args) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "replay failed");
            return ExitCode::FAILURE;
        }
    };

    println!("Echo simulation");
    println!("  dispatched : {}", first.dispatched);
    println!("  finished at: {}", first.finished_at);
    println!("  sent       : {}", first.sent);
    println!("  echoed     : {}", first.rtts.len());
    for (seq, rtt) in first.rtts.iter().enumerate() {
        println!("    #{:<3} rtt {}", seq + 1, rtt);
    }
    println!();
    println!("  run 1 trace hash: {:016x}", first.trace.log_hash());
    println!("  run 2 trace hash: {:016x}", second.trace.log_hash());

    if args.dump_trace {
        println!();
        if let Err(e) = first.trace.export(&mut std::io::stdout().lock()) {
            error!(error = %e, "failed to write trace");
            return ExitCode::FAILURE;
        }
    }

    if traces_match(&first.trace, &second.trace) {
        println!("  replay identical");
        ExitCode::SUCCESS
    } else {
        error!("replay diverged from the first run");
        ExitCode::FAILURE
    }
}

fn run_echo(args: &Args) -> SimResult<RunReport> {
    let config = SimulatorConfig::new()
        .stop_at(VirtualTime::from_secs(args.stop_secs))
        .record_trace(true);
    let mut sim = Simulator::with_config(config);

    let link = Link {
        delay: SimDuration::millis(i64::from(args.link_delay_ms)),
    };
    let client: Shared = Rc::new(RefCell::new(EchoClient {
        limit: args.packets,
        interval: SimDuration::millis(i64::from(args.interval_ms)),
        ..EchoClient::default()
    }));

    let start = VirtualTime::from_secs(args.start_secs);
    let c = Rc::clone(&client);
    sim.try_schedule_with_context(CLIENT, start.since(sim.now()), move |sim| {
        if c.borrow().limit == 0 {
            return Ok(());
        }
        send_packet(sim, &c, link)
    })?;

    let c = Rc::clone(&client);
    sim.schedule_at(VirtualTime::from_secs(args.client_stop_secs), move |sim| {
        if let Some(id) = c.borrow_mut().send_event.take() {
            if sim.cancel(id) {
                debug!(event = %id, now = %sim.now(), "client stopped, pending send cancelled");
            }
        }
    })?;

    let dispatched = sim.run()?;
    let finished_at = sim.now();
    let trace = sim.trace().cloned().unwrap_or_default();
    sim.destroy();

    let client = client.borrow();
    Ok(RunReport {
        dispatched,
        finished_at,
        sent: client.sent,
        rtts: client.rtts.clone(),
        trace,
    })
}

/// Send one packet, then arm the next periodic send.
fn send_packet(sim: &mut Simulator, client: &Shared, link: Link) -> Result<(), SimError> {
    let (seq, more, interval) = {
        let mut c = client.borrow_mut();
        c.sent += 1;
        c.send_event = None;
        (c.sent, c.sent < c.limit, c.interval)
    };
    let sent_at = sim.now();
    debug!(seq, now = %sent_at, context = sim.context(), "client send");

    let c = Rc::clone(client);
    sim.try_schedule_with_context(SERVER, link.delay, move |sim| {
        server_receive(sim, seq, sent_at, c, link)
    })?;

    if more {
        let c = Rc::clone(client);
        let id = sim.try_schedule(interval, move |sim| send_packet(sim, &c, link))?;
        client.borrow_mut().send_event = Some(id);
    }
    Ok(())
}

fn server_receive(
    sim: &mut Simulator,
    seq: u32,
    sent_at: VirtualTime,
    client: Shared,
    link: Link,
) -> Result<(), SimError> {
    debug!(seq, now = %sim.now(), context = sim.context(), "server echo");
    sim.schedule_with_context(CLIENT, link.delay, move |sim| {
        let rtt = sim.now().since(sent_at);
        debug!(seq, rtt = %rtt, "client receive");
        client.borrow_mut().rtts.push(rtt);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("chronon-demo").chain(extra.iter().copied()))
    }

    #[test]
    fn test_default_exchange() {
        let report = run_echo(&args(&[])).unwrap();
        assert_eq!(report.sent, 5);
        assert_eq!(report.rtts, vec![SimDuration::millis(4); 5]);
        assert_eq!(report.finished_at, VirtualTime::from_secs(11));
    }

    #[test]
    fn test_client_stop_cancels_pending_send() {
        let report = run_echo(&args(&["--packets", "20", "--client-stop-secs", "3"])).unwrap();
        // Sends at 1s and 2s; the 3s send is cancelled by the stop at 3s.
        assert_eq!(report.sent, 2);
        assert_eq!(report.rtts.len(), 2);
    }

    #[test]
    fn test_replay_is_identical() {
        let a = run_echo(&args(&["--packets", "3"])).unwrap();
        let b = run_echo(&args(&["--packets", "3"])).unwrap();
        assert!(traces_match(&a.trace, &b.trace));
        assert_eq!(a.dispatched, b.dispatched);
    }

    #[test]
    fn test_echo_failure_aborts_run() {
        // The server's reply would land past the end of the clock.
        let epoch = VirtualTime::from_nanos(u64::MAX - 2_000_000);
        let mut sim = Simulator::with_config(SimulatorConfig::new().epoch(epoch));
        let link = Link {
            delay: SimDuration::millis(2),
        };
        let client: Shared = Rc::new(RefCell::new(EchoClient {
            limit: 1,
            ..EchoClient::default()
        }));

        send_packet(&mut sim, &client, link).unwrap();
        let err = sim.run().unwrap_err();
        match err {
            SimError::EventFailed { source, .. } => {
                assert!(source.to_string().contains("overflow"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(client.borrow().rtts.is_empty());
    }

    #[test]
    fn test_out_of_range_seconds_rejected() {
        let too_big = (MAX_SECS + 1).to_string();
        for flag in ["--start-secs", "--client-stop-secs", "--stop-secs"] {
            let parsed = Args::try_parse_from(["chronon-demo", flag, too_big.as_str()]);
            assert!(parsed.is_err(), "{flag} accepted {too_big}");
        }
        let max = MAX_SECS.to_string();
        assert!(Args::try_parse_from(["chronon-demo", "--stop-secs", max.as_str()]).is_ok());
    }
}
