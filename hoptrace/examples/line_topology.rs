//! Line topology: a single flow crosses a chain of nodes, one link of
//! which gets congested halfway through the run.
//!
//! The controller reports every cycle and points at the congested link
//! once its delay dominates.
//!
//! Run with:
//!   cargo run --example line_topology -p hoptrace -- --output target/line

use anyhow::{Context as _, Result, ensure};
use clap::Parser;
use hoptrace::{
    AggregationPolicy, Controller, ControllerConfig, FiveTuple, FlowId, MemorySubstrate, NodeId,
    PacketId, Protocol, Throughput,
};
use hoptrace_core::time::Duration;
use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    time,
};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[derive(Parser)]
struct Command {
    /// prefix of the report files
    #[arg(long, default_value = "line")]
    output: PathBuf,

    #[arg(long, default_value = "10s")]
    time: Duration,

    #[arg(long, default_value = "4")]
    nodes: u32,

    /// propagation delay of every link
    #[arg(long, default_value = "2ms")]
    hop_delay: Duration,

    /// index of the link that gets congested
    #[arg(long, default_value = "1")]
    congested: u32,

    /// extra delay of the congested link, reached at the end of the run
    #[arg(long, default_value = "20ms")]
    congestion: Duration,

    /// one packet every
    #[arg(long, default_value = "10ms")]
    every: Duration,

    #[arg(long, default_value = "210")]
    packet_size: u64,

    #[arg(long, default_value = "500ms")]
    healthy_cadence: Duration,
    #[arg(long, default_value = "100ms")]
    degraded_cadence: Duration,

    #[arg(long, default_value = "55kbps")]
    mean_throughput: Throughput,
    #[arg(long, default_value = "15ms")]
    mean_delay: Duration,

    #[arg(long, default_value = "overwrite")]
    aggregation: AggregationPolicy,

    #[arg(long)]
    verbose: bool,
}

impl Command {
    fn validate(&self) -> Result<()> {
        ensure!(!self.every.into_duration().is_zero(), "--every cannot be zero");
        ensure!(!self.time.into_duration().is_zero(), "--time cannot be zero");
        ensure!(self.nodes >= 2, "a line needs at least 2 nodes");
        ensure!(
            self.congested + 1 < self.nodes,
            "link {} is not part of a line of {} nodes",
            self.congested,
            self.nodes
        );
        Ok(())
    }

    /// the last node of the line is addressed as `10.1.<nodes>.2`
    fn destination(&self) -> Result<Ipv4Addr> {
        let subnet = u8::try_from(self.nodes)
            .with_context(|| format!("{} nodes do not fit in the address plan", self.nodes))?;
        Ok(Ipv4Addr::new(10, 1, subnet, 2))
    }
}

fn main() -> Result<()> {
    let cmd = Command::parse();
    cmd.validate()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cmd.verbose {
            EnvFilter::new(LevelFilter::DEBUG.to_string())
        } else {
            EnvFilter::new(LevelFilter::INFO.to_string())
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let flow = FlowId::new(1);
    let mut substrate = MemorySubstrate::new();
    for node in 0..cmd.nodes {
        substrate.add_probe(NodeId::new(node));
    }
    substrate.add_flow(
        flow,
        FiveTuple {
            source_address: IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1)),
            source_port: 49153,
            destination_address: IpAddr::V4(cmd.destination()?),
            destination_port: 9,
            protocol: Protocol::Udp,
        },
    );

    let run_length = cmd.time.into_duration();
    let config = ControllerConfig::new(cmd.output.clone())
        .set_healthy_cadence(cmd.healthy_cadence.into_duration())
        .set_degraded_cadence(cmd.degraded_cadence.into_duration())
        .set_mean_throughput_threshold(cmd.mean_throughput)
        .set_mean_delay_threshold(cmd.mean_delay.into_duration())
        .set_aggregation(cmd.aggregation)
        .set_run_length(run_length);
    let mut controller = Controller::new(config, substrate)?;

    let every = cmd.every.into_duration();
    let mut next_send = time::Duration::ZERO;
    let mut next_packet = 0;

    let outcomes = controller.run(time::Duration::ZERO, |substrate, _from, to| {
        while next_send < to {
            let hops = path(&cmd, next_send.as_secs_f64() / run_length.as_secs_f64());
            if let Err(error) =
                substrate.deliver(flow, PacketId::new(next_packet), cmd.packet_size, &hops)
            {
                tracing::warn!(%error, "packet skipped");
            }
            next_packet += 1;
            next_send += every;
        }
        true
    });

    for outcome in &outcomes {
        match outcome.worst_link {
            Some(record) => println!(
                "{:>8.3}s {:<8} worst link {} ({:?})",
                outcome.now.as_secs_f64(),
                outcome.health.to_string(),
                record.pair,
                record.delay
            ),
            None => println!(
                "{:>8.3}s {:<8}",
                outcome.now.as_secs_f64(),
                outcome.health.to_string()
            ),
        }
    }

    println!();
    println!(
        "{} cycles, reports in {}",
        outcomes.len(),
        controller.config().report_path().display()
    );

    Ok(())
}

/// Delays since origin at each node, `progress` being the fraction of
/// the run elapsed.
fn path(cmd: &Command, progress: f64) -> Vec<(NodeId, time::Duration)> {
    let hop = cmd.hop_delay.into_duration();
    let congestion = if progress < 0.5 {
        time::Duration::ZERO
    } else {
        cmd.congestion.into_duration().mul_f64((progress - 0.5) * 2.0)
    };

    let mut elapsed = time::Duration::ZERO;
    (0..cmd.nodes)
        .map(|node| {
            if node > 0 {
                elapsed += hop;
                if node == cmd.congested + 1 {
                    elapsed += congestion;
                }
            }
            (NodeId::new(node), elapsed)
        })
        .collect()
}
