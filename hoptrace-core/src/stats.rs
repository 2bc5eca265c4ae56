//! Window statistics: what the controller compares against its
//! thresholds to decide whether the network is healthy.

use crate::{
    defaults::{
        DEFAULT_FLOW_MEAN_DELAY_THRESHOLD, DEFAULT_FLOW_THROUGHPUT_THRESHOLD,
        DEFAULT_MEAN_DELAY_THRESHOLD, DEFAULT_MEAN_THROUGHPUT_THRESHOLD,
    },
    flow::{FlowId, FlowSnapshot},
    measure::Throughput,
};
use std::{collections::BTreeMap, time::Duration};

/// Metrics of one flow over one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowMetrics {
    /// received throughput
    pub throughput: Throughput,
    /// transmitted throughput
    pub offered_load: Throughput,
    /// zero if nothing was received
    pub mean_delay: Duration,
    /// zero if nothing was received
    pub mean_jitter: Duration,
    pub last_delay: Duration,
    /// whether at least one packet was received
    pub received: bool,
}

impl FlowMetrics {
    pub fn measure(snapshot: &FlowSnapshot, window: Duration) -> Self {
        Self {
            throughput: snapshot.throughput(window),
            offered_load: snapshot.offered_load(window),
            mean_delay: snapshot.mean_delay().unwrap_or_default(),
            mean_jitter: snapshot.mean_jitter().unwrap_or_default(),
            last_delay: snapshot.last_delay,
            received: snapshot.rx_packets > 0,
        }
    }
}

/// Aggregated statistics of every non-empty flow of a window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowStats {
    flows: BTreeMap<FlowId, FlowMetrics>,
    /// mean throughput of the non-empty flows
    pub mean_throughput: Throughput,
    /// mean of the per-flow mean delays of the non-empty flows
    pub mean_delay: Duration,
    /// mean of the per-flow mean jitters of the non-empty flows
    pub mean_jitter: Duration,
    /// upper median of the per-flow mean delays
    pub median_delay: Duration,
}

impl WindowStats {
    /// Compute the statistics of a window of the given length.
    ///
    /// Empty snapshots are left out: they neither count in the means nor
    /// appear in [`flows`](Self::flows). A flow that transmitted but
    /// received nothing counts in every mean with zero throughput, delay
    /// and jitter.
    pub fn compute(snapshots: &BTreeMap<FlowId, FlowSnapshot>, window: Duration) -> Self {
        let flows: BTreeMap<FlowId, FlowMetrics> = snapshots
            .iter()
            .filter(|(_, snapshot)| !snapshot.is_empty())
            .map(|(flow, snapshot)| (*flow, FlowMetrics::measure(snapshot, window)))
            .collect();

        if flows.is_empty() {
            return Self::default();
        }

        let mean_throughput = Throughput::from_bps(
            flows.values().map(|m| m.throughput.as_bps()).sum::<f64>() / flows.len() as f64,
        );

        // flows that lost every packet count with a zero delay
        let count = flows.len() as u32;
        let mean_delay = flows.values().map(|m| m.mean_delay).sum::<Duration>() / count;
        let mean_jitter = flows.values().map(|m| m.mean_jitter).sum::<Duration>() / count;

        let mut delays: Vec<Duration> = flows.values().map(|m| m.mean_delay).collect();
        delays.sort_unstable();
        let median_delay = delays[delays.len() / 2];

        Self {
            flows,
            mean_throughput,
            mean_delay,
            mean_jitter,
            median_delay,
        }
    }

    /// metrics of the non-empty flows, by flow id
    pub fn flows(&self) -> &BTreeMap<FlowId, FlowMetrics> {
        &self.flows
    }

    pub fn flow(&self, flow: FlowId) -> Option<&FlowMetrics> {
        self.flows.get(&flow)
    }

    /// `true` if no flow carried traffic during the window
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

/// Health thresholds.
///
/// The per-flow thresholds only qualify individual flows in the
/// reports, the health of the window is decided on the mean ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub flow_throughput: Throughput,
    pub flow_mean_delay: Duration,
    pub mean_throughput: Throughput,
    pub mean_delay: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            flow_throughput: DEFAULT_FLOW_THROUGHPUT_THRESHOLD,
            flow_mean_delay: DEFAULT_FLOW_MEAN_DELAY_THRESHOLD,
            mean_throughput: DEFAULT_MEAN_THROUGHPUT_THRESHOLD,
            mean_delay: DEFAULT_MEAN_DELAY_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn flow_surpassed(&self, metrics: &FlowMetrics) -> bool {
        metrics.throughput < self.flow_throughput || metrics.mean_delay > self.flow_mean_delay
    }

    /// `true` if the window is degraded: mean throughput below its
    /// threshold or mean delay above its threshold.
    pub fn window_surpassed(&self, stats: &WindowStats) -> bool {
        stats.mean_throughput < self.mean_throughput || stats.mean_delay > self.mean_delay
    }
}
