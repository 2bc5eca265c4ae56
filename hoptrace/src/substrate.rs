//! The measurement substrate: what the controller reads at every cycle.
//!
//! A substrate provides the windowed flow aggregates, the probes of
//! every node and the classification of flows into five-tuples. The
//! [`MemorySubstrate`] keeps all of it in memory and is fed by the
//! caller, one packet at a time.

use hoptrace_core::{
    DuplicateObservation, FiveTuple, FlowId, FlowSnapshot, NodeId, ObservesPerPacketDelay,
    PacketId, Probe, ProbeRecord,
};
use std::{collections::BTreeMap, time::Duration};

/// Windowed per-flow aggregates.
pub trait FlowAggregateProvider {
    /// Aggregates of every known flow since the last reset.
    fn snapshot(&self) -> BTreeMap<FlowId, FlowSnapshot>;

    /// Reset the windowed counters (and the per-packet records kept for
    /// the window).
    fn reset_window(&mut self);
}

/// The probes installed on the nodes of the monitored network.
pub trait ProbeCollection {
    fn probes(&self) -> Vec<&dyn Probe>;
}

pub trait FlowClassifier {
    /// `None` if the flow was never classified.
    fn five_tuple(&self, flow: FlowId) -> Option<FiveTuple>;
}

/// Everything the [`Controller`] needs from the monitored network.
///
/// [`Controller`]: crate::Controller
pub trait Substrate: FlowAggregateProvider + ProbeCollection + FlowClassifier {}

impl<T> Substrate for T where T: FlowAggregateProvider + ProbeCollection + FlowClassifier {}

/// In-memory substrate.
///
/// ```
/// # use hoptrace::{FlowAggregateProvider, MemorySubstrate};
/// # use hoptrace_core::{FlowId, NodeId, PacketId};
/// # use std::time::Duration;
/// let mut substrate = MemorySubstrate::new();
/// let flow = FlowId::new(1);
///
/// substrate
///     .deliver(
///         flow,
///         PacketId::ZERO,
///         210,
///         &[
///             (NodeId::new(0), Duration::ZERO),
///             (NodeId::new(1), Duration::from_millis(5)),
///         ],
///     )
///     .unwrap();
///
/// let snapshot = substrate.snapshot()[&flow];
/// assert_eq!(snapshot.rx_packets, 1);
/// assert_eq!(snapshot.delay_sum, Duration::from_millis(5));
/// ```
#[derive(Debug, Default)]
pub struct MemorySubstrate {
    tuples: BTreeMap<FlowId, FiveTuple>,
    snapshots: BTreeMap<FlowId, FlowSnapshot>,
    probes: BTreeMap<NodeId, ProbeRecord>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `flow`. The flow is known from now on and reported
    /// (possibly empty) in every snapshot.
    pub fn add_flow(&mut self, flow: FlowId, tuple: FiveTuple) {
        self.tuples.insert(flow, tuple);
        self.snapshots.entry(flow).or_default();
    }

    /// Install a probe on `node`. Does nothing if there is one already.
    pub fn add_probe(&mut self, node: NodeId) {
        self.probes
            .entry(node)
            .or_insert_with(|| ProbeRecord::new(node));
    }

    pub fn probe(&self, node: NodeId) -> Option<&ProbeRecord> {
        self.probes.get(&node)
    }

    /// Direct access to the aggregates of `flow`, for substrates fed
    /// with already aggregated counters.
    pub fn snapshot_mut(&mut self, flow: FlowId) -> &mut FlowSnapshot {
        self.snapshots.entry(flow).or_default()
    }

    /// A packet of `flow` went through `path` and was received.
    ///
    /// `path` lists every node crossed, with the delay elapsed since the
    /// packet was first seen. The last entry is the end-to-end delay.
    /// Nodes without a probe are crossed unnoticed.
    ///
    /// # Errors
    ///
    /// The first [`DuplicateObservation`] raised by a probe; every
    /// observation is recorded regardless.
    pub fn deliver(
        &mut self,
        flow: FlowId,
        packet: PacketId,
        bytes: u64,
        path: &[(NodeId, Duration)],
    ) -> Result<(), DuplicateObservation> {
        let result = self.observe(flow, packet, bytes, path);

        let end_to_end = path.last().map(|(_, delay)| *delay).unwrap_or_default();
        let snapshot = self.snapshots.entry(flow).or_default();
        snapshot.tx_packets += 1;
        snapshot.tx_bytes += bytes;
        if snapshot.rx_packets > 0 {
            snapshot.jitter_sum += end_to_end.abs_diff(snapshot.last_delay);
        }
        snapshot.rx_packets += 1;
        snapshot.rx_bytes += bytes;
        snapshot.delay_sum += end_to_end;
        snapshot.last_delay = end_to_end;
        snapshot.times_forwarded += path.len().saturating_sub(2) as u64;

        result
    }

    /// A packet of `flow` went through `path` and was lost before
    /// reaching its destination.
    pub fn drop_packet(
        &mut self,
        flow: FlowId,
        packet: PacketId,
        bytes: u64,
        path: &[(NodeId, Duration)],
    ) -> Result<(), DuplicateObservation> {
        let result = self.observe(flow, packet, bytes, path);

        let snapshot = self.snapshots.entry(flow).or_default();
        snapshot.tx_packets += 1;
        snapshot.tx_bytes += bytes;
        snapshot.lost_packets += 1;

        result
    }

    fn observe(
        &mut self,
        flow: FlowId,
        packet: PacketId,
        bytes: u64,
        path: &[(NodeId, Duration)],
    ) -> Result<(), DuplicateObservation> {
        let mut result = Ok(());

        for &(node, delay) in path {
            let Some(probe) = self.probes.get_mut(&node) else {
                continue;
            };

            // packets keep their sequence numbers across windows
            if probe.packet_start_index(flow).is_none() {
                probe.set_packet_start_index(flow, packet);
            }

            if let Err(error) = probe.record_observation(flow, packet, bytes, delay)
                && result.is_ok()
            {
                result = Err(error);
            }
        }

        result
    }
}

impl FlowAggregateProvider for MemorySubstrate {
    fn snapshot(&self) -> BTreeMap<FlowId, FlowSnapshot> {
        self.snapshots.clone()
    }

    fn reset_window(&mut self) {
        for snapshot in self.snapshots.values_mut() {
            *snapshot = FlowSnapshot::default();
        }
        for probe in self.probes.values_mut() {
            probe.reset_window();
        }
    }
}

impl ProbeCollection for MemorySubstrate {
    fn probes(&self) -> Vec<&dyn Probe> {
        self.probes.values().map(|probe| probe as &dyn Probe).collect()
    }
}

impl FlowClassifier for MemorySubstrate {
    fn five_tuple(&self, flow: FlowId) -> Option<FiveTuple> {
        self.tuples.get(&flow).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoptrace_core::Protocol;
    use std::net::{IpAddr, Ipv4Addr};

    const FLOW: FlowId = FlowId::new(1);

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn line(substrate: &mut MemorySubstrate) -> [(NodeId, Duration); 3] {
        for node in 0..3 {
            substrate.add_probe(NodeId::new(node));
        }
        [
            (NodeId::new(0), ms(0)),
            (NodeId::new(1), ms(5)),
            (NodeId::new(2), ms(12)),
        ]
    }

    #[test]
    fn classify() {
        let mut substrate = MemorySubstrate::new();
        let tuple = FiveTuple {
            source_address: IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1)),
            source_port: 49153,
            destination_address: IpAddr::V4(Ipv4Addr::new(10, 1, 3, 2)),
            destination_port: 9,
            protocol: Protocol::Udp,
        };
        substrate.add_flow(FLOW, tuple);

        assert_eq!(substrate.five_tuple(FLOW), Some(tuple));
        assert_eq!(substrate.five_tuple(FlowId::new(2)), None);
        assert!(substrate.snapshot()[&FLOW].is_empty());
    }

    #[test]
    fn deliver_aggregates() {
        let mut substrate = MemorySubstrate::new();
        let path = line(&mut substrate);

        substrate.deliver(FLOW, PacketId::new(0), 100, &path).unwrap();
        let mut slower = path;
        slower[2].1 = ms(16);
        substrate.deliver(FLOW, PacketId::new(1), 100, &slower).unwrap();

        let snapshot = substrate.snapshot()[&FLOW];
        assert_eq!(snapshot.tx_packets, 2);
        assert_eq!(snapshot.rx_packets, 2);
        assert_eq!(snapshot.rx_bytes, 200);
        assert_eq!(snapshot.delay_sum, ms(28));
        assert_eq!(snapshot.jitter_sum, ms(4));
        assert_eq!(snapshot.last_delay, ms(16));
        assert_eq!(snapshot.times_forwarded, 2);

        let probe = substrate.probe(NodeId::new(1)).unwrap();
        assert_eq!(probe.len(), 2);
        assert_eq!(
            probe.packet_stats(FLOW, PacketId::new(1)).map(|s| s.delay_since_origin),
            Some(ms(5))
        );
    }

    #[test]
    fn drop_counts_lost() {
        let mut substrate = MemorySubstrate::new();
        let path = line(&mut substrate);

        substrate.drop_packet(FLOW, PacketId::new(0), 100, &path[..2]).unwrap();

        let snapshot = substrate.snapshot()[&FLOW];
        assert_eq!(snapshot.tx_packets, 1);
        assert_eq!(snapshot.rx_packets, 0);
        assert_eq!(snapshot.lost_packets, 1);
        assert_eq!(substrate.probe(NodeId::new(2)).unwrap().len(), 0);
    }

    #[test]
    fn duplicate_reported() {
        let mut substrate = MemorySubstrate::new();
        let path = line(&mut substrate);

        substrate.deliver(FLOW, PacketId::new(0), 100, &path).unwrap();
        let error = substrate
            .deliver(FLOW, PacketId::new(0), 100, &path)
            .unwrap_err();

        assert_eq!(error.node, NodeId::new(0));
        assert_eq!(error.packet, PacketId::new(0));
    }

    #[test]
    fn reset_window_clears_records() {
        let mut substrate = MemorySubstrate::new();
        let path = line(&mut substrate);

        substrate.deliver(FLOW, PacketId::new(0), 100, &path).unwrap();
        substrate.reset_window();

        assert!(substrate.snapshot()[&FLOW].is_empty());
        assert!(substrate.probe(NodeId::new(0)).unwrap().is_empty());

        substrate.deliver(FLOW, PacketId::new(7), 100, &path).unwrap();
        let probe = substrate.probe(NodeId::new(2)).unwrap();
        assert_eq!(probe.packet_start_index(FLOW), Some(PacketId::new(7)));
    }

    #[test]
    fn probes_in_node_order() {
        let mut substrate = MemorySubstrate::new();
        substrate.add_probe(NodeId::new(2));
        substrate.add_probe(NodeId::new(0));
        substrate.add_probe(NodeId::new(2));

        let nodes: Vec<NodeId> = substrate.probes().iter().map(|p| p.node()).collect();
        assert_eq!(nodes, vec![NodeId::new(0), NodeId::new(2)]);
    }
}
