//! Per-node packet observation bookkeeping.
//!
//! A probe sits on a node and sees every packet crossing it. The
//! [`ProbeRecord`] keeps, for each packet of each flow, how much time
//! elapsed since the packet was first seen anywhere in the network.
//! These samples are what the [decomposition] correlates into hops.
//!
//! [decomposition]: crate::decompose

use crate::{flow::FlowId, node::NodeId};
use std::{collections::BTreeMap, fmt, time::Duration};
use thiserror::Error;

/// Sequence number of a packet within its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PacketId(u64);

impl PacketId {
    pub const ZERO: Self = Self::new(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn into_inner(self) -> u64 {
        self.0
    }

    /// the packet id `offset` positions after this one
    #[must_use = "function does not modify the current value"]
    pub fn offset(self, offset: u64) -> Self {
        Self(self.0.saturating_add(offset))
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a probe recorded for a single packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketStats {
    pub bytes: u64,
    /// always `1` once written
    pub packets: u64,
    /// elapsed time between the first observation of the packet
    /// anywhere in the network and its observation at this node
    pub delay_since_origin: Duration,
}

/// A packet was recorded twice by the same probe.
///
/// This means an observation was double counted upstream. It is not
/// fatal: the later observation replaces the former one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Duplicate observation of packet {packet} of flow {flow} at node {node}")]
pub struct DuplicateObservation {
    pub node: NodeId,
    pub flow: FlowId,
    pub packet: PacketId,
}

/// Capability of a probe to answer per-packet delay queries.
///
/// Only probes keeping per-packet samples implement it; the engine
/// discovers them through [`Probe::per_packet_delay`].
pub trait ObservesPerPacketDelay {
    /// the node this probe is attached to
    fn node(&self) -> NodeId;

    /// first packet sequence number of `flow` observed in the current
    /// window, `None` if the flow never crossed this node
    fn packet_start_index(&self, flow: FlowId) -> Option<PacketId>;

    /// delay since origin recorded for the given packet, if it crossed
    /// this node
    fn delay_since_origin(&self, flow: FlowId, packet: PacketId) -> Option<Duration>;
}

/// Any probe installed on a node of the monitored network.
pub trait Probe {
    fn node(&self) -> NodeId;

    /// Narrow this probe to its per-packet delay capability.
    ///
    /// Probes that only keep flow aggregates return `None` (the default).
    fn per_packet_delay(&self) -> Option<&dyn ObservesPerPacketDelay> {
        None
    }
}

/// Per-packet samples recorded by the probe of one node.
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    node: NodeId,
    packet_start_index: BTreeMap<FlowId, PacketId>,
    per_packet_stats: BTreeMap<(FlowId, PacketId), PacketStats>,
}

impl ProbeRecord {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            packet_start_index: BTreeMap::new(),
            per_packet_stats: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Record that `packet` of `flow`, `bytes` long, crossed this node
    /// `delay_since_origin` after it was first seen in the network.
    ///
    /// Makes sure the flow has a start index (`0` unless one was set
    /// with [`set_packet_start_index`]).
    ///
    /// # Errors
    ///
    /// [`DuplicateObservation`] if the packet was already recorded in
    /// this window. The error is logged and the new observation replaces
    /// the previous one anyway.
    ///
    /// [`set_packet_start_index`]: Self::set_packet_start_index
    pub fn record_observation(
        &mut self,
        flow: FlowId,
        packet: PacketId,
        bytes: u64,
        delay_since_origin: Duration,
    ) -> Result<(), DuplicateObservation> {
        self.packet_start_index.entry(flow).or_insert(PacketId::ZERO);

        let stats = PacketStats {
            bytes,
            packets: 1,
            delay_since_origin,
        };

        match self.per_packet_stats.insert((flow, packet), stats) {
            None => Ok(()),
            Some(previous) => {
                let error = DuplicateObservation {
                    node: self.node,
                    flow,
                    packet,
                };
                tracing::warn!(
                    previous = ?previous.delay_since_origin,
                    current = ?delay_since_origin,
                    "{error}"
                );
                Err(error)
            }
        }
    }

    /// Set the first packet sequence number of `flow` for this window.
    ///
    /// Substrates numbering packets continuously across windows call
    /// this when the flow is first seen after a reset.
    pub fn set_packet_start_index(&mut self, flow: FlowId, start: PacketId) {
        self.packet_start_index.insert(flow, start);
    }

    pub fn packet_stats(&self, flow: FlowId, packet: PacketId) -> Option<&PacketStats> {
        self.per_packet_stats.get(&(flow, packet))
    }

    /// number of packets recorded in the current window
    pub fn len(&self) -> usize {
        self.per_packet_stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_packet_stats.is_empty()
    }

    /// Forget everything recorded in the current window.
    pub fn reset_window(&mut self) {
        self.packet_start_index.clear();
        self.per_packet_stats.clear();
    }
}

impl ObservesPerPacketDelay for ProbeRecord {
    fn node(&self) -> NodeId {
        self.node
    }

    fn packet_start_index(&self, flow: FlowId) -> Option<PacketId> {
        self.packet_start_index.get(&flow).copied()
    }

    fn delay_since_origin(&self, flow: FlowId, packet: PacketId) -> Option<Duration> {
        self.packet_stats(flow, packet)
            .map(|stats| stats.delay_since_origin)
    }
}

impl Probe for ProbeRecord {
    fn node(&self) -> NodeId {
        self.node
    }

    fn per_packet_delay(&self) -> Option<&dyn ObservesPerPacketDelay> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const FLOW: FlowId = FlowId::new(1);

    #[test]
    fn record_creates_start_index() {
        let mut record = ProbeRecord::new(NodeId::ONE);
        assert_eq!(record.packet_start_index(FLOW), None);

        record
            .record_observation(FLOW, PacketId::new(3), 210, Duration::from_millis(2))
            .unwrap();

        assert_eq!(record.packet_start_index(FLOW), Some(PacketId::ZERO));
        assert_eq!(
            record.packet_stats(FLOW, PacketId::new(3)),
            Some(&PacketStats {
                bytes: 210,
                packets: 1,
                delay_since_origin: Duration::from_millis(2),
            })
        );
    }

    #[test]
    fn start_index_is_not_overridden_by_observations() {
        let mut record = ProbeRecord::new(NodeId::ONE);
        record.set_packet_start_index(FLOW, PacketId::new(40));
        record
            .record_observation(FLOW, PacketId::new(40), 210, Duration::ZERO)
            .unwrap();

        assert_eq!(record.packet_start_index(FLOW), Some(PacketId::new(40)));
    }

    #[test]
    #[traced_test]
    fn duplicate_is_reported_and_later_write_wins() {
        let mut record = ProbeRecord::new(NodeId::new(4));
        record
            .record_observation(FLOW, PacketId::ZERO, 210, Duration::from_millis(1))
            .unwrap();

        let error = record
            .record_observation(FLOW, PacketId::ZERO, 210, Duration::from_millis(9))
            .unwrap_err();

        assert_eq!(
            error,
            DuplicateObservation {
                node: NodeId::new(4),
                flow: FLOW,
                packet: PacketId::ZERO,
            }
        );
        assert_eq!(
            record.delay_since_origin(FLOW, PacketId::ZERO),
            Some(Duration::from_millis(9))
        );
        assert_eq!(record.len(), 1);
        assert!(logs_contain("Duplicate observation of packet 0 of flow 1 at node 4"));
    }

    #[test]
    fn same_packet_id_in_different_flows() {
        let mut record = ProbeRecord::new(NodeId::ONE);
        record
            .record_observation(FlowId::new(1), PacketId::ZERO, 10, Duration::ZERO)
            .unwrap();
        record
            .record_observation(FlowId::new(2), PacketId::ZERO, 10, Duration::ZERO)
            .unwrap();
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn reset_window_clears_everything() {
        let mut record = ProbeRecord::new(NodeId::ONE);
        record
            .record_observation(FLOW, PacketId::ZERO, 10, Duration::ZERO)
            .unwrap();
        record.reset_window();

        assert!(record.is_empty());
        assert_eq!(record.packet_start_index(FLOW), None);
        assert_eq!(record.delay_since_origin(FLOW, PacketId::ZERO), None);
    }

    #[test]
    fn narrowing_exposes_the_record() {
        let record = ProbeRecord::new(NodeId::new(9));
        let probe: &dyn Probe = &record;
        let capability = probe.per_packet_delay().expect("records per packet");
        assert_eq!(capability.node(), NodeId::new(9));
    }
}
