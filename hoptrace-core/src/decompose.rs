//! Hop-delay decomposition and worst link localization.
//!
//! Every per-packet probe reports, for each packet it saw, the delay
//! elapsed since the packet was first observed in the network. This
//! delay only grows along the path of the packet, so sorting the
//! observations of a packet by delay recovers the order of the nodes
//! it crossed. The difference between two consecutive observations is
//! the delay introduced by that hop:
//!
//! ```text
//!   node A ── 5ms ──► node B ── 7ms ──► node C
//!   since origin: 0ms         5ms               12ms
//!   hops:         (A,B) = 5ms, (B,C) = 7ms
//! ```
//!
//! Hops of every packet of every flow of the window are merged in one
//! map keyed by [`NodePair`], the pair with the largest delay is the
//! worst link of the window.

use crate::{
    flow::{FlowId, FlowSnapshot},
    node::NodeId,
    pair::NodePair,
    probe::{ObservesPerPacketDelay, PacketId, Probe},
    store::{MeasurementStore, PairDelaySample, WorstLinkRecord},
};
use anyhow::bail;
use std::{
    collections::{BTreeMap, btree_map},
    fmt,
    str::FromStr,
    time::Duration,
};

/// How the deltas measured for the same pair during one window are
/// combined into a single delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AggregationPolicy {
    /// The last delta wins. Flows are visited by increasing [`FlowId`]
    /// and packets by increasing [`PacketId`], so this is the delta of
    /// the highest packet of the highest flow that crossed the pair.
    #[default]
    Overwrite,
    /// Arithmetic mean of every delta measured for the pair.
    Average,
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overwrite => f.write_str("overwrite"),
            Self::Average => f.write_str("average"),
        }
    }
}

impl FromStr for AggregationPolicy {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(Self::Overwrite),
            "average" => Ok(Self::Average),
            _ => bail!("Unknown aggregation policy `{s}', expecting `overwrite' or `average'"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    last: Duration,
    sum: Duration,
    count: u32,
}

impl Accumulator {
    fn push(&mut self, delta: Duration) {
        self.last = delta;
        self.sum += delta;
        self.count += 1;
    }

    fn resolve(&self, policy: AggregationPolicy) -> Duration {
        match policy {
            AggregationPolicy::Overwrite => self.last,
            AggregationPolicy::Average => self.sum / self.count.max(1),
        }
    }
}

/// Delay attributed to each hop during one window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HopDelays {
    delays: BTreeMap<NodePair, Duration>,
}

impl HopDelays {
    pub fn get(&self, pair: NodePair) -> Option<Duration> {
        self.delays.get(&pair).copied()
    }

    /// hops in increasing [`NodePair`] order
    pub fn iter(&self) -> impl Iterator<Item = (NodePair, Duration)> + '_ {
        self.delays.iter().map(|(pair, delay)| (*pair, *delay))
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// The hop with the largest delay.
    ///
    /// On equal delays the smallest pair wins.
    pub fn worst(&self) -> Option<(NodePair, Duration)> {
        let mut worst: Option<(NodePair, Duration)> = None;
        for (pair, delay) in self.iter() {
            match worst {
                Some((_, max)) if delay <= max => {}
                _ => worst = Some((pair, delay)),
            }
        }
        worst
    }
}

/// Path of a single packet: the nodes that observed it along with the
/// delay since origin they reported.
type Observations = Vec<(NodeId, Duration)>;

/// Compute the delay of every hop crossed by the traffic of the window.
///
/// Only probes with the [per-packet capability] take part. For each
/// non-empty flow, packets `start..start + rx_packets` are looked up
/// at every probe, `start` being that probe's start index for the flow.
///
/// [per-packet capability]: Probe::per_packet_delay
pub fn decompose(
    probes: &[&dyn Probe],
    snapshots: &BTreeMap<FlowId, FlowSnapshot>,
    policy: AggregationPolicy,
) -> HopDelays {
    let probes: Vec<&dyn ObservesPerPacketDelay> = probes
        .iter()
        .filter_map(|probe| probe.per_packet_delay())
        .collect();

    let mut hops: BTreeMap<NodePair, Accumulator> = BTreeMap::new();

    for (&flow, snapshot) in snapshots {
        if snapshot.is_empty() {
            continue;
        }

        for (_packet, observations) in packet_paths(&probes, flow, snapshot.rx_packets) {
            for hop in observations.windows(2) {
                let (from, from_delay) = hop[0];
                let (to, to_delay) = hop[1];

                if from == to {
                    // two probes on the same node, there is no link to blame
                    continue;
                }

                hops.entry(NodePair::new((from, to)))
                    .or_default()
                    .push(to_delay.saturating_sub(from_delay));
            }
        }
    }

    HopDelays {
        delays: hops
            .into_iter()
            .map(|(pair, accumulator)| (pair, accumulator.resolve(policy)))
            .collect(),
    }
}

/// Gather, for each received packet of `flow`, the observations of every
/// probe sorted in path order.
fn packet_paths(
    probes: &[&dyn ObservesPerPacketDelay],
    flow: FlowId,
    rx_packets: u64,
) -> BTreeMap<PacketId, Observations> {
    let mut paths: BTreeMap<PacketId, Observations> = BTreeMap::new();

    for probe in probes {
        let Some(start) = probe.packet_start_index(flow) else {
            continue;
        };

        for offset in 0..rx_packets {
            let packet = start.offset(offset);
            if let Some(delay) = probe.delay_since_origin(flow, packet) {
                paths.entry(packet).or_default().push((probe.node(), delay));
            }
        }
    }

    for observations in paths.values_mut() {
        // equal delays are ordered by node id, for reproducibility
        observations.sort_by_key(|&(node, delay)| (delay, node));
    }

    paths
}

/// Decompose the window, persist the hop delays and the worst link into
/// `store` and return the worst link.
///
/// Returns `None`, leaving `store` untouched, when no hop could be
/// measured (no traffic, or no packet observed by two probes).
pub fn localize_worst_link(
    probes: &[&dyn Probe],
    snapshots: &BTreeMap<FlowId, FlowSnapshot>,
    store: &mut MeasurementStore,
    now: Duration,
    policy: AggregationPolicy,
) -> Option<WorstLinkRecord> {
    let hops = decompose(probes, snapshots, policy);

    let Some((pair, delay)) = hops.worst() else {
        tracing::debug!("no hop delay measured in this window");
        return None;
    };

    for (pair, delay) in hops.iter() {
        tracing::trace!(%pair, ?delay, "hop delay");
        store.append_sample(
            pair,
            PairDelaySample {
                delay,
                timestamp: now,
            },
        );
    }

    let record = WorstLinkRecord {
        pair,
        delay,
        timestamp: now,
    };
    store.append_worst_link(record);

    tracing::info!(%pair, ?delay, hops = hops.len(), "worst performing link");

    Some(record)
}

impl IntoIterator for HopDelays {
    type Item = (NodePair, Duration);
    type IntoIter = btree_map::IntoIter<NodePair, Duration>;

    fn into_iter(self) -> Self::IntoIter {
        self.delays.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeRecord;

    const FLOW: FlowId = FlowId::new(1);

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn pair(a: u32, b: u32) -> NodePair {
        NodePair::new((NodeId::new(a), NodeId::new(b)))
    }

    fn received(rx_packets: u64) -> BTreeMap<FlowId, FlowSnapshot> {
        BTreeMap::from([(
            FLOW,
            FlowSnapshot {
                tx_packets: rx_packets,
                rx_packets,
                ..FlowSnapshot::default()
            },
        )])
    }

    /// Line A(0) - B(1) - C(2), each packet recorded with the given
    /// delays since origin at A, B and C.
    fn line(packets: &[[u64; 3]]) -> Vec<ProbeRecord> {
        let mut records: Vec<ProbeRecord> =
            (0..3).map(|n| ProbeRecord::new(NodeId::new(n))).collect();
        for (id, delays) in packets.iter().enumerate() {
            for (record, delay) in records.iter_mut().zip(delays) {
                record
                    .record_observation(FLOW, PacketId::new(id as u64), 210, ms(*delay))
                    .unwrap();
            }
        }
        records
    }

    fn as_probes(records: &[ProbeRecord]) -> Vec<&dyn Probe> {
        records.iter().map(|record| record as &dyn Probe).collect()
    }

    struct AggregateOnlyProbe(NodeId);

    impl Probe for AggregateOnlyProbe {
        fn node(&self) -> NodeId {
            self.0
        }
    }

    #[test]
    fn three_node_line() {
        let records = line(&[[0, 5, 12]]);
        let hops = decompose(
            &as_probes(&records),
            &received(1),
            AggregationPolicy::Overwrite,
        );

        assert_eq!(hops.len(), 2);
        assert_eq!(hops.get(pair(0, 1)), Some(ms(5)));
        assert_eq!(hops.get(pair(1, 2)), Some(ms(7)));
        assert_eq!(hops.worst(), Some((pair(1, 2), ms(7))));
    }

    #[test]
    fn probe_order_does_not_matter() {
        let mut records = line(&[[0, 5, 12]]);
        records.reverse();
        let hops = decompose(
            &as_probes(&records),
            &received(1),
            AggregationPolicy::Overwrite,
        );

        assert_eq!(hops.get(pair(1, 0)), Some(ms(5)));
        assert_eq!(hops.get(pair(2, 1)), Some(ms(7)));
    }

    #[test]
    fn path_order_comes_from_delays_not_node_ids() {
        // packet goes C(2) -> A(0) -> B(1)
        let records = line(&[[3, 10, 0]]);
        let hops = decompose(
            &as_probes(&records),
            &received(1),
            AggregationPolicy::Overwrite,
        );

        assert_eq!(hops.get(pair(0, 2)), Some(ms(3)));
        assert_eq!(hops.get(pair(0, 1)), Some(ms(7)));
        assert_eq!(hops.get(pair(1, 2)), None);
    }

    #[test]
    fn telescoping_sum() {
        let packets = [[0, 4, 9], [1, 2, 30], [0, 0, 0], [7, 8, 9]];
        for delays in packets {
            let records = line(&[delays]);
            let hops = decompose(
                &as_probes(&records),
                &received(1),
                AggregationPolicy::Overwrite,
            );

            let total: Duration = hops.iter().map(|(_, delay)| delay).sum();
            let first = delays.iter().min().unwrap();
            let last = delays.iter().max().unwrap();
            assert_eq!(total, ms(last - first), "packet {delays:?}");
        }
    }

    #[test]
    fn overwrite_keeps_the_last_packet() {
        let records = line(&[[0, 5, 12], [0, 9, 10]]);
        let hops = decompose(
            &as_probes(&records),
            &received(2),
            AggregationPolicy::Overwrite,
        );

        assert_eq!(hops.get(pair(0, 1)), Some(ms(9)));
        assert_eq!(hops.get(pair(1, 2)), Some(ms(1)));
        assert_eq!(hops.worst(), Some((pair(0, 1), ms(9))));
    }

    #[test]
    fn average_over_packets() {
        let records = line(&[[0, 5, 12], [0, 9, 10]]);
        let hops = decompose(
            &as_probes(&records),
            &received(2),
            AggregationPolicy::Average,
        );

        assert_eq!(hops.get(pair(0, 1)), Some(ms(7)));
        assert_eq!(hops.get(pair(1, 2)), Some(ms(4)));
    }

    #[test]
    fn only_received_packets_are_considered() {
        // the second packet is recorded but the window only received one
        let records = line(&[[0, 5, 12], [0, 50, 51]]);
        let hops = decompose(
            &as_probes(&records),
            &received(1),
            AggregationPolicy::Overwrite,
        );

        assert_eq!(hops.get(pair(0, 1)), Some(ms(5)));
    }

    #[test]
    fn start_index_offsets_the_packet_range() {
        let mut records: Vec<ProbeRecord> =
            (0..2).map(|n| ProbeRecord::new(NodeId::new(n))).collect();
        for record in records.iter_mut() {
            record.set_packet_start_index(FLOW, PacketId::new(10));
        }
        records[0]
            .record_observation(FLOW, PacketId::new(10), 210, ms(0))
            .unwrap();
        records[1]
            .record_observation(FLOW, PacketId::new(10), 210, ms(3))
            .unwrap();

        let hops = decompose(
            &as_probes(&records),
            &received(1),
            AggregationPolicy::Overwrite,
        );
        assert_eq!(hops.get(pair(0, 1)), Some(ms(3)));
    }

    #[test]
    fn single_observation_gives_no_hop() {
        let mut record = ProbeRecord::new(NodeId::ZERO);
        record
            .record_observation(FLOW, PacketId::ZERO, 210, ms(0))
            .unwrap();

        let hops = decompose(
            &[&record as &dyn Probe],
            &received(1),
            AggregationPolicy::Overwrite,
        );
        assert!(hops.is_empty());
        assert_eq!(hops.worst(), None);
    }

    #[test]
    fn empty_snapshots_are_skipped() {
        let records = line(&[[0, 5, 12]]);
        let snapshots = BTreeMap::from([(FLOW, FlowSnapshot::default())]);

        let hops = decompose(
            &as_probes(&records),
            &snapshots,
            AggregationPolicy::Overwrite,
        );
        assert!(hops.is_empty());
    }

    #[test]
    fn aggregate_only_probes_are_ignored() {
        let records = line(&[[0, 5, 12]]);
        let other = AggregateOnlyProbe(NodeId::new(7));
        let mut probes = as_probes(&records);
        probes.push(&other);

        let hops = decompose(&probes, &received(1), AggregationPolicy::Overwrite);
        assert_eq!(hops.len(), 2);
    }

    #[test]
    fn ties_are_ordered_by_node_id() {
        // B and C report the same delay: B(1) is placed before C(2)
        let records = line(&[[0, 5, 5]]);
        let hops = decompose(
            &as_probes(&records),
            &received(1),
            AggregationPolicy::Overwrite,
        );

        assert_eq!(hops.get(pair(0, 1)), Some(ms(5)));
        assert_eq!(hops.get(pair(1, 2)), Some(Duration::ZERO));
    }

    #[test]
    fn worst_tie_goes_to_smallest_pair() {
        let records = line(&[[0, 6, 12]]);
        let hops = decompose(
            &as_probes(&records),
            &received(1),
            AggregationPolicy::Overwrite,
        );
        assert_eq!(hops.worst(), Some((pair(0, 1), ms(6))));
    }

    #[test]
    fn localize_persists_samples_and_worst_link() {
        let records = line(&[[0, 5, 12]]);
        let mut store = MeasurementStore::new();

        let worst = localize_worst_link(
            &as_probes(&records),
            &received(1),
            &mut store,
            ms(100),
            AggregationPolicy::Overwrite,
        )
        .unwrap();

        assert_eq!(worst.pair, pair(1, 2));
        assert_eq!(worst.delay, ms(7));
        assert_eq!(store.worst_links(), &[worst]);
        assert_eq!(
            store.series(pair(0, 1)).unwrap().samples(),
            &[PairDelaySample {
                delay: ms(5),
                timestamp: ms(100),
            }]
        );
        assert_eq!(
            store.series(pair(1, 2)).unwrap().samples(),
            &[PairDelaySample {
                delay: ms(7),
                timestamp: ms(100),
            }]
        );
    }

    #[test]
    fn localize_without_traffic_leaves_the_store_alone() {
        let records = line(&[]);
        let mut store = MeasurementStore::new();

        let worst = localize_worst_link(
            &as_probes(&records),
            &BTreeMap::new(),
            &mut store,
            ms(100),
            AggregationPolicy::Overwrite,
        );

        assert_eq!(worst, None);
        assert!(store.is_empty());
    }

    #[test]
    fn policy_parse_and_display() {
        assert_eq!(
            "average".parse::<AggregationPolicy>().unwrap(),
            AggregationPolicy::Average
        );
        assert_eq!(AggregationPolicy::default().to_string(), "overwrite");
        assert!("median".parse::<AggregationPolicy>().is_err());
    }
}
