/*!
# Hop-delay decomposition

Attribute end-to-end delays to individual hops of a monitored network
and single out the worst performing link of each measurement window.

* [`ProbeRecord`]: per-node bookkeeping of the delay elapsed since each
  packet was first observed in the network;
* [`decompose`] and [`localize_worst_link`]: correlate the records of
  every node into ordered hops and select the worst one;
* [`MeasurementStore`]: append-only XML history of hop delays and
  worst links;
* [`WindowStats`] and [`Thresholds`]: window health metrics.

```
use hoptrace_core::{
    AggregationPolicy, FlowId, FlowSnapshot, NodeId, NodePair, PacketId, Probe, ProbeRecord,
    decompose,
};
use std::{collections::BTreeMap, time::Duration};

let flow = FlowId::new(1);
let mut probes: Vec<ProbeRecord> = (0..3).map(|n| ProbeRecord::new(NodeId::new(n))).collect();
for (probe, delay) in probes.iter_mut().zip([0, 5, 12]) {
    probe
        .record_observation(flow, PacketId::ZERO, 210, Duration::from_millis(delay))
        .unwrap();
}

let snapshots = BTreeMap::from([(
    flow,
    FlowSnapshot { tx_packets: 1, rx_packets: 1, ..FlowSnapshot::default() },
)]);
let probes: Vec<&dyn Probe> = probes.iter().map(|p| p as &dyn Probe).collect();
let hops = decompose(&probes, &snapshots, AggregationPolicy::Overwrite);

let worst = NodePair::new((NodeId::new(1), NodeId::new(2)));
assert_eq!(hops.worst(), Some((worst, Duration::from_millis(7))));
```
*/

pub mod decompose;
pub mod defaults;
pub mod flow;
pub mod measure;
pub mod node;
pub mod pair;
pub mod probe;
pub mod stats;
pub mod store;
pub mod time;

pub use self::{
    decompose::{AggregationPolicy, HopDelays, decompose, localize_worst_link},
    flow::{FiveTuple, FlowId, FlowSnapshot, Protocol},
    measure::Throughput,
    node::NodeId,
    pair::NodePair,
    probe::{DuplicateObservation, ObservesPerPacketDelay, PacketId, PacketStats, Probe, ProbeRecord},
    stats::{FlowMetrics, Thresholds, WindowStats},
    store::{MeasurementStore, PairDelaySample, PairSeries, StoreError, WorstLinkRecord},
};
