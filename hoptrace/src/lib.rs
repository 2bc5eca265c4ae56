/*!
# Adaptive hop-delay monitoring

Drives the [`hoptrace_core`] engine over a monitored network: at every
cycle the [`Controller`] reads the window aggregates from a
[`Substrate`], classifies the health of the network against its
[`Thresholds`], localizes the worst performing link, writes its reports
and schedules the next cycle according to the health it just measured.

```
use hoptrace::{Controller, ControllerConfig, Health, MemorySubstrate};
use hoptrace_core::{FlowId, NodeId, PacketId};
use std::time::Duration;

let dir = tempfile::tempdir().unwrap();
let mut substrate = MemorySubstrate::new();
for node in 0..3 {
    substrate.add_probe(NodeId::new(node));
}

let config = ControllerConfig::new(dir.path().join("line"))
    .set_mean_delay_threshold(Duration::from_millis(20));
let mut controller = Controller::new(config, substrate).unwrap();

let path = [
    (NodeId::new(0), Duration::ZERO),
    (NodeId::new(1), Duration::from_millis(5)),
    (NodeId::new(2), Duration::from_millis(12)),
];
for packet in 0..10 {
    controller
        .substrate_mut()
        .deliver(FlowId::new(1), PacketId::new(packet), 1_250, &path)
        .unwrap();
}

let outcome = controller.run_cycle(Duration::from_secs(1));
assert_eq!(outcome.health, Health::Healthy);
assert_eq!(outcome.worst_link.unwrap().delay, Duration::from_millis(7));
```
*/

mod config;
mod controller;
mod health;
mod report;
mod substrate;

// convenient re-export of `hoptrace_core` core objects
pub use hoptrace_core::{
    AggregationPolicy, FiveTuple, FlowId, FlowSnapshot, MeasurementStore, NodeId, NodePair,
    PacketId, Probe, ProbeRecord, Protocol, Thresholds, Throughput, WindowStats, WorstLinkRecord,
};

pub use self::{
    config::ControllerConfig,
    controller::{Controller, CycleIssue, CycleOutcome},
    health::Health,
    substrate::{FlowAggregateProvider, FlowClassifier, MemorySubstrate, ProbeCollection, Substrate},
};
