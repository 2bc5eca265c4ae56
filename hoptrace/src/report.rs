//! Per-cycle reports: a human readable log and a tab separated table.

use crate::{CycleIssue, FlowClassifier, Health};
use hoptrace_core::{
    FlowId, FlowSnapshot, Thresholds, WindowStats, WorstLinkRecord, time::as_millis_f64,
};
use std::{
    collections::BTreeMap,
    fmt,
    fs::OpenOptions,
    io::Write as _,
    path::Path,
    time::Duration,
};

/// Human readable report of one cycle.
pub(crate) struct Report<'a> {
    pub now: Duration,
    pub cadence: Duration,
    pub snapshots: &'a BTreeMap<FlowId, FlowSnapshot>,
    pub stats: &'a WindowStats,
    pub thresholds: &'a Thresholds,
    pub health: Health,
    pub worst_link: Option<&'a WorstLinkRecord>,
    pub classifier: &'a dyn FlowClassifier,
}

/// One row of the statistics table: the time, then throughput (Mbps),
/// mean delay and mean jitter (ms) of every known flow, then the window
/// mean delay, mean throughput and mean jitter.
///
/// Flows without traffic get zeros so the columns stay aligned from one
/// cycle to the next.
pub(crate) struct StatsRow<'a> {
    pub now: Duration,
    pub snapshots: &'a BTreeMap<FlowId, FlowSnapshot>,
    pub stats: &'a WindowStats,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Report flow stats at {:.3}s, current measuring time {:?}",
            self.now.as_secs_f64(),
            self.cadence
        )?;

        for (flow, metrics) in self.stats.flows() {
            let snapshot = self.snapshots.get(flow).copied().unwrap_or_default();

            match self.classifier.five_tuple(*flow) {
                Some(tuple) => writeln!(f, "\tFlow {flow} ({tuple}) proto {}", tuple.protocol)?,
                None => writeln!(f, "\tFlow {flow} (unclassified)")?,
            }
            writeln!(f, "\t\tTx Packets: {}", snapshot.tx_packets)?;
            writeln!(f, "\t\tTx Bytes:   {}", snapshot.tx_bytes)?;
            writeln!(f, "\t\tTxOffered:  {:.6} Mbps", metrics.offered_load.as_mbps())?;
            writeln!(f, "\t\tRx Packets: {}", snapshot.rx_packets)?;
            writeln!(f, "\t\tRx Bytes:   {}", snapshot.rx_bytes)?;
            writeln!(f, "\t\tLost Packets: {}", snapshot.lost_packets)?;
            writeln!(f, "\t\tThroughput: {:.6} Mbps", metrics.throughput.as_mbps())?;
            writeln!(f, "\t\tMean delay: {:.3}ms", as_millis_f64(metrics.mean_delay))?;
            writeln!(
                f,
                "\t\tLast packet delay: {:.3}ms",
                as_millis_f64(metrics.last_delay)
            )?;
            writeln!(f, "\t\tMean jitter: {:.3}ms", as_millis_f64(metrics.mean_jitter))?;

            if self.thresholds.flow_surpassed(metrics) {
                writeln!(f, "\tFlow {flow} surpassing threshold")?;
            } else {
                writeln!(f, "\tFlow {flow} under threshold")?;
            }
        }

        writeln!(
            f,
            "\tMean flow throughput: {:.6} Mbps",
            self.stats.mean_throughput.as_mbps()
        )?;
        writeln!(f, "\tMean flow delay: {:.3}ms", as_millis_f64(self.stats.mean_delay))?;
        writeln!(
            f,
            "\tMedian flow delay: {:.3}ms",
            as_millis_f64(self.stats.median_delay)
        )?;
        writeln!(
            f,
            "\tMean flow jitter: {:.3}ms",
            as_millis_f64(self.stats.mean_jitter)
        )?;

        match self.health {
            Health::Degraded => writeln!(f, "\tavg. surpassing threshold")?,
            _ => writeln!(f, "\tavg. under threshold")?,
        }

        match self.worst_link {
            Some(record) => writeln!(
                f,
                "\tWorst performing link: {} {:.3}ms",
                record.pair,
                as_millis_f64(record.delay)
            )?,
            None => writeln!(f, "\tWorst performing link: none")?,
        }

        writeln!(f)
    }
}

impl fmt::Display for StatsRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.now.as_secs_f64())?;

        for flow in self.snapshots.keys() {
            match self.stats.flow(*flow) {
                Some(metrics) => write!(
                    f,
                    "\t{:.6}\t{:.3}\t{:.3}",
                    metrics.throughput.as_mbps(),
                    as_millis_f64(metrics.mean_delay),
                    as_millis_f64(metrics.mean_jitter)
                )?,
                None => write!(f, "\t0\t0\t0")?,
            }
        }

        writeln!(
            f,
            "\t{:.3}\t{:.6}\t{:.3}",
            as_millis_f64(self.stats.mean_delay),
            self.stats.mean_throughput.as_mbps(),
            as_millis_f64(self.stats.mean_jitter)
        )
    }
}

/// Append `content` to the file at `path`, creating it if needed.
///
/// The file is truncated first if `truncate` is set.
pub(crate) fn append(
    path: &Path,
    truncate: bool,
    content: impl fmt::Display,
) -> Result<(), CycleIssue> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }

    let mut file = options
        .open(path)
        .map_err(|source| CycleIssue::OutputOpenFailure {
            path: path.to_path_buf(),
            source,
        })?;

    write!(file, "{content}")
        .and_then(|()| file.flush())
        .map_err(|source| CycleIssue::OutputWriteFailure {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoptrace_core::{FiveTuple, NodeId, NodePair, Protocol};
    use std::net::{IpAddr, Ipv4Addr};

    struct OneFlow;

    impl FlowClassifier for OneFlow {
        fn five_tuple(&self, flow: FlowId) -> Option<FiveTuple> {
            (flow == FlowId::new(1)).then_some(FiveTuple {
                source_address: IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1)),
                source_port: 49153,
                destination_address: IpAddr::V4(Ipv4Addr::new(10, 1, 3, 2)),
                destination_port: 9,
                protocol: Protocol::Udp,
            })
        }
    }

    fn snapshots() -> BTreeMap<FlowId, FlowSnapshot> {
        BTreeMap::from([
            (
                FlowId::new(1),
                FlowSnapshot {
                    tx_packets: 10,
                    tx_bytes: 12_500,
                    rx_packets: 10,
                    rx_bytes: 12_500,
                    delay_sum: Duration::from_millis(100),
                    last_delay: Duration::from_millis(10),
                    ..FlowSnapshot::default()
                },
            ),
            (
                FlowId::new(2),
                FlowSnapshot {
                    tx_packets: 4,
                    tx_bytes: 400,
                    lost_packets: 4,
                    ..FlowSnapshot::default()
                },
            ),
            (FlowId::new(3), FlowSnapshot::default()),
        ])
    }

    #[test]
    fn report() {
        let snapshots = snapshots();
        let stats = WindowStats::compute(&snapshots, Duration::from_secs(1));
        let worst = WorstLinkRecord {
            pair: NodePair::new((NodeId::new(2), NodeId::new(1))),
            delay: Duration::from_millis(7),
            timestamp: Duration::from_secs(1),
        };

        let report = Report {
            now: Duration::from_secs(1),
            cadence: Duration::from_millis(100),
            snapshots: &snapshots,
            stats: &stats,
            thresholds: &Thresholds::default(),
            health: Health::Degraded,
            worst_link: Some(&worst),
            classifier: &OneFlow,
        }
        .to_string();

        assert!(report.starts_with("Report flow stats at 1.000s, current measuring time 100ms\n"));
        assert!(report.contains("\tFlow 1 (10.1.1.1:49153 -> 10.1.3.2:9) proto UDP\n"));
        assert!(report.contains("\t\tThroughput: 0.100000 Mbps\n"));
        assert!(report.contains("\t\tMean delay: 10.000ms\n"));
        assert!(report.contains("\tFlow 1 under threshold\n"));
        assert!(report.contains("\tFlow 2 (unclassified)\n"));
        assert!(report.contains("\t\tLost Packets: 4\n"));
        assert!(report.contains("\tFlow 2 surpassing threshold\n"));
        assert!(!report.contains("Flow 3"));
        assert!(report.contains("\tMean flow throughput: 0.050000 Mbps\n"));
        assert!(report.contains("\tavg. surpassing threshold\n"));
        assert!(report.contains("\tWorst performing link: (1,2) 7.000ms\n"));
    }

    #[test]
    fn stats_row() {
        let snapshots = snapshots();
        let stats = WindowStats::compute(&snapshots, Duration::from_secs(1));

        let row = StatsRow {
            now: Duration::from_millis(1500),
            snapshots: &snapshots,
            stats: &stats,
        }
        .to_string();

        assert_eq!(
            row,
            "1.500000\t0.100000\t10.000\t0.000\t0.000000\t0.000\t0.000\t0\t0\t0\t5.000\t0.050000\t0.000\n"
        );
    }

    #[test]
    fn append_then_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.dat");

        append(&path, false, "one\n").unwrap();
        append(&path, false, "two\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");

        append(&path, true, "three\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "three\n");
    }

    #[test]
    fn append_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("stats.dat");

        let issue = append(&path, false, "one\n").unwrap_err();
        assert!(matches!(issue, CycleIssue::OutputOpenFailure { .. }));
    }
}
