use crate::measure::Throughput;
use std::time::Duration;

/// Default measurement cadence while the network is healthy
///
/// ```
/// # use hoptrace_core::defaults::*;
/// assert_eq!(DEFAULT_HEALTHY_CADENCE.as_millis(), 100);
/// ```
pub const DEFAULT_HEALTHY_CADENCE: Duration = Duration::from_millis(100);

/// Default measurement cadence while the network is degraded
///
/// Equal to the healthy cadence by default, set it shorter to look
/// closer at a degraded network.
pub const DEFAULT_DEGRADED_CADENCE: Duration = Duration::from_millis(100);

/// Default per-flow throughput threshold
///
/// A flow receiving less than this is reported as surpassing its
/// threshold.
///
/// ```
/// # use hoptrace_core::defaults::*;
/// assert_eq!(DEFAULT_FLOW_THROUGHPUT_THRESHOLD.to_string(), "0.06mbps");
/// ```
pub const DEFAULT_FLOW_THROUGHPUT_THRESHOLD: Throughput = Throughput::from_bps(60_000.0);

/// Default per-flow mean delay threshold
pub const DEFAULT_FLOW_MEAN_DELAY_THRESHOLD: Duration = Duration::from_micros(1_004_400);

/// Default threshold on the mean throughput of all the flows of a window
///
/// Below it the window is degraded.
pub const DEFAULT_MEAN_THROUGHPUT_THRESHOLD: Throughput = Throughput::from_bps(55_000.0);

/// Default threshold on the mean delay of all the flows of a window
///
/// Above it the window is degraded.
pub const DEFAULT_MEAN_DELAY_THRESHOLD: Duration = Duration::from_micros(4_190);
