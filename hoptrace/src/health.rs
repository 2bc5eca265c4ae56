use crate::ControllerConfig;
use hoptrace_core::{Thresholds, WindowStats};
use std::{fmt, time::Duration};

/// Health of the monitored network, as of the last completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Health {
    /// no cycle completed yet
    #[default]
    WarmUp,
    Healthy,
    Degraded,
}

impl Health {
    /// Classify a window against the mean thresholds.
    ///
    /// A window without traffic has a zero mean throughput and is
    /// therefore classified [`Degraded`](Self::Degraded) with the default
    /// thresholds.
    pub fn classify(thresholds: &Thresholds, stats: &WindowStats) -> Self {
        if thresholds.window_surpassed(stats) {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    /// Interval until the next cycle when the network is in this state.
    pub fn cadence(self, config: &ControllerConfig) -> Duration {
        match self {
            Self::WarmUp | Self::Healthy => config.healthy_cadence(),
            Self::Degraded => config.degraded_cadence(),
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WarmUp => f.write_str("warm-up"),
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded => f.write_str("degraded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoptrace_core::{FlowId, FlowSnapshot, Throughput};
    use std::collections::BTreeMap;

    fn stats(rx_bytes: u64, delay: Duration) -> WindowStats {
        let snapshots = BTreeMap::from([(
            FlowId::new(1),
            FlowSnapshot {
                tx_packets: 1,
                tx_bytes: rx_bytes,
                rx_packets: 1,
                rx_bytes,
                delay_sum: delay,
                last_delay: delay,
                ..FlowSnapshot::default()
            },
        )]);
        WindowStats::compute(&snapshots, Duration::from_secs(1))
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            mean_throughput: Throughput::from_mbps(0.06),
            mean_delay: Duration::from_millis(10),
            ..Thresholds::default()
        }
    }

    #[test]
    fn healthy() {
        // 0.08 mbps, 2ms
        let stats = stats(10_000, Duration::from_millis(2));
        assert_eq!(Health::classify(&thresholds(), &stats), Health::Healthy);
    }

    #[test]
    fn low_throughput() {
        // 0.05 mbps
        let stats = stats(6_250, Duration::from_millis(2));
        assert_eq!(Health::classify(&thresholds(), &stats), Health::Degraded);
    }

    #[test]
    fn high_delay() {
        let stats = stats(10_000, Duration::from_millis(11));
        assert_eq!(Health::classify(&thresholds(), &stats), Health::Degraded);
    }

    #[test]
    fn empty_window() {
        let stats = WindowStats::default();
        assert_eq!(
            Health::classify(&Thresholds::default(), &stats),
            Health::Degraded
        );
    }

    #[test]
    fn cadence() {
        let config = ControllerConfig::new("run")
            .set_healthy_cadence(Duration::from_millis(200))
            .set_degraded_cadence(Duration::from_millis(50));

        assert_eq!(Health::WarmUp.cadence(&config), Duration::from_millis(200));
        assert_eq!(Health::Healthy.cadence(&config), Duration::from_millis(200));
        assert_eq!(Health::Degraded.cadence(&config), Duration::from_millis(50));
    }
}
