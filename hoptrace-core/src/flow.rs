//! Flow identity and the per-window flow aggregates consumed by the
//! decomposition engine and the reporting controller.

use crate::measure::Throughput;
use std::{fmt, net::IpAddr, time::Duration};

/// Identifier of a unidirectional flow, as assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FlowId(u32);

impl FlowId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn into_inner(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transport protocol of a flow, as carried in the IP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Other(u8),
}

impl From<u8> for Protocol {
    fn from(value: u8) -> Self {
        match value {
            6 => Self::Tcp,
            17 => Self::Udp,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("TCP"),
            Self::Udp => f.write_str("UDP"),
            Self::Other(number) => number.fmt(f),
        }
    }
}

/// The five-tuple a flow was classified from. Only used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiveTuple {
    pub source_address: IpAddr,
    pub source_port: u16,
    pub destination_address: IpAddr,
    pub destination_port: u16,
    pub protocol: Protocol,
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source_address, self.source_port, self.destination_address, self.destination_port
        )
    }
}

/// Aggregated counters of one flow over the current window.
///
/// Snapshots are produced by the measurement substrate and are never
/// modified here. A snapshot where every counter and every sum is zero
/// is [empty](FlowSnapshot::is_empty): the flow was known but carried no
/// traffic during the window. Empty snapshots are ignored by the window
/// statistics and by the decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowSnapshot {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    /// sum of the end-to-end delays of the received packets
    pub delay_sum: Duration,
    /// sum of the delay variations between consecutive received packets
    pub jitter_sum: Duration,
    /// end-to-end delay of the last received packet
    pub last_delay: Duration,
    pub lost_packets: u64,
    pub times_forwarded: u64,
}

impl FlowSnapshot {
    pub fn is_empty(&self) -> bool {
        self.tx_packets == 0
            && self.tx_bytes == 0
            && self.rx_packets == 0
            && self.rx_bytes == 0
            && self.delay_sum.is_zero()
            && self.jitter_sum.is_zero()
            && self.last_delay.is_zero()
            && self.lost_packets == 0
            && self.times_forwarded == 0
    }

    /// Mean end-to-end delay of the received packets, `None` if nothing
    /// was received.
    pub fn mean_delay(&self) -> Option<Duration> {
        mean(self.delay_sum, self.rx_packets)
    }

    /// Mean jitter of the received packets, `None` if nothing was received.
    pub fn mean_jitter(&self) -> Option<Duration> {
        mean(self.jitter_sum, self.rx_packets)
    }

    /// Received throughput over a window of the given length.
    pub fn throughput(&self, window: Duration) -> Throughput {
        Throughput::from_bytes(self.rx_bytes, window)
    }

    /// Offered load (transmitted bytes) over a window of the given length.
    pub fn offered_load(&self, window: Duration) -> Throughput {
        Throughput::from_bytes(self.tx_bytes, window)
    }
}

fn mean(sum: Duration, count: u64) -> Option<Duration> {
    if count == 0 {
        return None;
    }
    let nanos = sum.as_nanos() / u128::from(count);
    Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
}
