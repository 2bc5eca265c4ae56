//! On-disk shape of the measurement store.
//!
//! ```xml
//! <network-measurements>
//!   <worst-links>
//!     <worst-link>
//!       <delay-value>7000000</delay-value>
//!       <timestamp>100000000</timestamp>
//!       <node-pair><node-id>1</node-id><node-id>2</node-id></node-pair>
//!     </worst-link>
//!   </worst-links>
//!   <delays>
//!     <delay>
//!       <node-pair><node-id>0</node-id><node-id>1</node-id></node-pair>
//!       <measurements>
//!         <measurement>
//!           <delay-value>5000000</delay-value>
//!           <timestamp>100000000</timestamp>
//!         </measurement>
//!       </measurements>
//!     </delay>
//!   </delays>
//! </network-measurements>
//! ```
//!
//! Delay values and timestamps are nanoseconds.

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "network-measurements")]
pub(super) struct Document {
    #[serde(rename = "worst-links", default)]
    pub worst_links: WorstLinks,
    #[serde(default)]
    pub delays: Delays,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct WorstLinks {
    #[serde(rename = "worst-link", default)]
    pub entries: Vec<WorstLinkEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct WorstLinkEntry {
    #[serde(rename = "delay-value")]
    pub delay_value: u64,
    pub timestamp: u64,
    #[serde(rename = "node-pair")]
    pub node_pair: NodePairEntry,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct Delays {
    #[serde(rename = "delay", default)]
    pub entries: Vec<DelayEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct DelayEntry {
    #[serde(rename = "node-pair")]
    pub node_pair: NodePairEntry,
    #[serde(default)]
    pub measurements: Measurements,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct Measurements {
    #[serde(rename = "measurement", default)]
    pub entries: Vec<MeasurementEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct MeasurementEntry {
    #[serde(rename = "delay-value")]
    pub delay_value: u64,
    pub timestamp: u64,
}

/// Node ids as written, in stored order.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct NodePairEntry {
    #[serde(rename = "node-id", default)]
    pub node_ids: Vec<u32>,
}
