mod throughput;

pub use self::throughput::{Throughput, ThroughputParseError};
