use logos::{Lexer, Logos};
use std::{fmt, num::ParseFloatError, str::FromStr, time::Duration};
use thiserror::Error;

const K: f64 = 1_000.0;
const M: f64 = 1_000_000.0;
const G: f64 = 1_000_000_000.0;

/// The [`Throughput`] of a flow, in bits per second.
///
/// Throughputs are measured over a window: the number of bytes
/// received divided by the window length. Unlike link bandwidths the
/// reporting units are decimal (`1mbps` is `1_000_000` bits per second)
/// and fractional values are meaningful, the default thresholds being
/// below `0.1mbps`.
///
/// ```
/// # use hoptrace_core::measure::Throughput;
/// # use std::time::Duration;
/// // 12_500 bytes in 1 second
/// let throughput = Throughput::from_bytes(12_500, Duration::from_secs(1));
/// assert_eq!(throughput.as_mbps(), 0.1);
/// assert_eq!(throughput, "100kbps".parse().unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Throughput(f64);

#[derive(Debug, Error, PartialEq)]
pub enum ThroughputParseError {
    #[error("Expecting to parse a number")]
    ExpectingNumber,
    #[error("Expecting to parse a unit (bps, kbps, mbps, gbps)")]
    ExpectingUnit,
    #[error("Not expecting any other tokens to parse a throughput")]
    TrailingTokens,
    #[error("Invalid number: {0}")]
    Number(#[from] ParseFloatError),
}

impl Throughput {
    pub const ZERO: Self = Self(0.0);

    pub const fn from_bps(bits_per_second: f64) -> Self {
        Self(bits_per_second)
    }

    pub fn from_mbps(mbps: f64) -> Self {
        Self(mbps * M)
    }

    /// compute the throughput of `bytes` transferred during `window`
    ///
    /// A zero length window yields [`Throughput::ZERO`].
    pub fn from_bytes(bytes: u64, window: Duration) -> Self {
        let seconds = window.as_secs_f64();
        if seconds == 0.0 {
            Self::ZERO
        } else {
            Self(bytes as f64 * 8.0 / seconds)
        }
    }

    #[inline]
    pub fn as_bps(&self) -> f64 {
        self.0
    }

    #[inline]
    pub fn as_mbps(&self) -> f64 {
        self.0 / M
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mbps", self.as_mbps())
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum ThroughputToken {
    #[token("bps")]
    Bps,
    #[token("kbps")]
    Kbps,
    #[token("mbps")]
    Mbps,
    #[token("gbps")]
    Gbps,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Value,
}

impl FromStr for Throughput {
    type Err = ThroughputParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, ThroughputToken>::new(s);

        let Some(Ok(ThroughputToken::Value)) = lex.next() else {
            return Err(ThroughputParseError::ExpectingNumber);
        };
        let number: f64 = lex.slice().parse()?;
        let Some(Ok(token)) = lex.next() else {
            return Err(ThroughputParseError::ExpectingUnit);
        };
        let bps = match token {
            ThroughputToken::Bps => number,
            ThroughputToken::Kbps => number * K,
            ThroughputToken::Mbps => number * M,
            ThroughputToken::Gbps => number * G,
            ThroughputToken::Value => return Err(ThroughputParseError::ExpectingUnit),
        };

        if lex.next().is_some() {
            return Err(ThroughputParseError::TrailingTokens);
        }

        Ok(Self(bps))
    }
}
