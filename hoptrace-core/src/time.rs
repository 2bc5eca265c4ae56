//! Human readable durations, used for cadences and window lengths.
//!
//! ```
//! # use hoptrace_core::time::Duration;
//! let cadence: Duration = "1s 500ms".parse().unwrap();
//! assert_eq!(cadence.into_duration().as_millis(), 1_500);
//! ```

use core::fmt;
use logos::{Lexer, Logos};
use std::{num::ParseIntError, str::FromStr, time};
use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(time::Duration);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("Failed to parse `{input}'")]
    InvalidToken { input: String },
    #[error("Expecting duration to start with a number. Cannot parse `{input}'")]
    ExpectingNumber { input: String },
    #[error("Expecting a measure (ns, us, ms, s, m), failed to parse `{input}'")]
    ExpectingMeasure { input: String },
    #[error("Invalid number: {0}")]
    Number(#[from] ParseIntError),
    #[error("Duration `{input}' is too long")]
    Overflow { input: String },
    #[error("Empty duration")]
    Empty,
}

impl Duration {
    pub const fn new(dur: time::Duration) -> Self {
        Self(dur)
    }

    #[inline]
    pub fn into_duration(self) -> time::Duration {
        self.0
    }
}

impl From<time::Duration> for Duration {
    fn from(value: time::Duration) -> Self {
        Self(value)
    }
}

impl From<Duration> for time::Duration {
    fn from(value: Duration) -> Self {
        value.0
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <time::Duration as fmt::Debug>::fmt(&self.0, f)
    }
}

impl FromStr for Duration {
    type Err = DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::new(s);

        let overflow = || DurationParseError::Overflow {
            input: s.to_owned(),
        };
        let mut total: Option<time::Duration> = None;

        while let Some(next) = lex.next() {
            let number: Token = next.map_err(|()| DurationParseError::InvalidToken {
                input: s.to_owned(),
            })?;

            if number != Token::Value {
                return Err(DurationParseError::ExpectingNumber {
                    input: s.to_owned(),
                });
            }
            let number: u64 = lex.slice().parse()?;

            let Some(Ok(measure)) = lex.next() else {
                return Err(DurationParseError::ExpectingMeasure {
                    input: s.to_owned(),
                });
            };
            let duration = match measure {
                Token::NanoSeconds => time::Duration::from_nanos(number),
                Token::MicroSeconds => time::Duration::from_micros(number),
                Token::MilliSeconds => time::Duration::from_millis(number),
                Token::Seconds => time::Duration::from_secs(number),
                Token::Minutes => {
                    time::Duration::from_secs(number.checked_mul(60).ok_or_else(overflow)?)
                }
                Token::Value => {
                    return Err(DurationParseError::ExpectingMeasure {
                        input: s.to_owned(),
                    });
                }
            };
            total = Some(match total {
                None => duration,
                Some(total) => total.checked_add(duration).ok_or_else(overflow)?,
            });
        }

        total.map(Self).ok_or(DurationParseError::Empty)
    }
}

/// Express a duration in milliseconds, the unit used by the reports.
#[inline]
pub fn as_millis_f64(duration: time::Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|μs|µs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,

    #[regex("[0-9]+")]
    Value,
}
