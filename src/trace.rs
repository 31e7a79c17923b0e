use chrono::{Local, Timelike};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier attached to every log line and envelope of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(i64);

impl TraceId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    /// Random four-digit prefix followed by the local wall clock time.
    pub fn generate() -> Self {
        let random = rand::thread_rng().gen_range(1000..=9999);
        let now = Local::now();
        Self::from_parts(random, now.hour(), now.minute(), now.second())
    }

    /// `random`, then the hour unpadded, then minute and second zero-padded.
    pub fn from_parts(random: u32, hour: u32, minute: u32, second: u32) -> Self {
        let digits = format!("{}{}{:02}{:02}", random, hour, minute, second);
        // at most 4 + 2 + 2 + 2 digits, always fits
        Self(digits.parse().unwrap_or_default())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TraceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TraceId)
    }
}
