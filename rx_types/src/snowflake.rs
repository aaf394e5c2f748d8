use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// Milliseconds between the Unix epoch and the first second of 2015
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Unique 64-bit identifier used for every resource on the platform
///
/// The API transports snowflakes as JSON strings; numbers are accepted on input
/// for robustness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(pub u64);

impl Snowflake {
    #[inline(always)]
    pub const fn new(id: u64) -> Self {
        Snowflake(id)
    }

    #[inline(always)]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Creation time in milliseconds since the Unix epoch
    #[inline(always)]
    pub const fn timestamp_ms(self) -> u64 {
        (self.0 >> 22) + DISCORD_EPOCH_MS
    }

    #[inline(always)]
    pub const fn worker_id(self) -> u8 {
        ((self.0 & 0x3E0000) >> 17) as u8
    }

    #[inline(always)]
    pub const fn process_id(self) -> u8 {
        ((self.0 & 0x1F000) >> 12) as u8
    }

    #[inline(always)]
    pub const fn increment(self) -> u16 {
        (self.0 & 0xFFF) as u16
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Snowflake)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Snowflake(id)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(id) => Ok(Snowflake(id)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
