#![forbid(unsafe_code)]

//! Serde helpers for human readable durations (`"1s"`, `"250ms"`, `"2m 30s"`).
//!
//! Integers are accepted as whole seconds so that values coming from
//! environment variables (`REDIS_AGENT__READINESS__BACKOFF=2`) keep working.
//!
//! # Example
//! ```
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Probe {
//!     #[serde(with = "agentkit_utils::humantime_serde")]
//!     backoff: Duration,
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserializer, Serializer, de};

/// Serializes a `Duration` as a humantime string.
///
/// # Errors
/// Returns the serializer's error if the string cannot be written.
pub fn serialize<S>(value: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&humantime::format_duration(*value).to_string())
}

/// Deserializes a `Duration` from a humantime string or an integer number of seconds.
///
/// # Errors
/// Returns a deserialization error if the value is neither.
pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    d.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl de::Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a duration such as \"1s\" or a number of seconds")
    }

    fn visit_str<E>(self, v: &str) -> Result<Duration, E>
    where
        E: de::Error,
    {
        humantime::parse_duration(v).map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Duration, E>
    where
        E: de::Error,
    {
        Ok(Duration::from_secs(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Duration, E>
    where
        E: de::Error,
    {
        u64::try_from(v)
            .map(Duration::from_secs)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }
}
