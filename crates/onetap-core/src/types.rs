use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{OnetapError, OnetapResult};

/// Backend-assigned identifier of a stored envelope.
///
/// Opaque to the client. It only ever appears as the last path segment of
/// a capability link, so it must not contain URL delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> OnetapResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(OnetapError::InvalidLink("empty object id".into()));
        }
        if let Some(c) = id
            .chars()
            .find(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
        {
            return Err(OnetapError::InvalidLink(format!(
                "object id contains forbidden character {c:?}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = OnetapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// Unit half of an expiry value-unit pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryUnit {
    Minutes,
    Hours,
    Days,
}

impl ExpiryUnit {
    fn minutes(self) -> u64 {
        match self {
            ExpiryUnit::Minutes => 1,
            ExpiryUnit::Hours => 60,
            ExpiryUnit::Days => 1440,
        }
    }

    fn suffix(self) -> char {
        match self {
            ExpiryUnit::Minutes => 'm',
            ExpiryUnit::Hours => 'h',
            ExpiryUnit::Days => 'd',
        }
    }
}

impl FromStr for ExpiryUnit {
    type Err = OnetapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "min" | "minute" | "minutes" => Ok(ExpiryUnit::Minutes),
            "h" | "hour" | "hours" => Ok(ExpiryUnit::Hours),
            "d" | "day" | "days" => Ok(ExpiryUnit::Days),
            other => Err(OnetapError::InvalidExpiry(format!("unknown unit {other:?}"))),
        }
    }
}

/// How long the backend keeps an envelope before discarding it unread.
///
/// Expressed as a value-unit pair (`3 days`) and sent to the backend as
/// whole minutes. The value is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Expiry {
    value: u32,
    unit: ExpiryUnit,
}

impl Expiry {
    pub fn new(value: u32, unit: ExpiryUnit) -> OnetapResult<Self> {
        if value == 0 {
            return Err(OnetapError::InvalidExpiry(
                "expiry time cannot be zero or negative".into(),
            ));
        }
        Ok(Self { value, unit })
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn unit(&self) -> ExpiryUnit {
        self.unit
    }

    /// Total lifetime in minutes, the unit the backend accepts.
    pub fn minutes(&self) -> u64 {
        u64::from(self.value) * self.unit.minutes()
    }
}

impl Default for Expiry {
    fn default() -> Self {
        Self {
            value: 1,
            unit: ExpiryUnit::Days,
        }
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

/// Parses coded tokens such as `30m`, `24h`, `7d`, and spelled-out pairs
/// such as `2 hours`.
impl FromStr for Expiry {
    type Err = OnetapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit() && c != '-')
            .ok_or_else(|| OnetapError::InvalidExpiry(format!("missing unit in {s:?}")))?;
        let (num, unit) = s.split_at(split);
        let value: i64 = num
            .parse()
            .map_err(|_| OnetapError::InvalidExpiry(format!("invalid number in {s:?}")))?;
        if value <= 0 {
            return Err(OnetapError::InvalidExpiry(
                "expiry time cannot be zero or negative".into(),
            ));
        }
        let value = u32::try_from(value)
            .map_err(|_| OnetapError::InvalidExpiry(format!("{value} is too large")))?;
        Self::new(value, unit.parse()?)
    }
}

impl TryFrom<String> for Expiry {
    type Error = OnetapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Expiry> for String {
    fn from(e: Expiry) -> Self {
        e.to_string()
    }
}

/// Point-in-time estimate of free backend capacity.
///
/// Stale as soon as it is read: other clients may upload between the read
/// and our own upload. The backend remains the authority on capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub available_bytes: u64,
}

impl QuotaSnapshot {
    /// Used when the usage response cannot be read. Assumes no room rather
    /// than unlimited room.
    pub const CONSERVATIVE: QuotaSnapshot = QuotaSnapshot { available_bytes: 0 };
}
