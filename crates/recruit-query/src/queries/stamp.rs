use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Minute precision UTC timestamp rendered as `YYYY-MM-DD HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(String);

impl Stamp {
    pub fn at(moment: DateTime<Utc>) -> Self {
        Self(moment.format(STAMP_FORMAT).to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, chrono::ParseError> {
        let parsed = NaiveDateTime::parse_from_str(raw.trim(), STAMP_FORMAT)?;
        Ok(Self(parsed.format(STAMP_FORMAT).to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Stamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Stamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Stamp::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Optional stamps travel as an empty string when unset.
pub mod optional {
    use serde::{Deserialize as _, Deserializer, Serializer};

    use super::Stamp;

    pub fn serialize<S>(value: &Option<Stamp>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_ref().map(Stamp::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Stamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;

        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => Stamp::parse(value)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
