//! Closed event kind tag set.
//!
//! The on-disk `kind` column stores the snake_case string form. Adding a
//! kind is a schema-version bump; the reducer rejects unknown tags rather
//! than skipping them, so a newer log cannot be silently misread.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// The five event kinds in the feedsim log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A simulation run began.
    RunStarted,
    /// Full run configuration, recorded for auditability and replay.
    RunConfig,
    /// The logical clock moved forward by one.
    AdvanceTick,
    /// A ranked timeline was served to a user.
    TimelineServed,
    /// An agent action was admitted (accepted or rejected).
    Action,
}

impl EventKind {
    /// All known kinds in catalog order.
    pub const ALL: [Self; 5] = [
        Self::RunStarted,
        Self::RunConfig,
        Self::AdvanceTick,
        Self::TimelineServed,
        Self::Action,
    ];

    /// Canonical snake_case string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::RunConfig => "run_config",
            Self::AdvanceTick => "advance_tick",
            Self::TimelineServed => "timeline_served",
            Self::Action => "action",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run_started" => Ok(Self::RunStarted),
            "run_config" => Ok(Self::RunConfig),
            "advance_tick" => Ok(Self::AdvanceTick),
            "timeline_served" => Ok(Self::TimelineServed),
            "action" => Ok(Self::Action),
            _ => Err(StoreError::UnknownEventKind(s.to_string())),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
