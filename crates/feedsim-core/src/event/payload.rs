//! Typed payloads, one per event kind.
//!
//! Payloads are stored as canonical JSON under the `payload` column and
//! decoded back through [`EventPayload::decode_for`], driven by the stored
//! `kind` column. A kind/payload mismatch is a fatal
//! [`StoreError::PayloadMismatch`] rather than a skip.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::canonical::canonicalize_json;
use super::kinds::EventKind;
use crate::error::StoreError;
use crate::rank::Algorithm;

/// The six agent action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Post,
    Comment,
    Like,
    Unlike,
    Follow,
    Unfollow,
}

impl ActionType {
    /// Snake_case string form, matching the on-disk encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Like => "like",
            Self::Unlike => "unlike",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
        }
    }

    /// Whether this action must be tied to a prior timeline exposure.
    #[must_use]
    pub const fn requires_exposure(self) -> bool {
        matches!(self, Self::Comment | Self::Like | Self::Unlike)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of action admission, recorded on the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Accepted,
    Rejected,
}

impl ActionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of admission rejection reasons.
///
/// Rejections are outcomes, not errors: every one of these is recorded in
/// the log as a rejected `action` event so replay reproduces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Required field missing or forbidden field present.
    Malformed,
    /// The exposure tie failed: timeline missing, owned by another user,
    /// or target post not at the stated position.
    OffFeed,
    /// `like` on a post the actor already voted on.
    DuplicateVote,
    /// `unlike` without a prior vote.
    NoSuchVote,
    /// `follow` targeting the actor itself.
    SelfFollow,
    /// `follow` over an existing edge.
    DuplicateFollow,
    /// `unfollow` of an edge that does not exist.
    NoSuchFollow,
    /// `comment` with an empty body.
    EmptyBody,
}

impl RejectReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::OffFeed => "off_feed",
            Self::DuplicateVote => "duplicate_vote",
            Self::NoSuchVote => "no_such_vote",
            Self::SelfFollow => "self_follow",
            Self::DuplicateFollow => "duplicate_follow",
            Self::NoSuchFollow => "no_such_follow",
            Self::EmptyBody => "empty_body",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw ranking inputs recorded per served item.
///
/// `up_votes` and `age` allow exact score re-derivation without trusting
/// the stored float; `ranking_version` segregates mixed logs after a
/// scoring change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemFeatures {
    pub score: f64,
    pub up_votes: i64,
    pub age: i64,
    pub algorithm: Algorithm,
    pub ranking_version: u32,
}

/// A single entry of a served timeline. `position` is 0-based and equals
/// the item's index in the `items` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub post_id: String,
    pub position: i64,
    pub score: f64,
    pub features: ItemFeatures,
}

/// Payload of `run_started`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStartedData {
    pub run_id: String,
    pub started_tick: i64,
}

/// Payload of `run_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfigData {
    pub run_id: String,
    pub seed: i64,
    pub agents: i64,
    pub ranking_algorithm: Algorithm,
    pub k: i64,
    pub ticks: i64,
}

/// Payload of `advance_tick`. `new_tick` must equal the current tick + 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceTickData {
    pub new_tick: i64,
}

/// Payload of `timeline_served`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineServedData {
    pub timeline_id: String,
    pub user_id: String,
    pub k: i64,
    pub algorithm: Algorithm,
    pub ranking_version: u32,
    pub seed: i64,
    pub items: Vec<TimelineItem>,
}

/// Payload of `action` events, accepted and rejected alike.
///
/// Optional fields are omitted from the canonical encoding when absent so
/// every action type has a stable byte representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionData {
    pub op_id: String,
    pub actor_id: String,
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

/// Tagged union over all payload shapes. The tag lives in the `kind`
/// column, not inside the JSON, so decoding is kind-driven.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    RunStarted(RunStartedData),
    RunConfig(RunConfigData),
    AdvanceTick(AdvanceTickData),
    TimelineServed(TimelineServedData),
    Action(ActionData),
}

impl EventPayload {
    /// The event kind this payload belongs to.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::RunStarted(_) => EventKind::RunStarted,
            Self::RunConfig(_) => EventKind::RunConfig,
            Self::AdvanceTick(_) => EventKind::AdvanceTick,
            Self::TimelineServed(_) => EventKind::TimelineServed,
            Self::Action(_) => EventKind::Action,
        }
    }

    /// The idempotency key, present on action payloads only.
    #[must_use]
    pub fn op_id(&self) -> Option<&str> {
        match self {
            Self::Action(data) => Some(&data.op_id),
            _ => None,
        }
    }

    /// Encode as canonical JSON (sorted keys, compact).
    ///
    /// # Errors
    ///
    /// Returns an error if serde serialization fails (non-finite floats).
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        let value = match self {
            Self::RunStarted(d) => serde_json::to_value(d)?,
            Self::RunConfig(d) => serde_json::to_value(d)?,
            Self::AdvanceTick(d) => serde_json::to_value(d)?,
            Self::TimelineServed(d) => serde_json::to_value(d)?,
            Self::Action(d) => serde_json::to_value(d)?,
        };
        Ok(canonicalize_json(&value))
    }

    /// Decode a stored payload, driven by the stored kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Json`] if the JSON does not match the kind's
    /// payload shape.
    pub fn decode_for(kind: EventKind, json: &str) -> Result<Self, StoreError> {
        Ok(match kind {
            EventKind::RunStarted => Self::RunStarted(serde_json::from_str(json)?),
            EventKind::RunConfig => Self::RunConfig(serde_json::from_str(json)?),
            EventKind::AdvanceTick => Self::AdvanceTick(serde_json::from_str(json)?),
            EventKind::TimelineServed => Self::TimelineServed(serde_json::from_str(json)?),
            EventKind::Action => Self::Action(serde_json::from_str(json)?),
        })
    }
}
