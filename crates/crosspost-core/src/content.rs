//! Content items and per-channel publication state.
//!
//! The wire shape follows the external store: the aggregate status lives in
//! `status`, the channel map in `social_platforms` (an object, or a JSON
//! string holding one), and channel entries use camelCase keys.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

/// Error recorded on a channel when the gateway reports failure without a reason.
pub const UNSPECIFIED_PUBLISH_ERROR: &str = "publish failed without an error message";

/// Identifier of a content item in the external store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Name of a publication channel, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    /// Parse a channel name. Surrounding whitespace is trimmed and case folded.
    pub fn parse(name: &str) -> Result<Self> {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(Error::ParseError("channel name cannot be empty".into()));
        }
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChannelName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ChannelName> for String {
    fn from(name: ChannelName) -> Self {
        name.0
    }
}

/// Key of a publication lease.
pub type LeaseKey = (ContentId, ChannelName);

/// Derived status of a whole content item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AggregateStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

/// Publication status of one channel.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Pending,
    Scheduled,
    Published,
    #[strum(to_string = "failed", serialize = "error")]
    Failed,
}

impl ChannelStatus {
    /// Parse a stored status. `error` reads as failed; anything unrecognized
    /// is still waiting for work and reads as pending.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        raw.trim()
            .to_lowercase()
            .parse()
            .unwrap_or(Self::Pending)
    }

    /// Pending and scheduled channels still need a publish attempt.
    #[must_use]
    pub const fn is_waiting(self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled)
    }
}

impl<'de> Deserialize<'de> for ChannelStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map_or(Self::Pending, Self::parse_lenient))
    }
}

const fn default_selected() -> bool {
    true
}

/// Publication state of a content item on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    /// Operator intends to publish here. An unset flag counts as selected.
    #[serde(default = "default_selected")]
    pub selected: bool,
    #[serde(default)]
    pub status: ChannelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Overrides the content item's due time for this channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            selected: true,
            status: ChannelStatus::Pending,
            post_url: None,
            post_id: None,
            error: None,
            published_at: None,
            scheduled_at: None,
        }
    }
}

impl ChannelState {
    /// A selected channel waiting for its first attempt.
    #[must_use]
    pub fn selected_pending() -> Self {
        Self::default()
    }

    /// Set the status, keeping everything else.
    #[must_use]
    pub fn with_status(mut self, status: ChannelStatus) -> Self {
        self.status = status;
        self
    }

    /// True when the external network handed back a URL or post id.
    #[must_use]
    pub const fn has_publication_evidence(&self) -> bool {
        self.post_url.is_some() || self.post_id.is_some()
    }

    /// Marked published, but nothing proves the post exists.
    #[must_use]
    pub const fn is_falsely_published(&self) -> bool {
        matches!(self.status, ChannelStatus::Published) && !self.has_publication_evidence()
    }

    /// Record a gateway outcome. Never touches `selected` or `scheduled_at`.
    pub fn apply_outcome(&mut self, outcome: &PublishOutcome, now: DateTime<Utc>) {
        let was_published = self.status == ChannelStatus::Published;
        self.status = outcome.status;

        if outcome.post_url.is_some() {
            self.post_url.clone_from(&outcome.post_url);
        }
        if outcome.post_id.is_some() {
            self.post_id.clone_from(&outcome.post_id);
        }

        match outcome.status {
            ChannelStatus::Published => {
                self.error = None;
                if !was_published || self.published_at.is_none() {
                    self.published_at = Some(now);
                }
            }
            ChannelStatus::Failed => {
                self.error = Some(
                    outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| UNSPECIFIED_PUBLISH_ERROR.to_string()),
                );
            }
            ChannelStatus::Pending | ChannelStatus::Scheduled => {
                self.error.clone_from(&outcome.error);
            }
        }
    }

    /// Put a channel back in line for another attempt. Selection and any
    /// post reference are kept.
    pub fn reset_for_retry(&mut self) {
        self.status = ChannelStatus::Pending;
        self.error = None;
        self.published_at = None;
    }
}

/// Result of one publish attempt as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub status: ChannelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishOutcome {
    #[must_use]
    pub fn published(post_url: impl Into<String>) -> Self {
        Self {
            status: ChannelStatus::Published,
            post_url: Some(post_url.into()),
            post_id: None,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ChannelStatus::Failed,
            post_url: None,
            post_id: None,
            error: Some(error.into()),
        }
    }
}

/// Per-channel states keyed by channel name.
pub type ChannelStates = BTreeMap<ChannelName, ChannelState>;

/// A content item as the core sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    #[serde(rename = "status")]
    pub aggregate_status: AggregateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "social_platforms",
        alias = "channel_states",
        default,
        deserialize_with = "deserialize_channel_states"
    )]
    pub channel_states: ChannelStates,
}

impl ContentItem {
    #[must_use]
    pub fn new(id: impl Into<String>, aggregate_status: AggregateStatus) -> Self {
        Self {
            id: ContentId::new(id),
            aggregate_status,
            scheduled_at: None,
            published_at: None,
            channel_states: ChannelStates::new(),
        }
    }

    /// Builder-style channel insertion. Invalid names are ignored.
    #[must_use]
    pub fn with_channel(mut self, name: &str, state: ChannelState) -> Self {
        if let Ok(channel) = ChannelName::parse(name) {
            self.channel_states.insert(channel, state);
        }
        self
    }

    #[must_use]
    pub const fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Channel state by name. Absent channels are treated as not selected.
    #[must_use]
    pub fn channel(&self, channel: &ChannelName) -> Option<&ChannelState> {
        self.channel_states.get(channel)
    }

    /// Selected channels only.
    pub fn selected_channels(&self) -> impl Iterator<Item = (&ChannelName, &ChannelState)> {
        self.channel_states.iter().filter(|(_, state)| state.selected)
    }

    /// When a channel becomes due: its own time, else the item's. `None` means now.
    #[must_use]
    pub fn due_at(&self, channel: &ChannelName) -> Option<DateTime<Utc>> {
        self.channel(channel)
            .and_then(|state| state.scheduled_at)
            .or(self.scheduled_at)
    }

    #[must_use]
    pub fn is_channel_due(&self, channel: &ChannelName, now: DateTime<Utc>) -> bool {
        self.due_at(channel).map_or(true, |due| due <= now)
    }

    /// The item is scheduled for a time that has not come yet.
    #[must_use]
    pub fn is_scheduled_for_future(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_some_and(|at| at > now)
    }
}

/// Fields the core writes back to the store. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentPatch {
    #[serde(rename = "status", skip_serializing_if = "Option::is_none")]
    pub aggregate_status: Option<AggregateStatus>,
    #[serde(rename = "social_platforms", skip_serializing_if = "Option::is_none")]
    pub channel_states: Option<ChannelStates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl ContentPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.aggregate_status.is_none()
            && self.channel_states.is_none()
            && self.published_at.is_none()
    }

    /// Apply the patch to an in-memory copy of the item.
    pub fn apply_to(&self, item: &mut ContentItem) {
        if let Some(status) = self.aggregate_status {
            item.aggregate_status = status;
        }
        if let Some(states) = &self.channel_states {
            item.channel_states.clone_from(states);
        }
        if self.published_at.is_some() {
            item.published_at = self.published_at;
        }
    }
}

/// Parse a channel map delivered as an object, a JSON string, or null.
pub fn parse_channel_states(value: Value) -> Result<ChannelStates> {
    let value = match value {
        Value::Null => return Ok(ChannelStates::new()),
        Value::String(raw) if raw.trim().is_empty() => return Ok(ChannelStates::new()),
        Value::String(raw) => serde_json::from_str(&raw)?,
        other => other,
    };

    let entries: BTreeMap<String, Option<ChannelState>> = serde_json::from_value(value)?;
    entries
        .into_iter()
        .map(|(name, state)| Ok((ChannelName::parse(&name)?, state.unwrap_or_default())))
        .collect()
}

fn deserialize_channel_states<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<ChannelStates, D::Error> {
    let value = Value::deserialize(deserializer)?;
    parse_channel_states(value).map_err(serde::de::Error::custom)
}
