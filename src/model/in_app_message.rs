use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::Target;

/// A message shown inside the application when a tracked event matches its trigger.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InAppMessage {
    pub id: i64,
    pub key: i64,
    pub status: InAppMessageStatus,
    pub period: Period,
    pub event_trigger: EventTrigger,
    #[serde(default)]
    pub target_context: TargetContext,
    pub message_context: MessageContext,
    #[serde(default)]
    pub evaluate_context: EvaluateContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InAppMessageStatus {
    Initialized,
    Draft,
    Active,
    Pause,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Period {
    Always,
    Custom {
        start_inclusive: DateTime<Utc>,
        end_exclusive: DateTime<Utc>,
    },
}

impl Period {
    pub fn within(&self, now: DateTime<Utc>) -> bool {
        match self {
            Period::Always => true,
            Period::Custom {
                start_inclusive,
                end_exclusive,
            } => *start_inclusive <= now && now < *end_exclusive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTrigger {
    pub rules: Vec<TriggerRule>,
    #[serde(default)]
    pub frequency_cap: Option<FrequencyCap>,
    #[serde(default)]
    pub delay: DelayPolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRule {
    pub event_key: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// Limits how often a message is shown, based on recorded impressions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyCap {
    #[serde(default)]
    pub identifier_caps: Vec<IdentifierCap>,
    #[serde(default)]
    pub duration_cap: Option<DurationCap>,
}

/// At most `count` impressions per identifier of `identifier_type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierCap {
    pub identifier_type: String,
    pub count: usize,
}

/// At most `count` impressions within the last `duration_millis`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationCap {
    pub duration_millis: i64,
    pub count: usize,
}

/// How long after the triggering event the message is delivered.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum DelayPolicy {
    #[default]
    Immediate,
    After { duration_millis: i64 },
}

impl DelayPolicy {
    /// `None` if the delay overflows the representable time range.
    pub fn deliver_at(&self, started_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            DelayPolicy::Immediate => Some(started_at),
            DelayPolicy::After { duration_millis } => Duration::try_milliseconds(*duration_millis)
                .and_then(|delay| started_at.checked_add_signed(delay)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetContext {
    #[serde(default)]
    pub overrides: Vec<UserOverride>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverride {
    pub identifier_type: String,
    pub identifiers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    pub default_lang: String,
    #[serde(default)]
    pub experiment_context: Option<ExperimentContext>,
    pub platform_types: Vec<PlatformType>,
    #[serde(default)]
    pub orientations: Vec<Orientation>,
    pub messages: Vec<Message>,
}

/// Message variants are split by the variation of this experiment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentContext {
    pub key: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformType {
    Android,
    Ios,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Orientation {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub variation_key: Option<String>,
    pub lang: String,
    pub layout: Layout,
    #[serde(default)]
    pub text: Option<Text>,
    #[serde(default)]
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub display_type: DisplayType,
    pub layout_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayType {
    None,
    Modal,
    Banner,
    BottomSheet,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Text {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Button {
    pub text: String,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateContext {
    /// Eligibility is evaluated again, from scratch, when a delayed message is delivered.
    #[serde(default)]
    pub at_deliver_time: bool,
}

impl InAppMessage {
    pub fn supports(&self, platform: PlatformType) -> bool {
        self.message_context.platform_types.contains(&platform)
    }
}
