use serde::Deserialize;

use crate::value::{HackleValue, ValueType};

/// Audience definition. A target matches when all of its conditions match.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub key: TargetKey,
    #[serde(rename = "match")]
    pub matcher: Match,
}

/// What a condition looks at: the key type selects the source and `name` selects the entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetKey {
    #[serde(rename = "type")]
    pub key_type: TargetKeyType,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetKeyType {
    UserId,
    UserProperty,
    HackleProperty,
    EventProperty,
    Segment,
    AbTest,
    FeatureFlag,
    Cohort,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    #[serde(rename = "type")]
    pub match_type: MatchType,
    pub operator: MatchOperator,
    pub value_type: ValueType,
    #[serde(default)]
    pub values: Vec<HackleValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Match,
    NotMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOperator {
    In,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Exists,
    Regex,
}

/// Named, reusable audience. A user belongs to a segment when any of its targets match.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: i64,
    pub key: String,
    pub targets: Vec<Target>,
}

impl MatchType {
    pub fn matches(&self, is_matched: bool) -> bool {
        match self {
            MatchType::Match => is_matched,
            MatchType::NotMatch => !is_matched,
        }
    }
}
