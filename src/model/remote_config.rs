use serde::Deserialize;

use crate::value::{HackleValue, ValueType};

use super::Target;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigParameter {
    pub id: i64,
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub identifier_type: String,
    #[serde(default)]
    pub target_rules: Vec<RemoteConfigTargetRule>,
    pub default_value: RemoteConfigValue,
}

/// Rule that serves `value` to the part of the target audience allocated by `bucket_id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigTargetRule {
    pub key: String,
    pub name: String,
    pub target: Target,
    pub bucket_id: i64,
    pub value: RemoteConfigValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigValue {
    pub id: i64,
    pub raw_value: HackleValue,
}
