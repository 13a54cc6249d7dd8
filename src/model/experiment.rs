use std::collections::HashMap;

use serde::Deserialize;

use crate::value::HackleValue;

use super::Target;

/// An A/B test or a feature flag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: i64,
    pub key: i64,
    #[serde(rename = "type")]
    pub experiment_type: ExperimentType,
    pub identifier_type: String,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub version: i32,
    pub variations: Vec<Variation>,
    /// Identifier value -> variation id.
    #[serde(default)]
    pub user_overrides: HashMap<String, i64>,
    #[serde(default)]
    pub segment_overrides: Vec<TargetRule>,
    #[serde(default)]
    pub target_audiences: Vec<Target>,
    #[serde(default)]
    pub target_rules: Vec<TargetRule>,
    pub default_rule: Action,
    #[serde(default)]
    pub container_id: Option<i64>,
    #[serde(default)]
    pub winner_variation_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentType {
    AbTest,
    FeatureFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub id: i64,
    pub key: String,
    #[serde(default)]
    pub is_dropped: bool,
    #[serde(default)]
    pub parameter_configuration_id: Option<i64>,
}

/// What a matched rule resolves to: a fixed variation, or a bucket to hash the user into.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    Variation { variation_id: i64 },
    Bucket { bucket_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRule {
    pub target: Target,
    pub action: Action,
}

/// Parameters attached to a variation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterConfiguration {
    pub id: i64,
    pub parameters: HashMap<String, HackleValue>,
}

/// A mutual-exclusion group of experiments sharing one bucket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: i64,
    pub bucket_id: i64,
    pub groups: Vec<ContainerGroup>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerGroup {
    pub id: i64,
    pub experiments: Vec<i64>,
}

impl Experiment {
    pub fn get_variation_by_id(&self, variation_id: i64) -> Option<&Variation> {
        self.variations.iter().find(|v| v.id == variation_id)
    }

    pub fn get_variation_by_key(&self, variation_key: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.key == variation_key)
    }

    pub fn winner_variation(&self) -> Option<&Variation> {
        self.winner_variation_id
            .and_then(|id| self.get_variation_by_id(id))
    }
}

impl Container {
    pub fn get_group(&self, group_id: i64) -> Option<&ContainerGroup> {
        self.groups.iter().find(|g| g.id == group_id)
    }
}

impl ParameterConfiguration {
    pub fn get(&self, key: &str) -> Option<&HackleValue> {
        self.parameters.get(key)
    }
}
