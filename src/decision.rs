use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    model::{ParameterConfiguration, Variation},
    value::HackleValue,
};

/// Machine-readable explanation of how a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    /// Workspace has not been loaded yet.
    SdkNotReady,
    /// Evaluation failed; the default was returned.
    Exception,
    InvalidInput,

    ExperimentNotFound,
    ExperimentDraft,
    ExperimentPaused,
    ExperimentCompleted,
    Overridden,
    TrafficNotAllocated,
    TrafficAllocated,
    /// Allocated while being evaluated as a targeting condition of another experiment.
    TrafficAllocatedByTargeting,
    NotInMutualExclusionExperiment,
    IdentifierNotFound,
    VariationDropped,
    NotInExperimentTarget,

    FeatureFlagNotFound,
    FeatureFlagInactive,
    IndividualTargetMatch,
    TargetRuleMatch,
    DefaultRule,

    RemoteConfigParameterNotFound,
    TypeMismatch,

    UnsupportedPlatform,
    InAppMessageNotFound,
    InAppMessageDraft,
    InAppMessagePaused,
    InAppMessageHidden,
    InAppMessageTarget,
    NotInInAppMessagePeriod,
    NotInInAppMessageTarget,
    InAppMessageFrequencyCapped,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::SdkNotReady => "SDK_NOT_READY",
            DecisionReason::Exception => "EXCEPTION",
            DecisionReason::InvalidInput => "INVALID_INPUT",
            DecisionReason::ExperimentNotFound => "EXPERIMENT_NOT_FOUND",
            DecisionReason::ExperimentDraft => "EXPERIMENT_DRAFT",
            DecisionReason::ExperimentPaused => "EXPERIMENT_PAUSED",
            DecisionReason::ExperimentCompleted => "EXPERIMENT_COMPLETED",
            DecisionReason::Overridden => "OVERRIDDEN",
            DecisionReason::TrafficNotAllocated => "TRAFFIC_NOT_ALLOCATED",
            DecisionReason::TrafficAllocated => "TRAFFIC_ALLOCATED",
            DecisionReason::TrafficAllocatedByTargeting => "TRAFFIC_ALLOCATED_BY_TARGETING",
            DecisionReason::NotInMutualExclusionExperiment => "NOT_IN_MUTUAL_EXCLUSION_EXPERIMENT",
            DecisionReason::IdentifierNotFound => "IDENTIFIER_NOT_FOUND",
            DecisionReason::VariationDropped => "VARIATION_DROPPED",
            DecisionReason::NotInExperimentTarget => "NOT_IN_EXPERIMENT_TARGET",
            DecisionReason::FeatureFlagNotFound => "FEATURE_FLAG_NOT_FOUND",
            DecisionReason::FeatureFlagInactive => "FEATURE_FLAG_INACTIVE",
            DecisionReason::IndividualTargetMatch => "INDIVIDUAL_TARGET_MATCH",
            DecisionReason::TargetRuleMatch => "TARGET_RULE_MATCH",
            DecisionReason::DefaultRule => "DEFAULT_RULE",
            DecisionReason::RemoteConfigParameterNotFound => "REMOTE_CONFIG_PARAMETER_NOT_FOUND",
            DecisionReason::TypeMismatch => "TYPE_MISMATCH",
            DecisionReason::UnsupportedPlatform => "UNSUPPORTED_PLATFORM",
            DecisionReason::InAppMessageNotFound => "IN_APP_MESSAGE_NOT_FOUND",
            DecisionReason::InAppMessageDraft => "IN_APP_MESSAGE_DRAFT",
            DecisionReason::InAppMessagePaused => "IN_APP_MESSAGE_PAUSED",
            DecisionReason::InAppMessageHidden => "IN_APP_MESSAGE_HIDDEN",
            DecisionReason::InAppMessageTarget => "IN_APP_MESSAGE_TARGET",
            DecisionReason::NotInInAppMessagePeriod => "NOT_IN_IN_APP_MESSAGE_PERIOD",
            DecisionReason::NotInInAppMessageTarget => "NOT_IN_IN_APP_MESSAGE_TARGET",
            DecisionReason::InAppMessageFrequencyCapped => "IN_APP_MESSAGE_FREQUENCY_CAPPED",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allocation outcome of [`HackleCore::decide`](crate::HackleCore::decide).
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NotAllocated,
    /// Allocated by a manual override, regardless of bucketing.
    ForcedAllocated { variation_key: String },
    NaturalAllocated { variation: Variation },
}

/// Result of an A/B test decision. Always carries a usable variation key.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDecision {
    pub variation: String,
    pub reason: DecisionReason,
    pub config: Option<Arc<ParameterConfiguration>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFlagDecision {
    pub is_on: bool,
    pub reason: DecisionReason,
    pub config: Option<Arc<ParameterConfiguration>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfigDecision {
    pub value: HackleValue,
    pub reason: DecisionReason,
}
