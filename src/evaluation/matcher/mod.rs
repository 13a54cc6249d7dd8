//! Targeting: matching users, events and nested experiments against audience conditions.
use std::sync::Weak;

use crate::model::TargetKeyType;

use super::Evaluator;

mod condition;
mod target;
mod value;

pub use condition::{
    ConditionMatcher, EventConditionMatcher, ExperimentConditionMatcher, SegmentConditionMatcher,
    UserConditionMatcher,
};
pub use target::TargetMatcher;
pub use value::ValueOperatorMatcher;

/// Selects the condition matcher for a target key type.
pub struct ConditionMatcherFactory {
    user: UserConditionMatcher,
    event: EventConditionMatcher,
    segment: SegmentConditionMatcher,
    experiment: ExperimentConditionMatcher,
}

impl ConditionMatcherFactory {
    /// `evaluator` evaluates experiments referenced by AB_TEST and FEATURE_FLAG conditions.
    pub fn new(evaluator: Weak<dyn Evaluator>) -> Self {
        ConditionMatcherFactory {
            user: UserConditionMatcher::default(),
            event: EventConditionMatcher::default(),
            segment: SegmentConditionMatcher::default(),
            experiment: ExperimentConditionMatcher::new(evaluator),
        }
    }

    pub fn get(&self, key_type: TargetKeyType) -> &dyn ConditionMatcher {
        match key_type {
            TargetKeyType::UserId
            | TargetKeyType::UserProperty
            | TargetKeyType::HackleProperty
            | TargetKeyType::Cohort => &self.user,
            TargetKeyType::EventProperty => &self.event,
            TargetKeyType::Segment => &self.segment,
            TargetKeyType::AbTest | TargetKeyType::FeatureFlag => &self.experiment,
        }
    }
}
