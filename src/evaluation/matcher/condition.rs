use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::{
    decision::DecisionReason,
    evaluation::{
        evaluate_as, Evaluator, EvaluatorContext, EvaluatorKind, EvaluatorRequest,
        ExperimentEvaluation, ExperimentRequest, Request,
    },
    model::{Condition, Experiment, TargetKey, TargetKeyType},
    user::HackleUser,
    Error, Result,
};

use super::ValueOperatorMatcher;

/// Matches one condition of a target.
pub trait ConditionMatcher: Send + Sync {
    fn matches(
        &self,
        request: &dyn EvaluatorRequest,
        context: &mut EvaluatorContext,
        condition: &Condition,
    ) -> Result<bool>;
}

/// USER_ID, USER_PROPERTY, HACKLE_PROPERTY and COHORT conditions.
#[derive(Debug, Default)]
pub struct UserConditionMatcher {
    value_matcher: ValueOperatorMatcher,
}

impl UserConditionMatcher {
    fn matches_user(&self, user: &HackleUser, condition: &Condition) -> bool {
        let user_value = resolve_user_value(user, &condition.key);
        self.value_matcher
            .matches(user_value.as_ref(), &condition.matcher)
    }
}

fn resolve_user_value(user: &HackleUser, key: &TargetKey) -> Option<Value> {
    match key.key_type {
        TargetKeyType::UserId => user
            .identifier(&key.name)
            .map(|it| Value::String(it.to_owned())),
        TargetKeyType::UserProperty => user.properties.get(&key.name).cloned(),
        TargetKeyType::HackleProperty => user.hackle_properties.get(&key.name).cloned(),
        TargetKeyType::Cohort => Some(Value::Array(
            user.cohorts.iter().map(|it| Value::from(*it)).collect(),
        )),
        _ => None,
    }
}

impl ConditionMatcher for UserConditionMatcher {
    fn matches(
        &self,
        request: &dyn EvaluatorRequest,
        _context: &mut EvaluatorContext,
        condition: &Condition,
    ) -> Result<bool> {
        Ok(self.matches_user(request.user(), condition))
    }
}

/// EVENT_PROPERTY conditions. Never matches a request without an event.
#[derive(Debug, Default)]
pub struct EventConditionMatcher {
    value_matcher: ValueOperatorMatcher,
}

impl ConditionMatcher for EventConditionMatcher {
    fn matches(
        &self,
        request: &dyn EvaluatorRequest,
        _context: &mut EvaluatorContext,
        condition: &Condition,
    ) -> Result<bool> {
        let Some(event) = request.event() else {
            return Ok(false);
        };
        Ok(self
            .value_matcher
            .matches(event.properties.get(&condition.key.name), &condition.matcher))
    }
}

/// SEGMENT conditions. Condition values are segment keys.
#[derive(Debug, Default)]
pub struct SegmentConditionMatcher {
    user_condition_matcher: UserConditionMatcher,
}

impl SegmentConditionMatcher {
    fn matches_segment(&self, request: &dyn EvaluatorRequest, segment_key: &str) -> Result<bool> {
        let segment = request
            .workspace()
            .get_segment(segment_key)
            .ok_or_else(|| Error::SegmentNotFound(segment_key.to_owned()))?;

        Ok(segment.targets.iter().any(|target| {
            target.conditions.iter().all(|condition| {
                self.user_condition_matcher
                    .matches_user(request.user(), condition)
            })
        }))
    }
}

impl ConditionMatcher for SegmentConditionMatcher {
    fn matches(
        &self,
        request: &dyn EvaluatorRequest,
        _context: &mut EvaluatorContext,
        condition: &Condition,
    ) -> Result<bool> {
        let mut is_matched = false;
        for value in &condition.matcher.values {
            let Some(segment_key) = value.as_string() else {
                continue;
            };
            if self.matches_segment(request, &segment_key)? {
                is_matched = true;
                break;
            }
        }
        Ok(condition.matcher.match_type.matches(is_matched))
    }
}

/// AB_TEST and FEATURE_FLAG conditions. The key name is the referenced experiment key.
///
/// The referenced experiment is evaluated in the same context as the outer request, which is
/// what detects circular references between experiments.
pub struct ExperimentConditionMatcher {
    evaluator: Weak<dyn Evaluator>,
    value_matcher: ValueOperatorMatcher,
}

const AB_TEST_MATCHED_REASONS: [DecisionReason; 4] = [
    DecisionReason::Overridden,
    DecisionReason::TrafficAllocated,
    DecisionReason::TrafficAllocatedByTargeting,
    DecisionReason::ExperimentCompleted,
];

impl ExperimentConditionMatcher {
    pub fn new(evaluator: Weak<dyn Evaluator>) -> Self {
        ExperimentConditionMatcher {
            evaluator,
            value_matcher: ValueOperatorMatcher,
        }
    }

    fn evaluation(
        &self,
        request: &dyn EvaluatorRequest,
        context: &mut EvaluatorContext,
        experiment: &Arc<Experiment>,
    ) -> Result<ExperimentEvaluation> {
        if let Some(evaluation) = context.get_experiment_evaluation(experiment.id) {
            return Ok(evaluation.clone());
        }

        let evaluator = self.evaluator.upgrade().ok_or(Error::EvaluatorDropped)?;
        let nested = Request::Experiment(ExperimentRequest::new(
            request.workspace().clone(),
            request.user().clone(),
            experiment.clone(),
        ));
        let evaluation: ExperimentEvaluation = evaluate_as(evaluator.as_ref(), &nested, context)?;

        let evaluation = if request.key().kind == EvaluatorKind::Experiment
            && evaluation.reason == DecisionReason::TrafficAllocated
        {
            evaluation.with(DecisionReason::TrafficAllocatedByTargeting)
        } else {
            evaluation
        };

        context.add_target_evaluation(evaluation.clone().into());
        Ok(evaluation)
    }
}

impl ConditionMatcher for ExperimentConditionMatcher {
    fn matches(
        &self,
        request: &dyn EvaluatorRequest,
        context: &mut EvaluatorContext,
        condition: &Condition,
    ) -> Result<bool> {
        let key = &condition.key;
        let experiment_key: i64 = key.name.parse().map_err(|_| Error::InvalidTargetKey {
            key_type: format!("{:?}", key.key_type),
            name: key.name.clone(),
        })?;

        let workspace = request.workspace();
        let experiment = match key.key_type {
            TargetKeyType::AbTest => workspace.get_experiment(experiment_key),
            TargetKeyType::FeatureFlag => workspace.get_feature_flag(experiment_key),
            _ => None,
        };
        let Some(experiment) = experiment.cloned() else {
            return Ok(false);
        };

        let evaluation = self.evaluation(request, context, &experiment)?;
        let value = match key.key_type {
            TargetKeyType::AbTest => {
                if !AB_TEST_MATCHED_REASONS.contains(&evaluation.reason) {
                    return Ok(false);
                }
                Value::String(evaluation.variation_key)
            }
            _ => Value::Bool(evaluation.variation_key != "A"),
        };
        Ok(self.value_matcher.matches(Some(&value), &condition.matcher))
    }
}
