use crate::{
    evaluation::{EvaluatorContext, EvaluatorRequest},
    model::Target,
    Result,
};

use super::ConditionMatcherFactory;

/// Matches audience targets. A target matches when all of its conditions match.
pub struct TargetMatcher {
    condition_matcher_factory: ConditionMatcherFactory,
}

impl TargetMatcher {
    pub fn new(condition_matcher_factory: ConditionMatcherFactory) -> Self {
        TargetMatcher {
            condition_matcher_factory,
        }
    }

    pub fn matches(
        &self,
        request: &dyn EvaluatorRequest,
        context: &mut EvaluatorContext,
        target: &Target,
    ) -> Result<bool> {
        for condition in &target.conditions {
            let matcher = self.condition_matcher_factory.get(condition.key.key_type);
            if !matcher.matches(request, context, condition)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `false` for an empty list; callers decide what "no targets" means.
    pub fn any_matches(
        &self,
        request: &dyn EvaluatorRequest,
        context: &mut EvaluatorContext,
        targets: &[Target],
    ) -> Result<bool> {
        for target in targets {
            if self.matches(request, context, target)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use crate::{
        evaluation::{DelegatingEvaluator, EvaluatorContext},
        model::{MatchOperator, Target, TargetKeyType},
        testing::{condition, TestRequest},
        user::HackleUser,
        value::ValueType,
        workspace::WorkspaceDto,
    };

    use super::{super::ConditionMatcherFactory, TargetMatcher};

    fn age_at_least(age: i64) -> crate::model::Condition {
        condition(
            TargetKeyType::UserProperty,
            "age",
            MatchOperator::Gte,
            ValueType::Number,
            vec![age.into()],
        )
    }

    fn matcher() -> TargetMatcher {
        TargetMatcher::new(ConditionMatcherFactory::new(
            Weak::<DelegatingEvaluator>::new(),
        ))
    }

    #[test]
    fn target_requires_all_conditions() {
        let user = HackleUser::builder().property("age", 25).build();
        let request = TestRequest::new(std::sync::Arc::new(WorkspaceDto::default().into()), user);
        let mut context = EvaluatorContext::new();
        let matcher = matcher();

        let both = Target {
            conditions: vec![age_at_least(20), age_at_least(30)],
        };
        let first = Target {
            conditions: vec![age_at_least(20)],
        };
        let empty = Target { conditions: vec![] };

        assert!(!matcher.matches(&request, &mut context, &both).unwrap());
        assert!(matcher.matches(&request, &mut context, &first).unwrap());
        assert!(matcher.matches(&request, &mut context, &empty).unwrap());

        assert!(matcher
            .any_matches(&request, &mut context, &[both.clone(), first])
            .unwrap());
        assert!(!matcher.any_matches(&request, &mut context, &[both]).unwrap());
        assert!(!matcher.any_matches(&request, &mut context, &[]).unwrap());
    }
}
