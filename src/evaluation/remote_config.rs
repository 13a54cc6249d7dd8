use std::sync::Arc;

use crate::{
    bucketer::Bucketer,
    decision::DecisionReason,
    model::{RemoteConfigParameter, RemoteConfigTargetRule},
    user::HackleUser,
    value::HackleValue,
    workspace::Workspace,
    Error, Result,
};

use super::{
    matcher::TargetMatcher, ContextualEvaluator, Evaluation, EvaluatorContext, EvaluatorKey,
    EvaluatorKind, EvaluatorRequest, Properties, Request,
};

#[derive(Debug, Clone)]
pub struct RemoteConfigRequest {
    pub workspace: Arc<Workspace>,
    pub user: Arc<HackleUser>,
    pub parameter: Arc<RemoteConfigParameter>,
    /// Returned when no rule applies. Its type is the type the caller expects.
    pub default_value: HackleValue,
}

impl EvaluatorRequest for RemoteConfigRequest {
    fn key(&self) -> EvaluatorKey {
        EvaluatorKey::new(EvaluatorKind::RemoteConfig, self.parameter.id)
    }

    fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    fn user(&self) -> &Arc<HackleUser> {
        &self.user
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfigEvaluation {
    pub reason: DecisionReason,
    pub target_evaluations: Vec<Evaluation>,
    pub parameter: Arc<RemoteConfigParameter>,
    /// `None` when the caller's default value is returned.
    pub value_id: Option<i64>,
    pub value: HackleValue,
    pub properties: Properties,
}

/// Finds the first target rule of a parameter that applies to the user.
pub struct RemoteConfigTargetRuleDeterminer {
    target_matcher: Arc<TargetMatcher>,
    bucketer: Arc<dyn Bucketer>,
}

impl RemoteConfigTargetRuleDeterminer {
    pub fn new(target_matcher: Arc<TargetMatcher>, bucketer: Arc<dyn Bucketer>) -> Self {
        RemoteConfigTargetRuleDeterminer {
            target_matcher,
            bucketer,
        }
    }

    pub fn determine_or_none<'a>(
        &self,
        request: &'a RemoteConfigRequest,
        context: &mut EvaluatorContext,
    ) -> Result<Option<&'a RemoteConfigTargetRule>> {
        for rule in &request.parameter.target_rules {
            if self.matches(request, context, rule)? {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    fn matches(
        &self,
        request: &RemoteConfigRequest,
        context: &mut EvaluatorContext,
        rule: &RemoteConfigTargetRule,
    ) -> Result<bool> {
        if !self.target_matcher.matches(request, context, &rule.target)? {
            return Ok(false);
        }
        let Some(identifier) = request.user.identifier(&request.parameter.identifier_type) else {
            return Ok(false);
        };
        let bucket = request
            .workspace
            .get_bucket(rule.bucket_id)
            .ok_or(Error::BucketNotFound(rule.bucket_id))?;
        Ok(self.bucketer.bucketing(bucket, identifier).is_some())
    }
}

pub struct RemoteConfigEvaluator {
    target_rule_determiner: RemoteConfigTargetRuleDeterminer,
}

impl RemoteConfigEvaluator {
    pub fn new(target_rule_determiner: RemoteConfigTargetRuleDeterminer) -> Self {
        RemoteConfigEvaluator {
            target_rule_determiner,
        }
    }

    fn evaluate_remote_config(
        &self,
        request: &RemoteConfigRequest,
        context: &mut EvaluatorContext,
    ) -> Result<RemoteConfigEvaluation> {
        context.set_property("requestValueType", request.default_value.value_type().as_str());
        context.set_property("requestDefaultValue", request.default_value.to_json());

        let parameter = &request.parameter;
        if request.user.identifier(&parameter.identifier_type).is_none() {
            return Ok(default_evaluation(
                request,
                context,
                DecisionReason::IdentifierNotFound,
            ));
        }

        let (value, reason) = match self
            .target_rule_determiner
            .determine_or_none(request, context)?
        {
            Some(rule) => {
                context.set_property("targetRuleKey", rule.key.as_str());
                context.set_property("targetRuleName", rule.name.as_str());
                (&rule.value, DecisionReason::TargetRuleMatch)
            }
            None => (&parameter.default_value, DecisionReason::DefaultRule),
        };

        if value.raw_value.value_type() != request.default_value.value_type() {
            return Ok(default_evaluation(
                request,
                context,
                DecisionReason::TypeMismatch,
            ));
        }

        context.set_property("returnValue", value.raw_value.to_json());
        Ok(RemoteConfigEvaluation {
            reason,
            target_evaluations: context.target_evaluations().to_vec(),
            parameter: parameter.clone(),
            value_id: Some(value.id),
            value: value.raw_value.clone(),
            properties: context.properties().clone(),
        })
    }
}

fn default_evaluation(
    request: &RemoteConfigRequest,
    context: &mut EvaluatorContext,
    reason: DecisionReason,
) -> RemoteConfigEvaluation {
    context.set_property("returnValue", request.default_value.to_json());
    RemoteConfigEvaluation {
        reason,
        target_evaluations: context.target_evaluations().to_vec(),
        parameter: request.parameter.clone(),
        value_id: None,
        value: request.default_value.clone(),
        properties: context.properties().clone(),
    }
}

impl ContextualEvaluator for RemoteConfigEvaluator {
    fn supports(&self, request: &Request) -> bool {
        matches!(request, Request::RemoteConfig(_))
    }

    fn evaluate_internal(
        &self,
        request: &Request,
        context: &mut EvaluatorContext,
    ) -> Result<Evaluation> {
        let Request::RemoteConfig(request) = request else {
            return Err(Error::UnsupportedRequest(request.key()));
        };

        let evaluation = self.evaluate_remote_config(request, context)?;
        log::trace!(target: "hackle",
            parameter_key = request.parameter.key.as_str(),
            reason:% = evaluation.reason;
            "evaluated a remote config parameter");
        Ok(evaluation.into())
    }
}
