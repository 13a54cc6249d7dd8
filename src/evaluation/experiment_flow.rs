//! Flow evaluators for A/B tests and feature flags.
use std::sync::Arc;

use crate::{
    bucketer::Bucketer,
    decision::DecisionReason,
    model::{ExperimentStatus, ExperimentType},
    Error, Result,
};

use super::{
    action::{ActionResolver, ContainerResolver, OverrideResolver},
    matcher::TargetMatcher,
    EvaluationFlow, EvaluatorContext, ExperimentEvaluation, ExperimentRequest, FlowEvaluator,
};

pub type ExperimentFlow = EvaluationFlow<ExperimentRequest, ExperimentEvaluation>;

type Decision = Result<Option<ExperimentEvaluation>>;

fn decide(
    request: &ExperimentRequest,
    context: &EvaluatorContext,
    reason: DecisionReason,
) -> Decision {
    ExperimentEvaluation::of_default(request, context, reason).map(Some)
}

/// Manually assigned variations.
pub struct OverrideEvaluator {
    override_resolver: OverrideResolver,
}

impl OverrideEvaluator {
    pub fn new(override_resolver: OverrideResolver) -> Self {
        OverrideEvaluator { override_resolver }
    }
}

impl FlowEvaluator<ExperimentRequest, ExperimentEvaluation> for OverrideEvaluator {
    fn evaluate(
        &self,
        request: &ExperimentRequest,
        context: &mut EvaluatorContext,
        next_flow: &ExperimentFlow,
    ) -> Decision {
        let Some(variation) = self.override_resolver.resolve_or_none(request, context)? else {
            return next_flow.evaluate(request, context);
        };

        let reason = match request.experiment.experiment_type {
            ExperimentType::AbTest => DecisionReason::Overridden,
            ExperimentType::FeatureFlag => DecisionReason::IndividualTargetMatch,
        };
        ExperimentEvaluation::of(request, context, variation, reason).map(Some)
    }
}

pub struct DraftEvaluator;

impl FlowEvaluator<ExperimentRequest, ExperimentEvaluation> for DraftEvaluator {
    fn evaluate(
        &self,
        request: &ExperimentRequest,
        context: &mut EvaluatorContext,
        next_flow: &ExperimentFlow,
    ) -> Decision {
        if request.experiment.status == ExperimentStatus::Draft {
            return decide(request, context, DecisionReason::ExperimentDraft);
        }
        next_flow.evaluate(request, context)
    }
}

pub struct PausedEvaluator;

impl FlowEvaluator<ExperimentRequest, ExperimentEvaluation> for PausedEvaluator {
    fn evaluate(
        &self,
        request: &ExperimentRequest,
        context: &mut EvaluatorContext,
        next_flow: &ExperimentFlow,
    ) -> Decision {
        if request.experiment.status != ExperimentStatus::Paused {
            return next_flow.evaluate(request, context);
        }
        let reason = match request.experiment.experiment_type {
            ExperimentType::AbTest => DecisionReason::ExperimentPaused,
            ExperimentType::FeatureFlag => DecisionReason::FeatureFlagInactive,
        };
        decide(request, context, reason)
    }
}

/// Completed experiments serve their winner variation.
pub struct CompletedEvaluator;

impl FlowEvaluator<ExperimentRequest, ExperimentEvaluation> for CompletedEvaluator {
    fn evaluate(
        &self,
        request: &ExperimentRequest,
        context: &mut EvaluatorContext,
        next_flow: &ExperimentFlow,
    ) -> Decision {
        let experiment = &request.experiment;
        if experiment.status != ExperimentStatus::Completed {
            return next_flow.evaluate(request, context);
        }
        let winner = experiment
            .winner_variation()
            .ok_or(Error::WinnerVariationNotFound(experiment.id))?;
        ExperimentEvaluation::of(request, context, winner, DecisionReason::ExperimentCompleted)
            .map(Some)
    }
}

/// Users without the experiment's identifier cannot be bucketed.
pub struct IdentifierEvaluator;

impl FlowEvaluator<ExperimentRequest, ExperimentEvaluation> for IdentifierEvaluator {
    fn evaluate(
        &self,
        request: &ExperimentRequest,
        context: &mut EvaluatorContext,
        next_flow: &ExperimentFlow,
    ) -> Decision {
        if request.identifier().is_some() {
            return next_flow.evaluate(request, context);
        }
        decide(request, context, DecisionReason::IdentifierNotFound)
    }
}

/// Mutual exclusion between the experiments of a container.
pub struct ContainerEvaluator {
    container_resolver: ContainerResolver,
}

impl ContainerEvaluator {
    pub fn new(container_resolver: ContainerResolver) -> Self {
        ContainerEvaluator { container_resolver }
    }
}

impl FlowEvaluator<ExperimentRequest, ExperimentEvaluation> for ContainerEvaluator {
    fn evaluate(
        &self,
        request: &ExperimentRequest,
        context: &mut EvaluatorContext,
        next_flow: &ExperimentFlow,
    ) -> Decision {
        let Some(container_id) = request.experiment.container_id else {
            return next_flow.evaluate(request, context);
        };
        let container = request
            .workspace
            .get_container(container_id)
            .ok_or(Error::ContainerNotFound(container_id))?;

        if self
            .container_resolver
            .is_user_in_container_group(request, container)?
        {
            next_flow.evaluate(request, context)
        } else {
            decide(
                request,
                context,
                DecisionReason::NotInMutualExclusionExperiment,
            )
        }
    }
}

/// Audience of an A/B test. No audience means everyone.
pub struct ExperimentTargetEvaluator {
    target_matcher: Arc<TargetMatcher>,
}

impl ExperimentTargetEvaluator {
    pub fn new(target_matcher: Arc<TargetMatcher>) -> Self {
        ExperimentTargetEvaluator { target_matcher }
    }
}

impl FlowEvaluator<ExperimentRequest, ExperimentEvaluation> for ExperimentTargetEvaluator {
    fn evaluate(
        &self,
        request: &ExperimentRequest,
        context: &mut EvaluatorContext,
        next_flow: &ExperimentFlow,
    ) -> Decision {
        let audiences = &request.experiment.target_audiences;
        if audiences.is_empty()
            || self
                .target_matcher
                .any_matches(request, context, audiences)?
        {
            return next_flow.evaluate(request, context);
        }
        decide(request, context, DecisionReason::NotInExperimentTarget)
    }
}

/// Buckets the user with the A/B test's default rule.
pub struct TrafficAllocateEvaluator {
    action_resolver: Arc<ActionResolver>,
}

impl TrafficAllocateEvaluator {
    pub fn new(action_resolver: Arc<ActionResolver>) -> Self {
        TrafficAllocateEvaluator { action_resolver }
    }
}

impl FlowEvaluator<ExperimentRequest, ExperimentEvaluation> for TrafficAllocateEvaluator {
    fn evaluate(
        &self,
        request: &ExperimentRequest,
        context: &mut EvaluatorContext,
        _next_flow: &ExperimentFlow,
    ) -> Decision {
        let experiment = &request.experiment;
        if experiment.status != ExperimentStatus::Running
            || experiment.experiment_type != ExperimentType::AbTest
        {
            return Err(Error::NotAllocatable(experiment.id));
        }

        let Some(variation) = self
            .action_resolver
            .resolve_or_none(request, &experiment.default_rule)?
        else {
            return decide(request, context, DecisionReason::TrafficNotAllocated);
        };
        if variation.is_dropped {
            return decide(request, context, DecisionReason::VariationDropped);
        }
        ExperimentEvaluation::of(request, context, variation, DecisionReason::TrafficAllocated)
            .map(Some)
    }
}

/// First matching target rule of a feature flag.
pub struct TargetRuleEvaluator {
    target_matcher: Arc<TargetMatcher>,
    action_resolver: Arc<ActionResolver>,
}

impl TargetRuleEvaluator {
    pub fn new(target_matcher: Arc<TargetMatcher>, action_resolver: Arc<ActionResolver>) -> Self {
        TargetRuleEvaluator {
            target_matcher,
            action_resolver,
        }
    }
}

impl FlowEvaluator<ExperimentRequest, ExperimentEvaluation> for TargetRuleEvaluator {
    fn evaluate(
        &self,
        request: &ExperimentRequest,
        context: &mut EvaluatorContext,
        next_flow: &ExperimentFlow,
    ) -> Decision {
        if request.identifier().is_none() {
            return next_flow.evaluate(request, context);
        }

        let experiment = &request.experiment;
        for rule in &experiment.target_rules {
            if !self.target_matcher.matches(request, context, &rule.target)? {
                continue;
            }
            let variation = self
                .action_resolver
                .resolve_or_none(request, &rule.action)?
                .ok_or(Error::UndecidedVariation(experiment.id))?;
            return ExperimentEvaluation::of(
                request,
                context,
                variation,
                DecisionReason::TargetRuleMatch,
            )
            .map(Some);
        }
        next_flow.evaluate(request, context)
    }
}

/// Feature flag default rule. Always decides.
pub struct DefaultRuleEvaluator {
    action_resolver: Arc<ActionResolver>,
}

impl DefaultRuleEvaluator {
    pub fn new(action_resolver: Arc<ActionResolver>) -> Self {
        DefaultRuleEvaluator { action_resolver }
    }
}

impl FlowEvaluator<ExperimentRequest, ExperimentEvaluation> for DefaultRuleEvaluator {
    fn evaluate(
        &self,
        request: &ExperimentRequest,
        context: &mut EvaluatorContext,
        _next_flow: &ExperimentFlow,
    ) -> Decision {
        if request.identifier().is_none() {
            return decide(request, context, DecisionReason::DefaultRule);
        }

        let experiment = &request.experiment;
        let variation = self
            .action_resolver
            .resolve_or_none(request, &experiment.default_rule)?
            .ok_or(Error::UndecidedVariation(experiment.id))?;
        ExperimentEvaluation::of(request, context, variation, DecisionReason::DefaultRule)
            .map(Some)
    }
}

/// Flows per experiment type.
pub struct ExperimentFlowFactory {
    ab_test_flow: ExperimentFlow,
    feature_flag_flow: ExperimentFlow,
}

impl ExperimentFlowFactory {
    pub fn new(target_matcher: Arc<TargetMatcher>, bucketer: Arc<dyn Bucketer>) -> Self {
        let action_resolver = Arc::new(ActionResolver::new(bucketer.clone()));
        let override_evaluator = || {
            Arc::new(OverrideEvaluator::new(OverrideResolver::new(
                target_matcher.clone(),
                action_resolver.clone(),
            )))
        };

        let ab_test_flow: Vec<Arc<dyn FlowEvaluator<ExperimentRequest, ExperimentEvaluation>>> = vec![
            override_evaluator(),
            Arc::new(IdentifierEvaluator),
            Arc::new(ContainerEvaluator::new(ContainerResolver::new(bucketer))),
            Arc::new(ExperimentTargetEvaluator::new(target_matcher.clone())),
            Arc::new(DraftEvaluator),
            Arc::new(PausedEvaluator),
            Arc::new(CompletedEvaluator),
            Arc::new(TrafficAllocateEvaluator::new(action_resolver.clone())),
        ];

        let feature_flag_flow: Vec<Arc<dyn FlowEvaluator<ExperimentRequest, ExperimentEvaluation>>> = vec![
            Arc::new(DraftEvaluator),
            Arc::new(PausedEvaluator),
            Arc::new(CompletedEvaluator),
            override_evaluator(),
            Arc::new(IdentifierEvaluator),
            Arc::new(TargetRuleEvaluator::new(
                target_matcher.clone(),
                action_resolver.clone(),
            )),
            Arc::new(DefaultRuleEvaluator::new(action_resolver)),
        ];

        ExperimentFlowFactory {
            ab_test_flow: EvaluationFlow::of(ab_test_flow),
            feature_flag_flow: EvaluationFlow::of(feature_flag_flow),
        }
    }

    pub fn get(&self, experiment_type: ExperimentType) -> &ExperimentFlow {
        match experiment_type {
            ExperimentType::AbTest => &self.ab_test_flow,
            ExperimentType::FeatureFlag => &self.feature_flag_flow,
        }
    }
}
