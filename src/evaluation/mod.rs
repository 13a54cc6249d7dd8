//! The evaluation engine: requests, evaluations, flows and the evaluators that tie them together.
//!
//! Every request type has one [`ContextualEvaluator`]. The [`EvaluationEngine`] routes a
//! [`Request`] to the evaluator that supports it and is also what nested evaluations (an
//! experiment referenced from a targeting condition, the experiment behind an in-app message
//! layout) go through, so the whole call tree shares one [`EvaluatorContext`].
use std::sync::{Arc, Weak};

use crate::{bucketer::Bucketer, Result};

mod action;
mod context;
mod evaluator;
mod experiment;
pub mod experiment_flow;
mod flow;
mod in_app_message;
pub mod in_app_message_flow;
pub mod matcher;
mod remote_config;

pub use context::{EvaluatorContext, Properties};
pub use evaluator::{
    evaluate_as, ContextualEvaluator, DelegatingEvaluator, Evaluation, EvaluationType, Evaluator,
    EvaluatorKey, EvaluatorKind, EvaluatorRequest, Request,
};
pub use experiment::{
    ExperimentEvaluation, ExperimentEvaluator, ExperimentRequest, DEFAULT_VARIATION_KEY,
};
pub use experiment_flow::{ExperimentFlow, ExperimentFlowFactory};
pub use flow::{EvaluationFlow, FlowEvaluator};
pub use in_app_message::{
    InAppMessageEligibilityEvaluation, InAppMessageEligibilityEvaluator,
    InAppMessageEligibilityRequest, InAppMessageLayoutEvaluation, InAppMessageLayoutEvaluator,
    InAppMessageLayoutRequest,
};
pub use in_app_message_flow::{InAppMessageFlow, InAppMessageFlowFactory};
pub use remote_config::{
    RemoteConfigEvaluation, RemoteConfigEvaluator, RemoteConfigRequest,
    RemoteConfigTargetRuleDeterminer,
};

use matcher::{ConditionMatcherFactory, TargetMatcher};

/// Evaluates experiments, feature flags, remote config parameters and in-app message layouts.
///
/// The engine refers to itself (weakly) from the condition matchers, so it is always handed out
/// as an `Arc`.
pub struct EvaluationEngine {
    evaluator: DelegatingEvaluator,
    target_matcher: Arc<TargetMatcher>,
}

impl EvaluationEngine {
    pub fn new(bucketer: Arc<dyn Bucketer>) -> Arc<EvaluationEngine> {
        Arc::new_cyclic(|engine: &Weak<EvaluationEngine>| {
            let engine: Weak<dyn Evaluator> = engine.clone();
            let target_matcher = Arc::new(TargetMatcher::new(ConditionMatcherFactory::new(
                engine.clone(),
            )));

            let evaluators: Vec<Box<dyn ContextualEvaluator>> = vec![
                Box::new(ExperimentEvaluator::new(ExperimentFlowFactory::new(
                    target_matcher.clone(),
                    bucketer.clone(),
                ))),
                Box::new(RemoteConfigEvaluator::new(
                    RemoteConfigTargetRuleDeterminer::new(target_matcher.clone(), bucketer),
                )),
                Box::new(InAppMessageLayoutEvaluator::new(engine)),
            ];

            EvaluationEngine {
                evaluator: DelegatingEvaluator::new(evaluators),
                target_matcher,
            }
        })
    }

    /// Target matcher whose experiment conditions evaluate through this engine.
    pub fn target_matcher(&self) -> &Arc<TargetMatcher> {
        &self.target_matcher
    }
}

impl Evaluator for EvaluationEngine {
    fn evaluate(&self, request: &Request, context: &mut EvaluatorContext) -> Result<Evaluation> {
        self.evaluator.evaluate(request, context)
    }
}
