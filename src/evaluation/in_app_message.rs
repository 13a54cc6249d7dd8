use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};

use crate::{
    decision::DecisionReason,
    model::{InAppMessage, Message},
    user::HackleUser,
    workspace::Workspace,
    Error, Result,
};

use super::{
    evaluate_as, ContextualEvaluator, Evaluation, Evaluator, EvaluatorContext, EvaluatorKey,
    EvaluatorKind, EvaluatorRequest, ExperimentEvaluation, ExperimentRequest, InAppMessageFlow,
    Properties, Request,
};

/// Whether the user may see an in-app message at `timestamp`.
#[derive(Debug, Clone)]
pub struct InAppMessageEligibilityRequest {
    pub workspace: Arc<Workspace>,
    pub user: Arc<HackleUser>,
    pub in_app_message: Arc<InAppMessage>,
    pub timestamp: DateTime<Utc>,
}

impl EvaluatorRequest for InAppMessageEligibilityRequest {
    fn key(&self) -> EvaluatorKey {
        EvaluatorKey::new(EvaluatorKind::InAppMessage, self.in_app_message.id)
    }

    fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    fn user(&self) -> &Arc<HackleUser> {
        &self.user
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InAppMessageEligibilityEvaluation {
    pub reason: DecisionReason,
    pub target_evaluations: Vec<Evaluation>,
    pub in_app_message: Arc<InAppMessage>,
    pub is_eligible: bool,
    /// Layout resolved earlier in the same call, if any.
    pub layout_evaluation: Option<InAppMessageLayoutEvaluation>,
}

impl InAppMessageEligibilityEvaluation {
    pub fn eligible(
        request: &InAppMessageEligibilityRequest,
        context: &EvaluatorContext,
        reason: DecisionReason,
    ) -> Self {
        InAppMessageEligibilityEvaluation::of(request, context, reason, true)
    }

    pub fn ineligible(
        request: &InAppMessageEligibilityRequest,
        context: &EvaluatorContext,
        reason: DecisionReason,
    ) -> Self {
        InAppMessageEligibilityEvaluation::of(request, context, reason, false)
    }

    fn of(
        request: &InAppMessageEligibilityRequest,
        context: &EvaluatorContext,
        reason: DecisionReason,
        is_eligible: bool,
    ) -> Self {
        InAppMessageEligibilityEvaluation {
            reason,
            target_evaluations: context.target_evaluations().to_vec(),
            in_app_message: request.in_app_message.clone(),
            is_eligible,
            layout_evaluation: context.get::<InAppMessageLayoutEvaluation>().cloned(),
        }
    }
}

/// Runs one in-app message flow. Requests that fall through the flow are ineligible.
pub struct InAppMessageEligibilityEvaluator {
    flow: InAppMessageFlow,
}

impl InAppMessageEligibilityEvaluator {
    pub fn new(flow: InAppMessageFlow) -> Self {
        InAppMessageEligibilityEvaluator { flow }
    }

    pub fn flow(&self) -> &InAppMessageFlow {
        &self.flow
    }
}

impl ContextualEvaluator for InAppMessageEligibilityEvaluator {
    fn supports(&self, request: &Request) -> bool {
        matches!(request, Request::InAppMessageEligibility(_))
    }

    fn evaluate_internal(
        &self,
        request: &Request,
        context: &mut EvaluatorContext,
    ) -> Result<Evaluation> {
        let Request::InAppMessageEligibility(request) = request else {
            return Err(Error::UnsupportedRequest(request.key()));
        };

        let evaluation = match self.flow.evaluate(request, context)? {
            Some(evaluation) => evaluation,
            None => InAppMessageEligibilityEvaluation::ineligible(
                request,
                context,
                DecisionReason::NotInInAppMessageTarget,
            ),
        };
        Ok(evaluation.into())
    }
}

/// Which message variant of an in-app message the user sees.
#[derive(Debug, Clone)]
pub struct InAppMessageLayoutRequest {
    pub workspace: Arc<Workspace>,
    pub user: Arc<HackleUser>,
    pub in_app_message: Arc<InAppMessage>,
}

impl EvaluatorRequest for InAppMessageLayoutRequest {
    fn key(&self) -> EvaluatorKey {
        EvaluatorKey::new(EvaluatorKind::InAppMessage, self.in_app_message.id)
    }

    fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    fn user(&self) -> &Arc<HackleUser> {
        &self.user
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InAppMessageLayoutEvaluation {
    pub reason: DecisionReason,
    pub target_evaluations: Vec<Evaluation>,
    pub in_app_message: Arc<InAppMessage>,
    pub message: Message,
    pub properties: Properties,
}

/// Picks the message in the default language, split by the variation of the message's
/// experiment when it has one.
pub struct InAppMessageLayoutEvaluator {
    evaluator: Weak<dyn Evaluator>,
}

impl InAppMessageLayoutEvaluator {
    pub fn new(evaluator: Weak<dyn Evaluator>) -> Self {
        InAppMessageLayoutEvaluator { evaluator }
    }

    fn evaluate_layout(
        &self,
        request: &InAppMessageLayoutRequest,
        context: &mut EvaluatorContext,
    ) -> Result<InAppMessageLayoutEvaluation> {
        let in_app_message = &request.in_app_message;
        let message_context = &in_app_message.message_context;

        let variation_key = match &message_context.experiment_context {
            None => None,
            Some(experiment_context) => {
                let evaluation = self.evaluate_experiment(request, context, experiment_context.key)?;
                context.set_property("experiment_id", evaluation.experiment.id);
                context.set_property("experiment_key", evaluation.experiment.key);
                context.set_property("variation_id", evaluation.variation_id);
                context.set_property("variation_key", evaluation.variation_key.as_str());
                context.set_property("experiment_decision_reason", evaluation.reason.as_str());
                Some(evaluation.variation_key)
            }
        };

        let message = message_context
            .messages
            .iter()
            .find(|it| {
                it.lang == message_context.default_lang
                    && (variation_key.is_none() || it.variation_key == variation_key)
            })
            .ok_or(Error::MessageNotFound(in_app_message.id))?;

        Ok(InAppMessageLayoutEvaluation {
            reason: DecisionReason::InAppMessageTarget,
            target_evaluations: context.target_evaluations().to_vec(),
            in_app_message: in_app_message.clone(),
            message: message.clone(),
            properties: context.properties().clone(),
        })
    }

    fn evaluate_experiment(
        &self,
        request: &InAppMessageLayoutRequest,
        context: &mut EvaluatorContext,
        experiment_key: i64,
    ) -> Result<ExperimentEvaluation> {
        let experiment = request
            .workspace
            .get_experiment(experiment_key)
            .ok_or(Error::ExperimentNotFound(experiment_key))?;
        if let Some(evaluation) = context.get_experiment_evaluation(experiment.id) {
            return Ok(evaluation.clone());
        }

        let evaluator = self.evaluator.upgrade().ok_or(Error::EvaluatorDropped)?;
        let nested = Request::Experiment(ExperimentRequest::new(
            request.workspace.clone(),
            request.user.clone(),
            experiment.clone(),
        ));
        let evaluation: ExperimentEvaluation = evaluate_as(evaluator.as_ref(), &nested, context)?;
        context.add_target_evaluation(evaluation.clone().into());
        Ok(evaluation)
    }
}

impl ContextualEvaluator for InAppMessageLayoutEvaluator {
    fn supports(&self, request: &Request) -> bool {
        matches!(request, Request::InAppMessageLayout(_))
    }

    fn evaluate_internal(
        &self,
        request: &Request,
        context: &mut EvaluatorContext,
    ) -> Result<Evaluation> {
        let Request::InAppMessageLayout(request) = request else {
            return Err(Error::UnsupportedRequest(request.key()));
        };
        self.evaluate_layout(request, context).map(Evaluation::from)
    }
}
