use crate::{
    evaluation::{
        ContextualEvaluator, EvaluationType, EvaluatorContext, EvaluatorRequest,
        InAppMessageEligibilityEvaluation, InAppMessageEligibilityEvaluator,
        InAppMessageEligibilityRequest, InAppMessageFlowFactory, Request,
    },
    Error, Result,
};

/// Stage of the pipeline an eligibility check runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InAppMessageEvaluateType {
    Trigger,
    /// `re_evaluate` runs the full flow again instead of only the deduplication checks.
    Deliver { re_evaluate: bool },
}

/// Runs the eligibility flow matching the pipeline stage.
pub struct InAppMessageEvaluateProcessor {
    trigger: InAppMessageEligibilityEvaluator,
    deliver: InAppMessageEligibilityEvaluator,
    re_evaluate: InAppMessageEligibilityEvaluator,
}

impl InAppMessageEvaluateProcessor {
    pub fn new(flow_factory: &InAppMessageFlowFactory) -> Self {
        InAppMessageEvaluateProcessor {
            trigger: InAppMessageEligibilityEvaluator::new(flow_factory.trigger_flow().clone()),
            deliver: InAppMessageEligibilityEvaluator::new(
                flow_factory.deliver_flow(false).clone(),
            ),
            re_evaluate: InAppMessageEligibilityEvaluator::new(
                flow_factory.deliver_flow(true).clone(),
            ),
        }
    }

    fn evaluator(&self, evaluate_type: InAppMessageEvaluateType) -> &InAppMessageEligibilityEvaluator {
        match evaluate_type {
            InAppMessageEvaluateType::Trigger => &self.trigger,
            InAppMessageEvaluateType::Deliver { re_evaluate: true } => &self.re_evaluate,
            InAppMessageEvaluateType::Deliver { re_evaluate: false } => &self.deliver,
        }
    }

    pub fn process(
        &self,
        evaluate_type: InAppMessageEvaluateType,
        request: InAppMessageEligibilityRequest,
        context: &mut EvaluatorContext,
    ) -> Result<InAppMessageEligibilityEvaluation> {
        let request = Request::InAppMessageEligibility(request);
        let evaluation = self.evaluator(evaluate_type).evaluate(&request, context)?;
        let evaluation = InAppMessageEligibilityEvaluation::from_evaluation(evaluation)
            .ok_or_else(|| Error::UnexpectedEvaluation(request.key()))?;

        log::trace!(target: "hackle",
            in_app_message_key = evaluation.in_app_message.key,
            evaluate_type:? = evaluate_type,
            is_eligible = evaluation.is_eligible,
            reason:% = evaluation.reason;
            "evaluated in-app message eligibility");
        Ok(evaluation)
    }
}
