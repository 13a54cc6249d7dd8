//! Flow evaluators deciding whether an in-app message may be shown.
use std::sync::Arc;

use chrono::Duration;

use crate::{
    decision::DecisionReason,
    in_app_message::{
        InAppMessageHiddenStorage, InAppMessageImpression, InAppMessageImpressionStorage,
    },
    model::{FrequencyCap, InAppMessageStatus, PlatformType},
    Result,
};

use super::{
    matcher::TargetMatcher, EvaluationFlow, EvaluatorContext, FlowEvaluator,
    InAppMessageEligibilityEvaluation, InAppMessageEligibilityRequest,
};

pub type InAppMessageFlow =
    EvaluationFlow<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>;

type Decision = Result<Option<InAppMessageEligibilityEvaluation>>;

fn eligible(
    request: &InAppMessageEligibilityRequest,
    context: &EvaluatorContext,
    reason: DecisionReason,
) -> Decision {
    Ok(Some(InAppMessageEligibilityEvaluation::eligible(
        request, context, reason,
    )))
}

fn ineligible(
    request: &InAppMessageEligibilityRequest,
    context: &EvaluatorContext,
    reason: DecisionReason,
) -> Decision {
    Ok(Some(InAppMessageEligibilityEvaluation::ineligible(
        request, context, reason,
    )))
}

/// Messages not built for the running platform are never shown.
pub struct PlatformEvaluator {
    platform: PlatformType,
}

impl PlatformEvaluator {
    pub fn new(platform: PlatformType) -> Self {
        PlatformEvaluator { platform }
    }
}

impl FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>
    for PlatformEvaluator
{
    fn evaluate(
        &self,
        request: &InAppMessageEligibilityRequest,
        context: &mut EvaluatorContext,
        next_flow: &InAppMessageFlow,
    ) -> Decision {
        if !request.in_app_message.supports(self.platform) {
            return ineligible(request, context, DecisionReason::UnsupportedPlatform);
        }
        next_flow.evaluate(request, context)
    }
}

pub struct UserOverrideEvaluator;

impl FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>
    for UserOverrideEvaluator
{
    fn evaluate(
        &self,
        request: &InAppMessageEligibilityRequest,
        context: &mut EvaluatorContext,
        next_flow: &InAppMessageFlow,
    ) -> Decision {
        let overridden = request
            .in_app_message
            .target_context
            .overrides
            .iter()
            .any(|it| {
                request
                    .user
                    .identifier(&it.identifier_type)
                    .is_some_and(|identifier| it.identifiers.iter().any(|id| id == identifier))
            });
        if overridden {
            return eligible(request, context, DecisionReason::Overridden);
        }
        next_flow.evaluate(request, context)
    }
}

pub struct DraftEvaluator;

impl FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>
    for DraftEvaluator
{
    fn evaluate(
        &self,
        request: &InAppMessageEligibilityRequest,
        context: &mut EvaluatorContext,
        next_flow: &InAppMessageFlow,
    ) -> Decision {
        if request.in_app_message.status == InAppMessageStatus::Draft {
            return ineligible(request, context, DecisionReason::InAppMessageDraft);
        }
        next_flow.evaluate(request, context)
    }
}

pub struct PausedEvaluator;

impl FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>
    for PausedEvaluator
{
    fn evaluate(
        &self,
        request: &InAppMessageEligibilityRequest,
        context: &mut EvaluatorContext,
        next_flow: &InAppMessageFlow,
    ) -> Decision {
        if request.in_app_message.status == InAppMessageStatus::Pause {
            return ineligible(request, context, DecisionReason::InAppMessagePaused);
        }
        next_flow.evaluate(request, context)
    }
}

pub struct PeriodEvaluator;

impl FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>
    for PeriodEvaluator
{
    fn evaluate(
        &self,
        request: &InAppMessageEligibilityRequest,
        context: &mut EvaluatorContext,
        next_flow: &InAppMessageFlow,
    ) -> Decision {
        if !request.in_app_message.period.within(request.timestamp) {
            return ineligible(request, context, DecisionReason::NotInInAppMessagePeriod);
        }
        next_flow.evaluate(request, context)
    }
}

/// Audience targets of the message. A message without targets is shown to everyone.
pub struct TargetEvaluator {
    target_matcher: Arc<TargetMatcher>,
}

impl TargetEvaluator {
    pub fn new(target_matcher: Arc<TargetMatcher>) -> Self {
        TargetEvaluator { target_matcher }
    }
}

impl FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>
    for TargetEvaluator
{
    fn evaluate(
        &self,
        request: &InAppMessageEligibilityRequest,
        context: &mut EvaluatorContext,
        next_flow: &InAppMessageFlow,
    ) -> Decision {
        let targets = &request.in_app_message.target_context.targets;
        if !targets.is_empty() && !self.target_matcher.any_matches(request, context, targets)? {
            return ineligible(request, context, DecisionReason::NotInInAppMessageTarget);
        }
        next_flow.evaluate(request, context)
    }
}

pub struct FrequencyCapEvaluator {
    impression_storage: Arc<dyn InAppMessageImpressionStorage>,
}

impl FrequencyCapEvaluator {
    pub fn new(impression_storage: Arc<dyn InAppMessageImpressionStorage>) -> Self {
        FrequencyCapEvaluator { impression_storage }
    }

    fn is_capped(
        &self,
        request: &InAppMessageEligibilityRequest,
        frequency_cap: &FrequencyCap,
    ) -> bool {
        let impressions = self.impression_storage.get(&request.in_app_message);
        let count = |predicate: &dyn Fn(&InAppMessageImpression) -> bool| {
            impressions.iter().filter(|it| predicate(it)).count()
        };

        let identifier_capped = frequency_cap.identifier_caps.iter().any(|cap| {
            let Some(identifier) = request.user.identifier(&cap.identifier_type) else {
                return false;
            };
            let matched = count(&|impression| {
                impression.identifiers.get(&cap.identifier_type).map(String::as_str)
                    == Some(identifier)
            });
            matched >= cap.count
        });
        if identifier_capped {
            return true;
        }

        frequency_cap.duration_cap.as_ref().is_some_and(|cap| {
            let window = Duration::milliseconds(cap.duration_millis);
            let matched = count(&|impression| request.timestamp - impression.timestamp <= window);
            matched >= cap.count
        })
    }
}

impl FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>
    for FrequencyCapEvaluator
{
    fn evaluate(
        &self,
        request: &InAppMessageEligibilityRequest,
        context: &mut EvaluatorContext,
        next_flow: &InAppMessageFlow,
    ) -> Decision {
        if let Some(frequency_cap) = &request.in_app_message.event_trigger.frequency_cap {
            if self.is_capped(request, frequency_cap) {
                return ineligible(request, context, DecisionReason::InAppMessageFrequencyCapped);
            }
        }
        next_flow.evaluate(request, context)
    }
}

pub struct HiddenEvaluator {
    hidden_storage: Arc<dyn InAppMessageHiddenStorage>,
}

impl HiddenEvaluator {
    pub fn new(hidden_storage: Arc<dyn InAppMessageHiddenStorage>) -> Self {
        HiddenEvaluator { hidden_storage }
    }
}

impl FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>
    for HiddenEvaluator
{
    fn evaluate(
        &self,
        request: &InAppMessageEligibilityRequest,
        context: &mut EvaluatorContext,
        next_flow: &InAppMessageFlow,
    ) -> Decision {
        if self
            .hidden_storage
            .exist(&request.in_app_message, request.timestamp)
        {
            return ineligible(request, context, DecisionReason::InAppMessageHidden);
        }
        next_flow.evaluate(request, context)
    }
}

/// Last step: everything passed.
pub struct EligibleEvaluator;

impl FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>
    for EligibleEvaluator
{
    fn evaluate(
        &self,
        request: &InAppMessageEligibilityRequest,
        context: &mut EvaluatorContext,
        _next_flow: &InAppMessageFlow,
    ) -> Decision {
        eligible(request, context, DecisionReason::InAppMessageTarget)
    }
}

/// Flows used at trigger time and at delivery time.
pub struct InAppMessageFlowFactory {
    trigger_flow: InAppMessageFlow,
    deliver_flow: InAppMessageFlow,
}

impl InAppMessageFlowFactory {
    pub fn new(
        target_matcher: Arc<TargetMatcher>,
        impression_storage: Arc<dyn InAppMessageImpressionStorage>,
        hidden_storage: Arc<dyn InAppMessageHiddenStorage>,
        platform: PlatformType,
    ) -> Self {
        let message_flow: Vec<
            Arc<dyn FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>>,
        > = vec![
            Arc::new(PlatformEvaluator::new(platform)),
            Arc::new(UserOverrideEvaluator),
            Arc::new(DraftEvaluator),
            Arc::new(PausedEvaluator),
            Arc::new(PeriodEvaluator),
            Arc::new(TargetEvaluator::new(target_matcher)),
        ];
        let dedup_flow: Vec<
            Arc<dyn FlowEvaluator<InAppMessageEligibilityRequest, InAppMessageEligibilityEvaluation>>,
        > = vec![
            Arc::new(FrequencyCapEvaluator::new(impression_storage)),
            Arc::new(HiddenEvaluator::new(hidden_storage)),
            Arc::new(EligibleEvaluator),
        ];

        let deliver_flow = EvaluationFlow::of(dedup_flow);
        InAppMessageFlowFactory {
            trigger_flow: EvaluationFlow::of(message_flow).then(&deliver_flow),
            deliver_flow,
        }
    }

    /// Full eligibility flow.
    pub fn trigger_flow(&self) -> &InAppMessageFlow {
        &self.trigger_flow
    }

    /// Flow run at delivery time. Without re-evaluation only the checks that may have changed
    /// since the trigger (frequency cap, hidden) run again.
    pub fn deliver_flow(&self, re_evaluate: bool) -> &InAppMessageFlow {
        if re_evaluate {
            &self.trigger_flow
        } else {
            &self.deliver_flow
        }
    }
}
