//! Hands a resolved message to the host for rendering and records the impression.
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    decision::DecisionReason,
    evaluation::{
        evaluate_as, Evaluator, EvaluatorContext, InAppMessageLayoutEvaluation,
        InAppMessageLayoutRequest, Properties, Request,
    },
    model::{InAppMessage, Message},
    user::HackleUser,
    workspace::Workspace,
    Result,
};

use super::{InAppMessageImpression, InAppMessageImpressionStorage, IMPRESSION_MAX_SIZE};

#[derive(Debug, Clone)]
pub struct InAppMessagePresentRequest {
    pub dispatch_id: String,
    pub workspace: Arc<Workspace>,
    pub in_app_message: Arc<InAppMessage>,
    pub user: Arc<HackleUser>,
    pub requested_at: DateTime<Utc>,
    pub reason: DecisionReason,
    /// Layout resolved while checking eligibility, if any.
    pub layout_evaluation: Option<InAppMessageLayoutEvaluation>,
    pub properties: Properties,
}

/// Everything the host needs to render a message.
#[derive(Debug, Clone, PartialEq)]
pub struct InAppMessagePresentationContext {
    pub dispatch_id: String,
    pub in_app_message: Arc<InAppMessage>,
    pub message: Message,
    pub user: Arc<HackleUser>,
    pub decision_reason: DecisionReason,
    pub properties: Properties,
}

/// Renders in-app messages. Implemented by the host application.
pub trait InAppMessagePresenter: Send + Sync {
    fn present(&self, context: &InAppMessagePresentationContext);
}

#[derive(Debug, Clone, PartialEq)]
pub struct InAppMessagePresentResponse {
    pub dispatch_id: String,
    pub context: InAppMessagePresentationContext,
}

pub struct InAppMessagePresentationContextResolver {
    evaluator: Arc<dyn Evaluator>,
}

impl InAppMessagePresentationContextResolver {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        InAppMessagePresentationContextResolver { evaluator }
    }

    pub fn resolve(
        &self,
        request: &InAppMessagePresentRequest,
    ) -> Result<InAppMessagePresentationContext> {
        let layout = match &request.layout_evaluation {
            Some(layout) => layout.clone(),
            None => evaluate_as(
                self.evaluator.as_ref(),
                &Request::InAppMessageLayout(InAppMessageLayoutRequest {
                    workspace: request.workspace.clone(),
                    user: request.user.clone(),
                    in_app_message: request.in_app_message.clone(),
                }),
                &mut EvaluatorContext::new(),
            )?,
        };

        let mut properties = request.properties.clone();
        properties.extend(layout.properties);
        properties.insert(
            "decision_reason".to_owned(),
            request.reason.as_str().into(),
        );

        Ok(InAppMessagePresentationContext {
            dispatch_id: request.dispatch_id.clone(),
            in_app_message: request.in_app_message.clone(),
            message: layout.message,
            user: request.user.clone(),
            decision_reason: request.reason,
            properties,
        })
    }
}

/// Appends impressions used by frequency capping.
pub struct InAppMessageImpressionRecorder {
    storage: Arc<dyn InAppMessageImpressionStorage>,
}

impl InAppMessageImpressionRecorder {
    pub fn new(storage: Arc<dyn InAppMessageImpressionStorage>) -> Self {
        InAppMessageImpressionRecorder { storage }
    }

    pub fn record(&self, context: &InAppMessagePresentationContext, timestamp: DateTime<Utc>) {
        if context.decision_reason == DecisionReason::Overridden {
            return;
        }

        self.storage.append(
            &context.in_app_message,
            InAppMessageImpression {
                identifiers: context.user.identifiers.clone(),
                timestamp,
            },
            IMPRESSION_MAX_SIZE,
        );
    }
}

pub struct InAppMessagePresentProcessor {
    context_resolver: InAppMessagePresentationContextResolver,
    presenter: Arc<dyn InAppMessagePresenter>,
    impression_recorder: InAppMessageImpressionRecorder,
}

impl InAppMessagePresentProcessor {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        presenter: Arc<dyn InAppMessagePresenter>,
        impression_storage: Arc<dyn InAppMessageImpressionStorage>,
    ) -> Self {
        InAppMessagePresentProcessor {
            context_resolver: InAppMessagePresentationContextResolver::new(evaluator),
            presenter,
            impression_recorder: InAppMessageImpressionRecorder::new(impression_storage),
        }
    }

    pub fn process(&self, request: InAppMessagePresentRequest) -> Result<InAppMessagePresentResponse> {
        let context = self.context_resolver.resolve(&request)?;
        self.presenter.present(&context);
        self.impression_recorder.record(&context, request.requested_at);

        log::debug!(target: "hackle",
            dispatch_id = context.dispatch_id.as_str(),
            in_app_message_key = context.in_app_message.key;
            "in-app message presented");
        Ok(InAppMessagePresentResponse {
            dispatch_id: request.dispatch_id,
            context,
        })
    }
}
