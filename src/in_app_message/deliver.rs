use std::sync::Arc;

use chrono::{DateTime, Utc};
use derive_more::Display;

use crate::{
    decision::DecisionReason,
    evaluation::{
        evaluate_as, Evaluator, EvaluatorContext, InAppMessageEligibilityRequest,
        InAppMessageLayoutEvaluation, InAppMessageLayoutRequest, Properties, Request,
    },
    user::{Identifiers, UserResolver},
    workspace::WorkspaceFetcher,
    Result,
};

use super::{
    InAppMessageEvaluateProcessor, InAppMessageEvaluateType, InAppMessageIdentifierChecker,
    InAppMessagePresentProcessor, InAppMessagePresentRequest, InAppMessagePresentResponse,
    InAppMessageScheduleRequest,
};

#[derive(Debug, Clone, PartialEq)]
pub struct InAppMessageDeliverRequest {
    pub dispatch_id: String,
    pub in_app_message_key: i64,
    /// Identifiers of the user the message was triggered for.
    pub identifiers: Identifiers,
    pub requested_at: DateTime<Utc>,
    /// Eligibility reason at trigger time.
    pub reason: DecisionReason,
    pub properties: Properties,
}

impl InAppMessageDeliverRequest {
    pub fn from_request(request: &InAppMessageScheduleRequest) -> Self {
        let schedule = &request.schedule;
        let mut properties = Properties::new();
        properties.insert(
            "trigger_event_insert_id".to_owned(),
            schedule.event_based_context.insert_id.clone().into(),
        );

        InAppMessageDeliverRequest {
            dispatch_id: schedule.dispatch_id.clone(),
            in_app_message_key: schedule.in_app_message_key,
            identifiers: schedule.identifiers.clone(),
            requested_at: request.requested_at,
            reason: schedule.reason,
            properties,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum InAppMessageDeliverCode {
    #[display("WORKSPACE_NOT_FOUND")]
    WorkspaceNotFound,
    #[display("IN_APP_MESSAGE_NOT_FOUND")]
    InAppMessageNotFound,
    /// The current user is not the one the message was triggered for.
    #[display("IDENTIFIER_CHANGED")]
    IdentifierChanged,
    #[display("INELIGIBLE")]
    Ineligible,
    #[display("PRESENT")]
    Present,
    #[display("EXCEPTION")]
    Exception,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InAppMessageDeliverResponse {
    pub dispatch_id: String,
    pub in_app_message_key: i64,
    pub code: InAppMessageDeliverCode,
    pub present_response: Option<InAppMessagePresentResponse>,
}

impl InAppMessageDeliverResponse {
    fn of(request: &InAppMessageDeliverRequest, code: InAppMessageDeliverCode) -> Self {
        InAppMessageDeliverResponse {
            dispatch_id: request.dispatch_id.clone(),
            in_app_message_key: request.in_app_message_key,
            code,
            present_response: None,
        }
    }
}

/// Last checks before a scheduled message is shown.
pub struct InAppMessageDeliverProcessor {
    workspace_fetcher: Arc<dyn WorkspaceFetcher>,
    user_resolver: Arc<dyn UserResolver>,
    identifier_checker: InAppMessageIdentifierChecker,
    evaluator: Arc<dyn Evaluator>,
    evaluate_processor: Arc<InAppMessageEvaluateProcessor>,
    present_processor: InAppMessagePresentProcessor,
}

impl InAppMessageDeliverProcessor {
    pub fn new(
        workspace_fetcher: Arc<dyn WorkspaceFetcher>,
        user_resolver: Arc<dyn UserResolver>,
        evaluator: Arc<dyn Evaluator>,
        evaluate_processor: Arc<InAppMessageEvaluateProcessor>,
        present_processor: InAppMessagePresentProcessor,
    ) -> Self {
        InAppMessageDeliverProcessor {
            workspace_fetcher,
            user_resolver,
            identifier_checker: InAppMessageIdentifierChecker,
            evaluator,
            evaluate_processor,
            present_processor,
        }
    }

    /// Never fails: errors are logged and reported as [`InAppMessageDeliverCode::Exception`].
    pub fn process(&self, request: &InAppMessageDeliverRequest) -> InAppMessageDeliverResponse {
        match self.deliver(request) {
            Ok(response) => {
                log::debug!(target: "hackle",
                    dispatch_id = request.dispatch_id.as_str(),
                    code:% = response.code;
                    "in-app message delivered");
                response
            }
            Err(err) => {
                log::warn!(target: "hackle",
                    dispatch_id = request.dispatch_id.as_str();
                    "failed to deliver in-app message: {err}");
                InAppMessageDeliverResponse::of(request, InAppMessageDeliverCode::Exception)
            }
        }
    }

    fn deliver(&self, request: &InAppMessageDeliverRequest) -> Result<InAppMessageDeliverResponse> {
        let Some(workspace) = self.workspace_fetcher.fetch() else {
            return Ok(InAppMessageDeliverResponse::of(
                request,
                InAppMessageDeliverCode::WorkspaceNotFound,
            ));
        };

        let Some(in_app_message) = workspace
            .get_in_app_message(request.in_app_message_key)
            .cloned()
        else {
            return Ok(InAppMessageDeliverResponse::of(
                request,
                InAppMessageDeliverCode::InAppMessageNotFound,
            ));
        };

        let user = self.user_resolver.resolve();
        if self
            .identifier_checker
            .is_identifier_changed(&request.identifiers, &user.identifiers)
        {
            return Ok(InAppMessageDeliverResponse::of(
                request,
                InAppMessageDeliverCode::IdentifierChanged,
            ));
        }
        let user = Arc::new(user);

        // The layout gets its own context so its experiment evaluation does not show up as a
        // target evaluation of the eligibility check.
        let layout_request = Request::InAppMessageLayout(InAppMessageLayoutRequest {
            workspace: workspace.clone(),
            user: user.clone(),
            in_app_message: in_app_message.clone(),
        });
        let layout: InAppMessageLayoutEvaluation = evaluate_as(
            self.evaluator.as_ref(),
            &layout_request,
            &mut EvaluatorContext::new(),
        )?;

        let mut context = EvaluatorContext::new();
        context.set(layout);

        let re_evaluate = in_app_message.evaluate_context.at_deliver_time;
        let eligibility_request = InAppMessageEligibilityRequest {
            workspace: workspace.clone(),
            user: user.clone(),
            in_app_message: in_app_message.clone(),
            timestamp: request.requested_at,
        };
        let evaluation = self.evaluate_processor.process(
            InAppMessageEvaluateType::Deliver { re_evaluate },
            eligibility_request,
            &mut context,
        )?;
        if !evaluation.is_eligible {
            log::debug!(target: "hackle",
                dispatch_id = request.dispatch_id.as_str(),
                reason:% = evaluation.reason;
                "in-app message is no longer eligible");
            return Ok(InAppMessageDeliverResponse::of(
                request,
                InAppMessageDeliverCode::Ineligible,
            ));
        }

        // Without re-evaluation only the deduplication checks ran, so the trigger-time reason
        // still describes why the user is in the audience.
        let reason = if re_evaluate {
            evaluation.reason
        } else {
            request.reason
        };

        let present_request = InAppMessagePresentRequest {
            dispatch_id: request.dispatch_id.clone(),
            workspace,
            in_app_message,
            user,
            requested_at: request.requested_at,
            reason,
            layout_evaluation: evaluation.layout_evaluation,
            properties: request.properties.clone(),
        };
        let present_response = self.present_processor.process(present_request)?;

        Ok(InAppMessageDeliverResponse {
            present_response: Some(present_response),
            ..InAppMessageDeliverResponse::of(request, InAppMessageDeliverCode::Present)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::{
        decision::DecisionReason,
        evaluation::{EvaluationEngine, InAppMessageFlowFactory},
        in_app_message::{
            EventBasedContext, InAppMessageEvaluateProcessor, InAppMessageHiddenStorage,
            InAppMessageImpressionStorage, InAppMessagePresentProcessor,
            InAppMessagePresentationContext, InAppMessagePresenter, InAppMessageSchedule,
            InAppMessageScheduleRequest, InAppMessageScheduleType, InMemoryHiddenStorage,
            InMemoryImpressionStorage, ScheduleTime,
        },
        model::{InAppMessage, InAppMessageStatus, PlatformType},
        testing::{engine, in_app_message, timestamp, workspace_with},
        user::{HackleUser, IdentifierType, UserResolver},
        workspace::WorkspaceStore,
    };

    use super::{InAppMessageDeliverCode, InAppMessageDeliverProcessor, InAppMessageDeliverRequest};

    struct FixedUser(HackleUser);

    impl UserResolver for FixedUser {
        fn resolve(&self) -> HackleUser {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        presented: Mutex<Vec<InAppMessagePresentationContext>>,
    }

    impl InAppMessagePresenter for RecordingPresenter {
        fn present(&self, context: &InAppMessagePresentationContext) {
            self.presented.lock().unwrap().push(context.clone());
        }
    }

    struct Fixture {
        workspace_store: Arc<WorkspaceStore>,
        presenter: Arc<RecordingPresenter>,
        impressions: Arc<InMemoryImpressionStorage>,
        hidden: Arc<InMemoryHiddenStorage>,
        processor: InAppMessageDeliverProcessor,
    }

    fn user(user_id: &str) -> HackleUser {
        HackleUser::builder()
            .identifier(IdentifierType::ID, "id")
            .identifier(IdentifierType::USER, user_id)
            .build()
    }

    fn fixture(current_user: HackleUser) -> Fixture {
        let engine: Arc<EvaluationEngine> = engine();
        let workspace_store = Arc::new(WorkspaceStore::new());
        let presenter = Arc::new(RecordingPresenter::default());
        let impressions = Arc::new(InMemoryImpressionStorage::new());
        let hidden = Arc::new(InMemoryHiddenStorage::new());
        let factory = InAppMessageFlowFactory::new(
            engine.target_matcher().clone(),
            impressions.clone(),
            hidden.clone(),
            PlatformType::Ios,
        );

        let processor = InAppMessageDeliverProcessor::new(
            workspace_store.clone(),
            Arc::new(FixedUser(current_user)),
            engine.clone(),
            Arc::new(InAppMessageEvaluateProcessor::new(&factory)),
            InAppMessagePresentProcessor::new(engine, presenter.clone(), impressions.clone()),
        );

        Fixture {
            workspace_store,
            presenter,
            impressions,
            hidden,
            processor,
        }
    }

    fn publish(fixture: &Fixture, in_app_message: InAppMessage) {
        fixture
            .workspace_store
            .set_workspace(workspace_with(|dto| dto.in_app_messages.push(in_app_message)));
    }

    fn request(triggered_for: &HackleUser) -> InAppMessageDeliverRequest {
        let schedule = InAppMessageSchedule {
            dispatch_id: "dispatch".into(),
            in_app_message_key: 1,
            identifiers: triggered_for.identifiers.clone(),
            time: ScheduleTime {
                started_at: timestamp(100),
                deliver_at: timestamp(100),
            },
            reason: DecisionReason::Overridden,
            event_based_context: EventBasedContext {
                insert_id: "insert".into(),
                event_key: "purchase".into(),
            },
        };
        InAppMessageDeliverRequest::from_request(&InAppMessageScheduleRequest::new(
            Arc::new(schedule),
            InAppMessageScheduleType::Triggered,
            timestamp(100),
        ))
    }

    #[test]
    fn missing_workspace_or_message() {
        let fixture = fixture(user("u1"));
        let request = request(&user("u1"));
        assert_eq!(
            fixture.processor.process(&request).code,
            InAppMessageDeliverCode::WorkspaceNotFound
        );

        publish(&fixture, in_app_message(2));
        assert_eq!(
            fixture.processor.process(&request).code,
            InAppMessageDeliverCode::InAppMessageNotFound
        );
    }

    #[test]
    fn aborts_when_user_changed() {
        let fixture = fixture(user("u2"));
        publish(&fixture, in_app_message(1));

        let response = fixture.processor.process(&request(&user("u1")));
        assert_eq!(response.code, InAppMessageDeliverCode::IdentifierChanged);
        assert!(fixture.presenter.presented.lock().unwrap().is_empty());
    }

    #[test]
    fn presents_with_trigger_reason() {
        let fixture = fixture(user("u1"));
        publish(&fixture, in_app_message(1));

        let response = fixture.processor.process(&request(&user("u1")));
        assert_eq!(response.code, InAppMessageDeliverCode::Present);
        assert_eq!(response.dispatch_id, "dispatch");

        let presented = fixture.presenter.presented.lock().unwrap();
        assert_eq!(presented.len(), 1);
        assert_eq!(presented[0].decision_reason, DecisionReason::Overridden);
        assert_eq!(
            presented[0].properties["trigger_event_insert_id"],
            serde_json::json!("insert")
        );
        // Overridden presentations do not count towards frequency caps.
        assert!(fixture.impressions.get(&in_app_message(1)).is_empty());
    }

    #[test]
    fn deduplication_without_re_evaluation() {
        let fixture = fixture(user("u1"));
        let mut paused = in_app_message(1);
        paused.status = InAppMessageStatus::Pause;
        publish(&fixture, paused.clone());

        // Paused after trigger time, but only the deduplication checks run.
        let response = fixture.processor.process(&request(&user("u1")));
        assert_eq!(response.code, InAppMessageDeliverCode::Present);

        fixture.hidden.put(&paused, timestamp(1000));
        let response = fixture.processor.process(&request(&user("u1")));
        assert_eq!(response.code, InAppMessageDeliverCode::Ineligible);
    }

    #[test]
    fn re_evaluates_at_deliver_time() {
        let fixture = fixture(user("u1"));
        let mut paused = in_app_message(1);
        paused.status = InAppMessageStatus::Pause;
        paused.evaluate_context.at_deliver_time = true;
        publish(&fixture, paused);

        let response = fixture.processor.process(&request(&user("u1")));
        assert_eq!(response.code, InAppMessageDeliverCode::Ineligible);
        assert!(fixture.presenter.presented.lock().unwrap().is_empty());
    }

    #[test]
    fn layout_failure_is_an_exception() {
        let fixture = fixture(user("u1"));
        let mut message = in_app_message(1);
        message.message_context.messages.clear();
        publish(&fixture, message);

        let response = fixture.processor.process(&request(&user("u1")));
        assert_eq!(response.code, InAppMessageDeliverCode::Exception);
        assert_eq!(response.present_response, None);
    }
}
