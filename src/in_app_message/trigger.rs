//! Turns tracked events into schedules.
use std::sync::Arc;

use crate::{
    clock::Clock,
    evaluation::{
        matcher::TargetMatcher, EvaluatorContext, EvaluatorKey, EvaluatorKind, EvaluatorRequest,
        InAppMessageEligibilityRequest,
    },
    event::{Event, TrackEvent},
    model::{InAppMessage, TriggerRule},
    user::HackleUser,
    workspace::{Workspace, WorkspaceFetcher},
    Result,
};

use super::{
    InAppMessageEvaluateProcessor, InAppMessageEvaluateType, InAppMessageSchedule,
    InAppMessageScheduleProcessor, InAppMessageScheduleRequest, InAppMessageScheduleResponse,
    InAppMessageScheduleType, InAppMessageTrigger,
};

/// Matches the audience conditions of a trigger rule against the event and its user.
struct TriggerEventRequest<'a> {
    key: EvaluatorKey,
    workspace: &'a Arc<Workspace>,
    user: Arc<HackleUser>,
    event: &'a Event,
}

impl EvaluatorRequest for TriggerEventRequest<'_> {
    fn key(&self) -> EvaluatorKey {
        self.key
    }

    fn workspace(&self) -> &Arc<Workspace> {
        self.workspace
    }

    fn user(&self) -> &Arc<HackleUser> {
        &self.user
    }

    fn event(&self) -> Option<&Event> {
        Some(self.event)
    }
}

pub struct InAppMessageTriggerEventMatcher {
    target_matcher: Arc<TargetMatcher>,
}

impl InAppMessageTriggerEventMatcher {
    pub fn new(target_matcher: Arc<TargetMatcher>) -> Self {
        InAppMessageTriggerEventMatcher { target_matcher }
    }

    /// `true` if any trigger rule of the message matches the event.
    pub fn matches(
        &self,
        workspace: &Arc<Workspace>,
        in_app_message: &InAppMessage,
        event: &TrackEvent,
    ) -> Result<bool> {
        for rule in &in_app_message.event_trigger.rules {
            if self.rule_matches(workspace, in_app_message, event, rule)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn rule_matches(
        &self,
        workspace: &Arc<Workspace>,
        in_app_message: &InAppMessage,
        event: &TrackEvent,
        rule: &TriggerRule,
    ) -> Result<bool> {
        if event.event.key != rule.event_key {
            return Ok(false);
        }
        if rule.targets.is_empty() {
            return Ok(true);
        }

        let request = TriggerEventRequest {
            key: EvaluatorKey::new(EvaluatorKind::InAppMessage, in_app_message.id),
            workspace,
            user: Arc::new(event.user.clone()),
            event: &event.event,
        };
        self.target_matcher
            .any_matches(&request, &mut EvaluatorContext::new(), &rule.targets)
    }
}

/// Finds the first message in the workspace that the event triggers and the user is eligible for.
pub struct InAppMessageTriggerDeterminer {
    workspace_fetcher: Arc<dyn WorkspaceFetcher>,
    event_matcher: InAppMessageTriggerEventMatcher,
    evaluate_processor: Arc<InAppMessageEvaluateProcessor>,
}

impl InAppMessageTriggerDeterminer {
    pub fn new(
        workspace_fetcher: Arc<dyn WorkspaceFetcher>,
        event_matcher: InAppMessageTriggerEventMatcher,
        evaluate_processor: Arc<InAppMessageEvaluateProcessor>,
    ) -> Self {
        InAppMessageTriggerDeterminer {
            workspace_fetcher,
            event_matcher,
            evaluate_processor,
        }
    }

    /// A message that cannot be evaluated is logged and skipped.
    pub fn determine(&self, event: &TrackEvent) -> Option<InAppMessageTrigger> {
        let workspace = self.workspace_fetcher.fetch()?;

        let user = Arc::new(event.user.clone());
        workspace.in_app_messages().iter().find_map(|in_app_message| {
            self.trigger(&workspace, &user, in_app_message, event)
                .unwrap_or_else(|err| {
                    log::warn!(target: "hackle",
                        in_app_message_key = in_app_message.key,
                        event_key = event.event.key.as_str();
                        "failed to evaluate in-app message trigger: {err}");
                    None
                })
        })
    }

    fn trigger(
        &self,
        workspace: &Arc<Workspace>,
        user: &Arc<HackleUser>,
        in_app_message: &Arc<InAppMessage>,
        event: &TrackEvent,
    ) -> Result<Option<InAppMessageTrigger>> {
        if !self.event_matcher.matches(workspace, in_app_message, event)? {
            return Ok(None);
        }

        let request = InAppMessageEligibilityRequest {
            workspace: workspace.clone(),
            user: user.clone(),
            in_app_message: in_app_message.clone(),
            timestamp: event.timestamp,
        };
        let evaluation = self.evaluate_processor.process(
            InAppMessageEvaluateType::Trigger,
            request,
            &mut EvaluatorContext::new(),
        )?;
        if !evaluation.is_eligible {
            return Ok(None);
        }

        Ok(Some(InAppMessageTrigger {
            in_app_message: in_app_message.clone(),
            reason: evaluation.reason,
            event: event.clone(),
        }))
    }
}

pub struct InAppMessageTriggerHandler {
    clock: Arc<dyn Clock>,
    schedule_processor: Arc<InAppMessageScheduleProcessor>,
}

impl InAppMessageTriggerHandler {
    pub fn new(clock: Arc<dyn Clock>, schedule_processor: Arc<InAppMessageScheduleProcessor>) -> Self {
        InAppMessageTriggerHandler {
            clock,
            schedule_processor,
        }
    }

    pub fn handle(&self, trigger: &InAppMessageTrigger) -> Result<InAppMessageScheduleResponse> {
        let schedule = InAppMessageSchedule::create(trigger)?;
        log::debug!(target: "hackle",
            dispatch_id = schedule.dispatch_id.as_str(),
            in_app_message_key = schedule.in_app_message_key,
            event_key = trigger.event.event.key.as_str();
            "in-app message triggered");

        let request = InAppMessageScheduleRequest::new(
            Arc::new(schedule),
            InAppMessageScheduleType::Triggered,
            self.clock.now(),
        );
        Ok(self.schedule_processor.process(&request))
    }
}

pub struct InAppMessageTriggerProcessor {
    determiner: InAppMessageTriggerDeterminer,
    handler: InAppMessageTriggerHandler,
}

impl InAppMessageTriggerProcessor {
    pub fn new(determiner: InAppMessageTriggerDeterminer, handler: InAppMessageTriggerHandler) -> Self {
        InAppMessageTriggerProcessor {
            determiner,
            handler,
        }
    }

    /// Returns the schedule response if the event triggered a message. Errors are logged.
    pub fn process(&self, event: &TrackEvent) -> Option<InAppMessageScheduleResponse> {
        let trigger = self.determiner.determine(event)?;
        match self.handler.handle(&trigger) {
            Ok(response) => Some(response),
            Err(err) => {
                log::warn!(target: "hackle",
                    in_app_message_key = trigger.in_app_message.key,
                    event_key = event.event.key.as_str();
                    "failed to schedule in-app message: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::{
        decision::DecisionReason,
        evaluation::InAppMessageFlowFactory,
        event::{Event, TrackEvent},
        in_app_message::{
            InAppMessageEvaluateProcessor, InAppMessageScheduleCode, InAppMessageScheduleProcessor,
            InAppMessageScheduleRequest, InAppMessageScheduleResponse, InAppMessageScheduleType,
            InAppMessageScheduler, InAppMessageSchedulerFactory, InAppMessageTrigger,
            InMemoryHiddenStorage, InMemoryImpressionStorage,
        },
        model::{
            DelayPolicy, InAppMessage, InAppMessageStatus, MatchOperator, PlatformType, Target,
            TargetKeyType, TriggerRule,
        },
        testing::{condition, engine, in_app_message, timestamp, workspace_with, FixedClock},
        user::HackleUser,
        value::ValueType,
        workspace::WorkspaceStore,
        Result,
    };

    use super::{
        InAppMessageTriggerDeterminer, InAppMessageTriggerEventMatcher, InAppMessageTriggerHandler,
    };

    fn purchase() -> TrackEvent {
        TrackEvent::new(Event::new("purchase"), HackleUser::of("user"), timestamp(100))
    }

    fn determiner(workspace_store: Arc<WorkspaceStore>) -> InAppMessageTriggerDeterminer {
        let engine = engine();
        let factory = InAppMessageFlowFactory::new(
            engine.target_matcher().clone(),
            Arc::new(InMemoryImpressionStorage::new()),
            Arc::new(InMemoryHiddenStorage::new()),
            PlatformType::Ios,
        );
        InAppMessageTriggerDeterminer::new(
            workspace_store,
            InAppMessageTriggerEventMatcher::new(engine.target_matcher().clone()),
            Arc::new(InAppMessageEvaluateProcessor::new(&factory)),
        )
    }

    fn determiner_with(messages: Vec<InAppMessage>) -> InAppMessageTriggerDeterminer {
        let workspace_store = Arc::new(WorkspaceStore::new());
        workspace_store.set_workspace(workspace_with(|dto| dto.in_app_messages = messages));
        determiner(workspace_store)
    }

    /// Triggered by "purchase", but only for users in a segment the workspace lacks.
    fn broken(id: i64) -> InAppMessage {
        let mut message = in_app_message(id);
        message.event_trigger.rules[0].targets = vec![Target {
            conditions: vec![condition(
                TargetKeyType::Segment,
                "SEGMENT",
                MatchOperator::In,
                ValueType::String,
                vec!["missing".into()],
            )],
        }];
        message
    }

    #[test]
    fn matches_event_key_and_event_properties() {
        let engine = engine();
        let matcher = InAppMessageTriggerEventMatcher::new(engine.target_matcher().clone());
        let workspace = workspace_with(|_| {});

        let mut message = in_app_message(1);
        message.event_trigger.rules.push(TriggerRule {
            event_key: "view".into(),
            targets: vec![Target {
                conditions: vec![condition(
                    TargetKeyType::EventProperty,
                    "page",
                    MatchOperator::In,
                    ValueType::String,
                    vec!["home".into()],
                )],
            }],
        });

        let event = |key: &str, page: &str| {
            TrackEvent::new(
                Event::new(key).property("page", page),
                HackleUser::of("user"),
                timestamp(100),
            )
        };

        // "purchase" rule has no targets.
        assert!(matcher.matches(&workspace, &message, &event("purchase", "cart")).unwrap());
        assert!(matcher.matches(&workspace, &message, &event("view", "home")).unwrap());
        assert!(!matcher.matches(&workspace, &message, &event("view", "cart")).unwrap());
        assert!(!matcher.matches(&workspace, &message, &event("click", "home")).unwrap());
        assert!(!matcher
            .matches(&workspace, &in_app_message(2), &event("view", "home"))
            .unwrap());
    }

    #[test]
    fn nothing_triggers_without_workspace() {
        let determiner = determiner(Arc::new(WorkspaceStore::new()));
        assert!(determiner.determine(&purchase()).is_none());
    }

    #[test]
    fn first_eligible_message_wins() {
        let determiner = determiner_with(vec![in_app_message(1), in_app_message(2)]);

        let trigger = determiner.determine(&purchase()).unwrap();
        assert_eq!(trigger.in_app_message.key, 1);
        assert_eq!(trigger.reason, DecisionReason::InAppMessageTarget);

        let view = TrackEvent::new(Event::new("view"), HackleUser::of("user"), timestamp(100));
        assert!(determiner.determine(&view).is_none());
    }

    #[test]
    fn ineligible_messages_are_skipped() {
        let mut paused = in_app_message(1);
        paused.status = InAppMessageStatus::Pause;
        let determiner = determiner_with(vec![paused, in_app_message(2)]);

        let trigger = determiner.determine(&purchase()).unwrap();
        assert_eq!(trigger.in_app_message.key, 2);
    }

    #[test]
    fn broken_message_does_not_block_others() {
        let determiner = determiner_with(vec![broken(1), in_app_message(2)]);

        let trigger = determiner.determine(&purchase()).unwrap();
        assert_eq!(trigger.in_app_message.key, 2);

        let determiner = determiner_with(vec![broken(1)]);
        assert!(determiner.determine(&purchase()).is_none());
    }

    /// Records requests and answers every action with its own code.
    #[derive(Default)]
    struct RecordingScheduler {
        requests: Arc<Mutex<Vec<InAppMessageScheduleRequest>>>,
    }

    impl RecordingScheduler {
        fn respond(
            &self,
            request: &InAppMessageScheduleRequest,
            code: InAppMessageScheduleCode,
        ) -> Result<InAppMessageScheduleResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(InAppMessageScheduleResponse::of(request, code))
        }
    }

    impl InAppMessageScheduler for RecordingScheduler {
        fn supports(&self, schedule_type: InAppMessageScheduleType) -> bool {
            schedule_type == InAppMessageScheduleType::Triggered
        }

        fn deliver(
            &self,
            request: &InAppMessageScheduleRequest,
        ) -> Result<InAppMessageScheduleResponse> {
            self.respond(request, InAppMessageScheduleCode::Deliver)
        }

        fn delay(
            &self,
            request: &InAppMessageScheduleRequest,
        ) -> Result<InAppMessageScheduleResponse> {
            self.respond(request, InAppMessageScheduleCode::Delay)
        }

        fn ignore(
            &self,
            request: &InAppMessageScheduleRequest,
        ) -> Result<InAppMessageScheduleResponse> {
            self.respond(request, InAppMessageScheduleCode::Ignore)
        }
    }

    #[test]
    fn handler_schedules_triggered_request_at_now() {
        let scheduler = RecordingScheduler::default();
        let requests = scheduler.requests.clone();
        let handler = InAppMessageTriggerHandler::new(
            Arc::new(FixedClock(timestamp(130))),
            Arc::new(InAppMessageScheduleProcessor::new(
                InAppMessageSchedulerFactory::new(vec![Box::new(scheduler)]),
            )),
        );

        let mut message = in_app_message(1);
        message.event_trigger.delay = DelayPolicy::After {
            duration_millis: 60_000,
        };
        let trigger = InAppMessageTrigger {
            in_app_message: Arc::new(message),
            reason: DecisionReason::InAppMessageTarget,
            event: purchase(),
        };

        let response = handler.handle(&trigger).unwrap();
        assert_eq!(response.code, InAppMessageScheduleCode::Delay);

        {
            let recorded = requests.lock().unwrap();
            assert_eq!(recorded.len(), 1);
            assert_eq!(recorded[0].schedule_type, InAppMessageScheduleType::Triggered);
            assert_eq!(recorded[0].requested_at, timestamp(130));
            assert_eq!(recorded[0].schedule.time.deliver_at, timestamp(160));
            assert_eq!(recorded[0].dispatch_id(), response.dispatch_id);
        }

        let mut overflowing = (*trigger.in_app_message).clone();
        overflowing.event_trigger.delay = DelayPolicy::After {
            duration_millis: i64::MAX / 2,
        };
        let trigger = InAppMessageTrigger {
            in_app_message: Arc::new(overflowing),
            ..trigger
        };
        assert!(handler.handle(&trigger).is_err());
        assert_eq!(requests.lock().unwrap().len(), 1);
    }
}
