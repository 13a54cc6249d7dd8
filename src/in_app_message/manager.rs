use std::sync::{Arc, Weak};

use crate::{
    clock::Clock,
    config::InAppMessageConfig,
    evaluation::{EvaluationEngine, Evaluator, InAppMessageFlowFactory},
    event::TrackEvent,
    model::PlatformType,
    user::HackleUser,
    workspace::WorkspaceFetcher,
};

use super::{
    DelayedInAppMessageScheduler, InAppMessageDelay, InAppMessageDelayManager,
    InAppMessageDelayScheduler, InAppMessageDeliverProcessor, InAppMessageEvaluateProcessor,
    InAppMessagePresentProcessor, InAppMessageResetProcessor, InAppMessageScheduleListener,
    InAppMessageScheduleProcessor, InAppMessageScheduleRequest, InAppMessageScheduleResponse,
    InAppMessageScheduler, InAppMessageSchedulerFactory, InAppMessageTriggerDeterminer,
    InAppMessageTriggerEventMatcher, InAppMessageTriggerHandler, InAppMessageTriggerProcessor,
    TriggeredInAppMessageScheduler,
};

/// Entry point of the in-app message pipeline.
///
/// Feed it every tracked event with [`on_event`](Self::on_event) and every change of the current
/// user with [`on_user_updated`](Self::on_user_updated). Delay timers call back into the manager
/// through a weak reference, so it is always handed out as an `Arc`.
pub struct InAppMessageManager {
    trigger_processor: InAppMessageTriggerProcessor,
    reset_processor: InAppMessageResetProcessor,
    schedule_processor: Arc<InAppMessageScheduleProcessor>,
    delay_manager: Arc<InAppMessageDelayManager>,
}

impl InAppMessageManager {
    pub fn new(
        engine: &Arc<EvaluationEngine>,
        workspace_fetcher: Arc<dyn WorkspaceFetcher>,
        clock: Arc<dyn Clock>,
        platform: PlatformType,
        config: InAppMessageConfig,
    ) -> Arc<InAppMessageManager> {
        Arc::new_cyclic(|manager: &Weak<InAppMessageManager>| {
            let listener: Weak<dyn InAppMessageScheduleListener> = manager.clone();
            let evaluator: Arc<dyn Evaluator> = engine.clone();

            let flow_factory = InAppMessageFlowFactory::new(
                engine.target_matcher().clone(),
                config.impression_storage.clone(),
                config.hidden_storage,
                platform,
            );
            let evaluate_processor = Arc::new(InAppMessageEvaluateProcessor::new(&flow_factory));

            let delay_manager = Arc::new(InAppMessageDelayManager::new(
                InAppMessageDelayScheduler::new(clock.clone(), config.timer_scheduler, listener),
            ));

            let deliver_processor = Arc::new(InAppMessageDeliverProcessor::new(
                workspace_fetcher.clone(),
                config.user_resolver,
                evaluator.clone(),
                evaluate_processor.clone(),
                InAppMessagePresentProcessor::new(
                    evaluator,
                    config.presenter,
                    config.impression_storage,
                ),
            ));

            let schedulers: Vec<Box<dyn InAppMessageScheduler>> = vec![
                Box::new(TriggeredInAppMessageScheduler::new(
                    deliver_processor.clone(),
                    delay_manager.clone(),
                )),
                Box::new(DelayedInAppMessageScheduler::new(
                    deliver_processor,
                    delay_manager.clone(),
                )),
            ];
            let schedule_processor = Arc::new(InAppMessageScheduleProcessor::new(
                InAppMessageSchedulerFactory::new(schedulers),
            ));

            let trigger_processor = InAppMessageTriggerProcessor::new(
                InAppMessageTriggerDeterminer::new(
                    workspace_fetcher,
                    InAppMessageTriggerEventMatcher::new(engine.target_matcher().clone()),
                    evaluate_processor,
                ),
                InAppMessageTriggerHandler::new(clock, schedule_processor.clone()),
            );

            InAppMessageManager {
                trigger_processor,
                reset_processor: InAppMessageResetProcessor::new(delay_manager.clone()),
                schedule_processor,
                delay_manager,
            }
        })
    }

    /// Schedules the first message the event triggers, if any.
    pub fn on_event(&self, event: &TrackEvent) -> Option<InAppMessageScheduleResponse> {
        self.trigger_processor.process(event)
    }

    /// Cancels pending deliveries if the user changed. Returns the cancelled delays.
    pub fn on_user_updated(
        &self,
        old_user: &HackleUser,
        new_user: &HackleUser,
    ) -> Vec<InAppMessageDelay> {
        self.reset_processor.process(old_user, new_user)
    }

    pub fn delay_manager(&self) -> &InAppMessageDelayManager {
        &self.delay_manager
    }
}

impl InAppMessageScheduleListener for InAppMessageManager {
    fn on_schedule(&self, request: InAppMessageScheduleRequest) {
        self.schedule_processor.process(&request);
    }
}
