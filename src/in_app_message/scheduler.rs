//! Decides what happens to a schedule and carries it out.
use std::sync::Arc;

use chrono::Duration;
use derive_more::Display;

use crate::{Error, Result};

use super::{
    InAppMessageDelayManager, InAppMessageDeliverProcessor, InAppMessageDeliverRequest,
    InAppMessageScheduleCode, InAppMessageScheduleRequest, InAppMessageScheduleResponse,
    InAppMessageScheduleType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum InAppMessageScheduleAction {
    #[display("DELIVER")]
    Deliver,
    #[display("DELAY")]
    Delay,
    #[display("IGNORE")]
    Ignore,
}

/// Schedules more than this overdue have expired.
const EXPIRATION_MINUTES: i64 = 1;

#[derive(Debug, Default, Clone, Copy)]
pub struct InAppMessageScheduleActionDeterminer;

impl InAppMessageScheduleActionDeterminer {
    pub fn determine(&self, request: &InAppMessageScheduleRequest) -> InAppMessageScheduleAction {
        let delay = request.delay();
        if delay > Duration::zero() {
            return InAppMessageScheduleAction::Delay;
        }

        if -delay > Duration::minutes(EXPIRATION_MINUTES) {
            InAppMessageScheduleAction::Ignore
        } else {
            InAppMessageScheduleAction::Deliver
        }
    }
}

/// Carries out a schedule action for one [`InAppMessageScheduleType`].
pub trait InAppMessageScheduler: Send + Sync {
    fn supports(&self, schedule_type: InAppMessageScheduleType) -> bool;

    fn deliver(&self, request: &InAppMessageScheduleRequest)
        -> Result<InAppMessageScheduleResponse>;

    fn delay(&self, request: &InAppMessageScheduleRequest) -> Result<InAppMessageScheduleResponse>;

    fn ignore(&self, request: &InAppMessageScheduleRequest)
        -> Result<InAppMessageScheduleResponse>;
}

/// Schedules coming straight from a trigger.
pub struct TriggeredInAppMessageScheduler {
    deliver_processor: Arc<InAppMessageDeliverProcessor>,
    delay_manager: Arc<InAppMessageDelayManager>,
}

impl TriggeredInAppMessageScheduler {
    pub fn new(
        deliver_processor: Arc<InAppMessageDeliverProcessor>,
        delay_manager: Arc<InAppMessageDelayManager>,
    ) -> Self {
        TriggeredInAppMessageScheduler {
            deliver_processor,
            delay_manager,
        }
    }
}

impl InAppMessageScheduler for TriggeredInAppMessageScheduler {
    fn supports(&self, schedule_type: InAppMessageScheduleType) -> bool {
        schedule_type == InAppMessageScheduleType::Triggered
    }

    fn deliver(
        &self,
        request: &InAppMessageScheduleRequest,
    ) -> Result<InAppMessageScheduleResponse> {
        let deliver_request = InAppMessageDeliverRequest::from_request(request);
        let deliver_response = self.deliver_processor.process(&deliver_request);
        Ok(InAppMessageScheduleResponse::delivered(
            request,
            deliver_response,
        ))
    }

    fn delay(&self, request: &InAppMessageScheduleRequest) -> Result<InAppMessageScheduleResponse> {
        let delay = self.delay_manager.register_and_delay(request)?;
        Ok(
            InAppMessageScheduleResponse::of(request, InAppMessageScheduleCode::Delay)
                .with_delay(Some(delay)),
        )
    }

    fn ignore(
        &self,
        request: &InAppMessageScheduleRequest,
    ) -> Result<InAppMessageScheduleResponse> {
        Ok(InAppMessageScheduleResponse::of(
            request,
            InAppMessageScheduleCode::Ignore,
        ))
    }
}

/// Schedules handed back by a delay timer.
pub struct DelayedInAppMessageScheduler {
    deliver_processor: Arc<InAppMessageDeliverProcessor>,
    delay_manager: Arc<InAppMessageDelayManager>,
}

impl DelayedInAppMessageScheduler {
    pub fn new(
        deliver_processor: Arc<InAppMessageDeliverProcessor>,
        delay_manager: Arc<InAppMessageDelayManager>,
    ) -> Self {
        DelayedInAppMessageScheduler {
            deliver_processor,
            delay_manager,
        }
    }
}

impl InAppMessageScheduler for DelayedInAppMessageScheduler {
    fn supports(&self, schedule_type: InAppMessageScheduleType) -> bool {
        schedule_type == InAppMessageScheduleType::Delayed
    }

    fn deliver(
        &self,
        request: &InAppMessageScheduleRequest,
    ) -> Result<InAppMessageScheduleResponse> {
        // A missing entry means the delay was cancelled while the timer was firing.
        self.delay_manager
            .delete(request.dispatch_id())
            .ok_or(Error::DelayNotFound(request.schedule.in_app_message_key))?;

        let deliver_request = InAppMessageDeliverRequest::from_request(request);
        let deliver_response = self.deliver_processor.process(&deliver_request);
        Ok(InAppMessageScheduleResponse::delivered(
            request,
            deliver_response,
        ))
    }

    fn delay(&self, request: &InAppMessageScheduleRequest) -> Result<InAppMessageScheduleResponse> {
        let delay = self.delay_manager.delay(request)?;
        Ok(
            InAppMessageScheduleResponse::of(request, InAppMessageScheduleCode::Delay)
                .with_delay(Some(delay)),
        )
    }

    fn ignore(
        &self,
        request: &InAppMessageScheduleRequest,
    ) -> Result<InAppMessageScheduleResponse> {
        let delay = self.delay_manager.delete(request.dispatch_id());
        Ok(
            InAppMessageScheduleResponse::of(request, InAppMessageScheduleCode::Ignore)
                .with_delay(delay),
        )
    }
}

pub struct InAppMessageSchedulerFactory {
    schedulers: Vec<Box<dyn InAppMessageScheduler>>,
}

impl InAppMessageSchedulerFactory {
    pub fn new(schedulers: Vec<Box<dyn InAppMessageScheduler>>) -> Self {
        InAppMessageSchedulerFactory { schedulers }
    }

    pub fn get(&self, schedule_type: InAppMessageScheduleType) -> Option<&dyn InAppMessageScheduler> {
        self.schedulers
            .iter()
            .find(|it| it.supports(schedule_type))
            .map(Box::as_ref)
    }
}

/// Entry point for every schedule request, triggered or delayed.
pub struct InAppMessageScheduleProcessor {
    action_determiner: InAppMessageScheduleActionDeterminer,
    scheduler_factory: InAppMessageSchedulerFactory,
}

impl InAppMessageScheduleProcessor {
    pub fn new(scheduler_factory: InAppMessageSchedulerFactory) -> Self {
        InAppMessageScheduleProcessor {
            action_determiner: InAppMessageScheduleActionDeterminer,
            scheduler_factory,
        }
    }

    /// Never fails: errors are logged and reported as [`InAppMessageScheduleCode::Exception`].
    pub fn process(&self, request: &InAppMessageScheduleRequest) -> InAppMessageScheduleResponse {
        match self.schedule(request) {
            Ok(response) => {
                log::debug!(target: "hackle",
                    dispatch_id = request.dispatch_id(),
                    schedule_type:% = request.schedule_type,
                    code:% = response.code;
                    "in-app message schedule processed");
                response
            }
            Err(err) => {
                log::warn!(target: "hackle",
                    dispatch_id = request.dispatch_id(),
                    schedule_type:% = request.schedule_type;
                    "failed to process in-app message schedule: {err}");
                InAppMessageScheduleResponse::of(request, InAppMessageScheduleCode::Exception)
            }
        }
    }

    fn schedule(&self, request: &InAppMessageScheduleRequest) -> Result<InAppMessageScheduleResponse> {
        let Some(scheduler) = self.scheduler_factory.get(request.schedule_type) else {
            return Ok(InAppMessageScheduleResponse::of(
                request,
                InAppMessageScheduleCode::Ignore,
            ));
        };

        match self.action_determiner.determine(request) {
            InAppMessageScheduleAction::Deliver => scheduler.deliver(request),
            InAppMessageScheduleAction::Delay => scheduler.delay(request),
            InAppMessageScheduleAction::Ignore => scheduler.ignore(request),
        }
    }
}
