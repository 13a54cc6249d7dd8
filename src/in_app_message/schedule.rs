//! Schedules: one per trigger occurrence, consumed exactly once by delivery or by a delay.
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use derive_more::Display;

use crate::{
    decision::DecisionReason,
    event::TrackEvent,
    id,
    model::{DelayPolicy, InAppMessage},
    user::Identifiers,
    Error, Result,
};

use super::{InAppMessageDeliverResponse, InAppMessageDelay};

/// An event matched a message the user is eligible for.
#[derive(Debug, Clone)]
pub struct InAppMessageTrigger {
    pub in_app_message: Arc<InAppMessage>,
    pub reason: DecisionReason,
    pub event: TrackEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime {
    pub started_at: DateTime<Utc>,
    pub deliver_at: DateTime<Utc>,
}

impl ScheduleTime {
    pub fn of(in_app_message: &InAppMessage, started_at: DateTime<Utc>) -> Result<ScheduleTime> {
        let delay = &in_app_message.event_trigger.delay;
        let deliver_at = delay.deliver_at(started_at).ok_or(Error::InvalidDelay {
            in_app_message_key: in_app_message.key,
            duration_millis: match delay {
                DelayPolicy::Immediate => 0,
                DelayPolicy::After { duration_millis } => *duration_millis,
            },
        })?;
        Ok(ScheduleTime {
            started_at,
            deliver_at,
        })
    }

    /// Time left until delivery, negative once overdue.
    pub fn delay(&self, at: DateTime<Utc>) -> Duration {
        self.deliver_at - at
    }
}

/// The tracked event a schedule originates from.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBasedContext {
    pub insert_id: String,
    pub event_key: String,
}

/// Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct InAppMessageSchedule {
    pub dispatch_id: String,
    pub in_app_message_key: i64,
    /// Identifiers of the user at trigger time.
    pub identifiers: Identifiers,
    pub time: ScheduleTime,
    /// Eligibility reason at trigger time.
    pub reason: DecisionReason,
    pub event_based_context: EventBasedContext,
}

impl InAppMessageSchedule {
    /// New schedule with a fresh dispatch id.
    pub fn create(trigger: &InAppMessageTrigger) -> Result<InAppMessageSchedule> {
        Ok(InAppMessageSchedule {
            dispatch_id: id::generate(),
            in_app_message_key: trigger.in_app_message.key,
            identifiers: trigger.event.user.identifiers.clone(),
            time: ScheduleTime::of(&trigger.in_app_message, trigger.event.timestamp)?,
            reason: trigger.reason,
            event_based_context: EventBasedContext {
                insert_id: trigger.event.insert_id.clone(),
                event_key: trigger.event.event.key.clone(),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum InAppMessageScheduleType {
    /// Straight from a tracked event.
    #[display("TRIGGERED")]
    Triggered,
    /// From a delay timer that fired.
    #[display("DELAYED")]
    Delayed,
}

#[derive(Debug, Clone)]
pub struct InAppMessageScheduleRequest {
    pub schedule: Arc<InAppMessageSchedule>,
    pub schedule_type: InAppMessageScheduleType,
    pub requested_at: DateTime<Utc>,
}

impl InAppMessageScheduleRequest {
    pub fn new(
        schedule: Arc<InAppMessageSchedule>,
        schedule_type: InAppMessageScheduleType,
        requested_at: DateTime<Utc>,
    ) -> Self {
        InAppMessageScheduleRequest {
            schedule,
            schedule_type,
            requested_at,
        }
    }

    pub fn dispatch_id(&self) -> &str {
        &self.schedule.dispatch_id
    }

    pub fn delay(&self) -> Duration {
        self.schedule.time.delay(self.requested_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum InAppMessageScheduleCode {
    #[display("DELIVER")]
    Deliver,
    #[display("DELAY")]
    Delay,
    #[display("IGNORE")]
    Ignore,
    #[display("EXCEPTION")]
    Exception,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InAppMessageScheduleResponse {
    pub dispatch_id: String,
    pub in_app_message_key: i64,
    pub code: InAppMessageScheduleCode,
    pub deliver_response: Option<InAppMessageDeliverResponse>,
    pub delay: Option<InAppMessageDelay>,
}

impl InAppMessageScheduleResponse {
    pub fn of(request: &InAppMessageScheduleRequest, code: InAppMessageScheduleCode) -> Self {
        InAppMessageScheduleResponse {
            dispatch_id: request.schedule.dispatch_id.clone(),
            in_app_message_key: request.schedule.in_app_message_key,
            code,
            deliver_response: None,
            delay: None,
        }
    }

    pub fn delivered(
        request: &InAppMessageScheduleRequest,
        deliver_response: InAppMessageDeliverResponse,
    ) -> Self {
        InAppMessageScheduleResponse {
            deliver_response: Some(deliver_response),
            ..InAppMessageScheduleResponse::of(request, InAppMessageScheduleCode::Deliver)
        }
    }

    pub fn with_delay(self, delay: Option<InAppMessageDelay>) -> Self {
        InAppMessageScheduleResponse { delay, ..self }
    }
}

/// Receives schedule requests produced asynchronously, i.e. by delay timers.
pub trait InAppMessageScheduleListener: Send + Sync {
    fn on_schedule(&self, request: InAppMessageScheduleRequest);
}
