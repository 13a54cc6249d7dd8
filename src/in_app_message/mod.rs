//! In-app message pipeline: trigger, schedule, delay, deliver and present.
//!
//! A tracked event that matches a message's trigger rules creates an [`InAppMessageSchedule`]
//! with a fresh dispatch id. The [`InAppMessageScheduleProcessor`] then either delivers it right
//! away, arms a delay timer, or ignores it when it has expired. A fired timer feeds the schedule
//! back through the [`InAppMessageManager`] as a delayed request. Delivery re-checks the user and
//! eligibility before the host's [`InAppMessagePresenter`] is asked to render the message.
mod delay;
mod deliver;
mod evaluate;
mod identifier;
mod manager;
mod present;
mod reset;
mod schedule;
mod scheduler;
mod storage;
mod timer;
mod trigger;

pub use delay::{InAppMessageDelay, InAppMessageDelayManager, InAppMessageDelayScheduler};
pub use deliver::{
    InAppMessageDeliverCode, InAppMessageDeliverProcessor, InAppMessageDeliverRequest,
    InAppMessageDeliverResponse,
};
pub use evaluate::{InAppMessageEvaluateProcessor, InAppMessageEvaluateType};
pub use identifier::InAppMessageIdentifierChecker;
pub use manager::InAppMessageManager;
pub use present::{
    InAppMessageImpressionRecorder, InAppMessagePresentProcessor, InAppMessagePresentRequest,
    InAppMessagePresentResponse, InAppMessagePresentationContext,
    InAppMessagePresentationContextResolver, InAppMessagePresenter,
};
pub use reset::InAppMessageResetProcessor;
pub use schedule::{
    EventBasedContext, InAppMessageSchedule, InAppMessageScheduleCode,
    InAppMessageScheduleListener, InAppMessageScheduleRequest, InAppMessageScheduleResponse,
    InAppMessageScheduleType, InAppMessageTrigger, ScheduleTime,
};
pub use scheduler::{
    DelayedInAppMessageScheduler, InAppMessageScheduleAction,
    InAppMessageScheduleActionDeterminer, InAppMessageScheduleProcessor, InAppMessageScheduler,
    InAppMessageSchedulerFactory, TriggeredInAppMessageScheduler,
};
pub use storage::{
    InAppMessageHiddenStorage, InAppMessageImpression, InAppMessageImpressionStorage,
    InMemoryHiddenStorage, InMemoryImpressionStorage, IMPRESSION_MAX_SIZE,
};
pub use timer::{TimerJob, TimerScheduler, TokioScheduler};
pub use trigger::{
    InAppMessageTriggerDeterminer, InAppMessageTriggerEventMatcher, InAppMessageTriggerHandler,
    InAppMessageTriggerProcessor,
};
