//! Workspace definitions: experiments, buckets, containers, targeting, remote config, and in-app
//! messages. All of them are immutable once loaded.
mod bucket;
mod experiment;
mod in_app_message;
mod remote_config;
mod target;

pub use bucket::{Bucket, Slot};
pub use experiment::{
    Action, Container, ContainerGroup, Experiment, ExperimentStatus, ExperimentType,
    ParameterConfiguration, TargetRule, Variation,
};
pub use in_app_message::{
    Button, DelayPolicy, DisplayType, DurationCap, EvaluateContext, EventTrigger,
    ExperimentContext, FrequencyCap, IdentifierCap, InAppMessage, InAppMessageStatus, Layout,
    Message, MessageContext, Orientation, Period, PlatformType, TargetContext, Text,
    TriggerRule, UserOverride,
};
pub use remote_config::{RemoteConfigParameter, RemoteConfigTargetRule, RemoteConfigValue};
pub use target::{
    Condition, Match, MatchOperator, MatchType, Segment, Target, TargetKey, TargetKeyType,
};
