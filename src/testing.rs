//! Fixtures shared by unit tests.
use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    bucketer::DefaultBucketer,
    clock::Clock,
    evaluation::{
        EvaluationEngine, Evaluator, EvaluatorKey, EvaluatorKind, EvaluatorRequest,
        ExperimentEvaluation, ExperimentRequest, InAppMessageLayoutRequest, RemoteConfigRequest,
    },
    event::Event,
    model::{
        Action, Bucket, Condition, DelayPolicy, DisplayType, EvaluateContext, EventTrigger,
        Experiment, ExperimentStatus, ExperimentType, InAppMessage, InAppMessageStatus, Layout,
        Match, MatchOperator, MatchType, Message, MessageContext, Period, PlatformType,
        RemoteConfigParameter, RemoteConfigValue, Slot, TargetContext, TargetKey, TargetKeyType,
        TriggerRule, Variation,
    },
    user::{HackleUser, IdentifierType},
    value::{HackleValue, ValueType},
    workspace::{Workspace, WorkspaceDto},
};

/// Running A/B test with key `id`, variations A (`id*10+1`) and B (`id*10+2`), bucketed by
/// bucket `id`.
pub fn ab_test(id: i64) -> Experiment {
    Experiment {
        id,
        key: id,
        experiment_type: ExperimentType::AbTest,
        identifier_type: IdentifierType::ID.to_owned(),
        status: ExperimentStatus::Running,
        version: 1,
        variations: vec![
            Variation {
                id: id * 10 + 1,
                key: "A".into(),
                is_dropped: false,
                parameter_configuration_id: None,
            },
            Variation {
                id: id * 10 + 2,
                key: "B".into(),
                is_dropped: false,
                parameter_configuration_id: None,
            },
        ],
        user_overrides: Default::default(),
        segment_overrides: vec![],
        target_audiences: vec![],
        target_rules: vec![],
        default_rule: Action::Bucket { bucket_id: id },
        container_id: None,
        winner_variation_id: None,
    }
}

/// Running feature flag with key `id` that is off (variation A) by default.
pub fn feature_flag(id: i64) -> Experiment {
    Experiment {
        experiment_type: ExperimentType::FeatureFlag,
        default_rule: Action::Variation {
            variation_id: id * 10 + 1,
        },
        ..ab_test(id)
    }
}

/// Bucket `bucket_id` whose only slot covers everyone.
pub fn full_bucket(bucket_id: i64, variation_id: i64) -> Bucket {
    Bucket {
        id: bucket_id,
        seed: 1,
        slot_size: 10000,
        slots: vec![Slot {
            start_inclusive: 0,
            end_exclusive: 10000,
            variation_id,
        }],
    }
}

pub fn condition(
    key_type: TargetKeyType,
    name: &str,
    operator: MatchOperator,
    value_type: ValueType,
    values: Vec<HackleValue>,
) -> Condition {
    Condition {
        key: TargetKey {
            key_type,
            name: name.to_owned(),
        },
        matcher: Match {
            match_type: MatchType::Match,
            operator,
            value_type,
            values,
        },
    }
}

pub fn workspace_with(f: impl FnOnce(&mut WorkspaceDto)) -> Arc<Workspace> {
    let mut dto = WorkspaceDto::default();
    f(&mut dto);
    Arc::new(dto.into())
}

pub fn engine() -> Arc<EvaluationEngine> {
    EvaluationEngine::new(Arc::new(DefaultBucketer::default()))
}

pub fn weak(engine: &Arc<EvaluationEngine>) -> Weak<dyn Evaluator> {
    let evaluator: Arc<dyn Evaluator> = engine.clone();
    Arc::downgrade(&evaluator)
}

/// Request for `experiment` by user "user" against an empty workspace.
pub fn experiment_request(experiment: Experiment) -> ExperimentRequest {
    ExperimentRequest::new(
        workspace_with(|_| {}),
        Arc::new(HackleUser::of("user")),
        Arc::new(experiment),
    )
}

impl ExperimentRequest {
    pub fn with_workspace(self, workspace: Arc<Workspace>) -> Self {
        ExperimentRequest { workspace, ..self }
    }

    pub fn with_user(self, user: HackleUser) -> Self {
        ExperimentRequest {
            user: Arc::new(user),
            ..self
        }
    }
}

/// Allocated evaluation of `experiment` to the variation `variation_key`.
pub fn experiment_evaluation(experiment: Experiment, variation_key: &str) -> ExperimentEvaluation {
    let variation_id = experiment
        .get_variation_by_key(variation_key)
        .map(|it| it.id);
    ExperimentEvaluation {
        reason: crate::decision::DecisionReason::TrafficAllocated,
        target_evaluations: vec![],
        experiment: Arc::new(experiment),
        variation_id,
        variation_key: variation_key.to_owned(),
        config: None,
    }
}

/// String parameter `rc_{id}` whose default value is "parameter default".
pub fn remote_config_parameter(id: i64) -> RemoteConfigParameter {
    RemoteConfigParameter {
        id,
        key: format!("rc_{id}"),
        value_type: ValueType::String,
        identifier_type: IdentifierType::ID.to_owned(),
        target_rules: vec![],
        default_value: RemoteConfigValue {
            id: 1,
            raw_value: "parameter default".into(),
        },
    }
}

pub fn remote_config_request() -> RemoteConfigRequest {
    RemoteConfigRequest {
        workspace: workspace_with(|_| {}),
        user: Arc::new(HackleUser::of("user")),
        parameter: Arc::new(remote_config_parameter(1)),
        default_value: "default".into(),
    }
}

pub fn message(lang: &str, variation_key: Option<&str>) -> Message {
    Message {
        variation_key: variation_key.map(str::to_owned),
        lang: lang.to_owned(),
        layout: Layout {
            display_type: DisplayType::Modal,
            layout_type: "IMAGE_ONLY".into(),
        },
        text: None,
        buttons: vec![],
    }
}

/// Active iOS message with key `id`, triggered by "purchase" and delivered immediately.
pub fn in_app_message(id: i64) -> InAppMessage {
    InAppMessage {
        id,
        key: id,
        status: InAppMessageStatus::Active,
        period: Period::Always,
        event_trigger: EventTrigger {
            rules: vec![TriggerRule {
                event_key: "purchase".into(),
                targets: vec![],
            }],
            frequency_cap: None,
            delay: DelayPolicy::Immediate,
        },
        target_context: TargetContext::default(),
        message_context: MessageContext {
            default_lang: "ko".into(),
            experiment_context: None,
            platform_types: vec![PlatformType::Ios],
            orientations: vec![],
            messages: vec![message("ko", None)],
        },
        evaluate_context: EvaluateContext::default(),
    }
}

pub fn layout_request(in_app_message: InAppMessage) -> InAppMessageLayoutRequest {
    InAppMessageLayoutRequest {
        workspace: workspace_with(|_| {}),
        user: Arc::new(HackleUser::of("user")),
        in_app_message: Arc::new(in_app_message),
    }
}

pub fn timestamp(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

/// Request carrying only a workspace, a user and optionally an event.
pub struct TestRequest {
    workspace: Arc<Workspace>,
    user: Arc<HackleUser>,
    event: Option<Event>,
}

impl TestRequest {
    pub fn new(workspace: Arc<Workspace>, user: HackleUser) -> Self {
        TestRequest {
            workspace,
            user: Arc::new(user),
            event: None,
        }
    }

    pub fn with_event(self, event: Event) -> Self {
        TestRequest {
            event: Some(event),
            ..self
        }
    }
}

impl EvaluatorRequest for TestRequest {
    fn key(&self) -> EvaluatorKey {
        EvaluatorKey::new(EvaluatorKind::InAppMessage, 0)
    }

    fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    fn user(&self) -> &Arc<HackleUser> {
        &self.user
    }

    fn event(&self) -> Option<&Event> {
        self.event.as_ref()
    }
}

/// Clock that follows tokio's (possibly paused) time, starting at `base`.
pub struct TokioClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        TokioClock {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.started.elapsed();
        self.base + Duration::milliseconds(elapsed.as_millis() as i64)
    }
}

/// Clock stuck at a fixed instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
