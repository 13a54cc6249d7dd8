use std::sync::Arc;

use crate::{
    bucketer::{Bucketer, DefaultBucketer},
    clock::Clock,
    config::{HackleConfig, InAppMessageConfig},
    decision::{
        Decision, DecisionReason, ExperimentDecision, FeatureFlagDecision, RemoteConfigDecision,
    },
    evaluation::{
        evaluate_as, EvaluationEngine, EvaluatorContext, ExperimentEvaluation, ExperimentRequest,
        RemoteConfigEvaluation, RemoteConfigRequest, Request, DEFAULT_VARIATION_KEY,
    },
    in_app_message::InAppMessageManager,
    model::{Action, Experiment, ExperimentStatus, PlatformType, RemoteConfigParameter},
    user::HackleUser,
    value::HackleValue,
    workspace::{Workspace, WorkspaceFetcher},
    Result,
};

/// Decision entry point.
///
/// In order to create an instance, first create [`HackleConfig`]. The decision methods never
/// fail: when something goes wrong they log a warning and fall back to the default with reason
/// [`DecisionReason::Exception`].
pub struct HackleCore {
    workspace_fetcher: Arc<dyn WorkspaceFetcher>,
    clock: Arc<dyn Clock>,
    platform: PlatformType,
    bucketer: Arc<dyn Bucketer>,
    engine: Arc<EvaluationEngine>,
}

impl HackleCore {
    pub fn new(config: HackleConfig) -> Self {
        let bucketer: Arc<dyn Bucketer> = Arc::new(DefaultBucketer::default());
        HackleCore {
            workspace_fetcher: config.workspace_fetcher,
            clock: config.clock,
            platform: config.platform,
            engine: EvaluationEngine::new(bucketer.clone()),
            bucketer,
        }
    }

    /// Variation of A/B test `experiment_key` for the user. Defaults to variation "A".
    pub fn experiment(&self, experiment_key: i64, user: &HackleUser) -> ExperimentDecision {
        let default = |reason| ExperimentDecision {
            variation: DEFAULT_VARIATION_KEY.to_owned(),
            reason,
            config: None,
        };

        let Some(workspace) = self.workspace_fetcher.fetch() else {
            log::warn!(target: "hackle", experiment_key; "deciding an experiment before the workspace has been loaded");
            return default(DecisionReason::SdkNotReady);
        };
        let Some(experiment) = workspace.get_experiment(experiment_key).cloned() else {
            return default(DecisionReason::ExperimentNotFound);
        };

        match self.evaluate_experiment(&workspace, &experiment, user, DEFAULT_VARIATION_KEY) {
            Ok(evaluation) => ExperimentDecision {
                variation: evaluation.variation_key,
                reason: evaluation.reason,
                config: evaluation.config,
            },
            Err(err) => {
                log::warn!(target: "hackle",
                    experiment_key;
                    "error occurred while deciding an experiment: {err}");
                default(DecisionReason::Exception)
            }
        }
    }

    /// Whether feature flag `feature_key` is on for the user. Off unless decided otherwise.
    pub fn feature_flag(&self, feature_key: i64, user: &HackleUser) -> FeatureFlagDecision {
        let off = |reason| FeatureFlagDecision {
            is_on: false,
            reason,
            config: None,
        };

        let Some(workspace) = self.workspace_fetcher.fetch() else {
            log::warn!(target: "hackle", feature_key; "deciding a feature flag before the workspace has been loaded");
            return off(DecisionReason::SdkNotReady);
        };
        let Some(feature_flag) = workspace.get_feature_flag(feature_key).cloned() else {
            return off(DecisionReason::FeatureFlagNotFound);
        };

        match self.evaluate_experiment(&workspace, &feature_flag, user, DEFAULT_VARIATION_KEY) {
            Ok(evaluation) => FeatureFlagDecision {
                is_on: evaluation.variation_key != DEFAULT_VARIATION_KEY,
                reason: evaluation.reason,
                config: evaluation.config,
            },
            Err(err) => {
                log::warn!(target: "hackle",
                    feature_key;
                    "error occurred while deciding a feature flag: {err}");
                off(DecisionReason::Exception)
            }
        }
    }

    /// Value of remote config parameter `parameter_key`. `default_value` is returned, and
    /// determines the expected type, when no rule applies.
    pub fn remote_config(
        &self,
        parameter_key: &str,
        user: &HackleUser,
        default_value: HackleValue,
    ) -> RemoteConfigDecision {
        let Some(workspace) = self.workspace_fetcher.fetch() else {
            log::warn!(target: "hackle", parameter_key; "reading remote config before the workspace has been loaded");
            return RemoteConfigDecision {
                value: default_value,
                reason: DecisionReason::SdkNotReady,
            };
        };
        let Some(parameter) = workspace.get_remote_config_parameter(parameter_key).cloned() else {
            return RemoteConfigDecision {
                value: default_value,
                reason: DecisionReason::RemoteConfigParameterNotFound,
            };
        };

        match self.evaluate_remote_config(&workspace, &parameter, user, default_value.clone()) {
            Ok(evaluation) => RemoteConfigDecision {
                value: evaluation.value,
                reason: evaluation.reason,
            },
            Err(err) => {
                log::warn!(target: "hackle",
                    parameter_key;
                    "error occurred while reading remote config: {err}");
                RemoteConfigDecision {
                    value: default_value,
                    reason: DecisionReason::Exception,
                }
            }
        }
    }

    /// Plain bucketing decision for experiment `experiment_key`, without targeting.
    ///
    /// A completed experiment is forced to its winner, a running one to the user's override if
    /// any. Otherwise the user is hashed into the default rule's bucket.
    pub fn decide(&self, experiment_key: i64, user: &HackleUser) -> Decision {
        let Some(workspace) = self.workspace_fetcher.fetch() else {
            return Decision::NotAllocated;
        };
        let Some(experiment) = workspace.get_experiment(experiment_key) else {
            return Decision::NotAllocated;
        };

        match experiment.status {
            ExperimentStatus::Completed => match experiment.winner_variation() {
                Some(winner) => Decision::ForcedAllocated {
                    variation_key: winner.key.clone(),
                },
                None => Decision::NotAllocated,
            },
            ExperimentStatus::Running => self.decide_running(&workspace, experiment, user),
            ExperimentStatus::Draft | ExperimentStatus::Paused => Decision::NotAllocated,
        }
    }

    fn decide_running(
        &self,
        workspace: &Workspace,
        experiment: &Experiment,
        user: &HackleUser,
    ) -> Decision {
        let Some(identifier) = user.identifier(&experiment.identifier_type) else {
            return Decision::NotAllocated;
        };

        if let Some(variation) = experiment
            .user_overrides
            .get(identifier)
            .and_then(|variation_id| experiment.get_variation_by_id(*variation_id))
        {
            return Decision::ForcedAllocated {
                variation_key: variation.key.clone(),
            };
        }

        let Action::Bucket { bucket_id } = experiment.default_rule else {
            return Decision::NotAllocated;
        };
        let Some(bucket) = workspace.get_bucket(bucket_id) else {
            return Decision::NotAllocated;
        };

        match self
            .bucketer
            .bucketing(bucket, identifier)
            .and_then(|slot| experiment.get_variation_by_id(slot.variation_id))
        {
            Some(variation) if !variation.is_dropped => Decision::NaturalAllocated {
                variation: variation.clone(),
            },
            _ => Decision::NotAllocated,
        }
    }

    /// Full evaluation of an A/B test or feature flag, including nested target evaluations.
    pub fn evaluate_experiment(
        &self,
        workspace: &Arc<Workspace>,
        experiment: &Arc<Experiment>,
        user: &HackleUser,
        default_variation_key: &str,
    ) -> Result<ExperimentEvaluation> {
        let request = Request::Experiment(ExperimentRequest::with_default(
            workspace.clone(),
            Arc::new(user.clone()),
            experiment.clone(),
            default_variation_key,
        ));
        let evaluation: ExperimentEvaluation =
            evaluate_as(self.engine.as_ref(), &request, &mut EvaluatorContext::new())?;

        log::trace!(target: "hackle",
            experiment_key = experiment.key,
            variation_key = evaluation.variation_key.as_str(),
            reason:% = evaluation.reason;
            "evaluated experiment");
        Ok(evaluation)
    }

    /// Full evaluation of a remote config parameter.
    pub fn evaluate_remote_config(
        &self,
        workspace: &Arc<Workspace>,
        parameter: &Arc<RemoteConfigParameter>,
        user: &HackleUser,
        default_value: HackleValue,
    ) -> Result<RemoteConfigEvaluation> {
        let request = Request::RemoteConfig(RemoteConfigRequest {
            workspace: workspace.clone(),
            user: Arc::new(user.clone()),
            parameter: parameter.clone(),
            default_value,
        });
        let evaluation: RemoteConfigEvaluation =
            evaluate_as(self.engine.as_ref(), &request, &mut EvaluatorContext::new())?;

        log::trace!(target: "hackle",
            parameter_key = parameter.key.as_str(),
            reason:% = evaluation.reason;
            "evaluated remote config");
        Ok(evaluation)
    }

    /// Start the in-app message pipeline on top of this core's workspace and engine.
    pub fn in_app_message_manager(&self, config: InAppMessageConfig) -> Arc<InAppMessageManager> {
        InAppMessageManager::new(
            &self.engine,
            self.workspace_fetcher.clone(),
            self.clock.clone(),
            self.platform,
            config,
        )
    }
}
