use std::sync::Arc;

use crate::{
    decision::DecisionReason,
    model::{Experiment, ParameterConfiguration, Variation},
    user::HackleUser,
    workspace::Workspace,
    Error, Result,
};

use super::{
    ContextualEvaluator, Evaluation, EvaluatorContext, EvaluatorKey, EvaluatorKind,
    EvaluatorRequest, ExperimentFlowFactory, Request,
};

pub const DEFAULT_VARIATION_KEY: &str = "A";

/// Request to evaluate an A/B test or a feature flag.
#[derive(Debug, Clone)]
pub struct ExperimentRequest {
    pub workspace: Arc<Workspace>,
    pub user: Arc<HackleUser>,
    pub experiment: Arc<Experiment>,
    pub default_variation_key: String,
}

impl ExperimentRequest {
    pub fn new(
        workspace: Arc<Workspace>,
        user: Arc<HackleUser>,
        experiment: Arc<Experiment>,
    ) -> ExperimentRequest {
        ExperimentRequest::with_default(workspace, user, experiment, DEFAULT_VARIATION_KEY)
    }

    pub fn with_default(
        workspace: Arc<Workspace>,
        user: Arc<HackleUser>,
        experiment: Arc<Experiment>,
        default_variation_key: &str,
    ) -> ExperimentRequest {
        ExperimentRequest {
            workspace,
            user,
            experiment,
            default_variation_key: default_variation_key.to_owned(),
        }
    }

    /// Identifier of the experiment's identifier type, if the user has one.
    pub fn identifier(&self) -> Option<&str> {
        self.user.identifier(&self.experiment.identifier_type)
    }
}

impl EvaluatorRequest for ExperimentRequest {
    fn key(&self) -> EvaluatorKey {
        EvaluatorKey::new(EvaluatorKind::Experiment, self.experiment.id)
    }

    fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    fn user(&self) -> &Arc<HackleUser> {
        &self.user
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentEvaluation {
    pub reason: DecisionReason,
    pub target_evaluations: Vec<Evaluation>,
    pub experiment: Arc<Experiment>,
    /// `None` when the default variation key is not a variation of the experiment.
    pub variation_id: Option<i64>,
    pub variation_key: String,
    pub config: Option<Arc<ParameterConfiguration>>,
}

impl ExperimentEvaluation {
    pub fn of(
        request: &ExperimentRequest,
        context: &EvaluatorContext,
        variation: &Variation,
        reason: DecisionReason,
    ) -> Result<ExperimentEvaluation> {
        let config = variation
            .parameter_configuration_id
            .map(|id| {
                request
                    .workspace
                    .get_parameter_configuration(id)
                    .cloned()
                    .ok_or(Error::ParameterConfigurationNotFound(id))
            })
            .transpose()?;

        Ok(ExperimentEvaluation {
            reason,
            target_evaluations: context.target_evaluations().to_vec(),
            experiment: request.experiment.clone(),
            variation_id: Some(variation.id),
            variation_key: variation.key.clone(),
            config,
        })
    }

    /// Evaluation to the request's default variation.
    pub fn of_default(
        request: &ExperimentRequest,
        context: &EvaluatorContext,
        reason: DecisionReason,
    ) -> Result<ExperimentEvaluation> {
        match request
            .experiment
            .get_variation_by_key(&request.default_variation_key)
        {
            Some(variation) => ExperimentEvaluation::of(request, context, variation, reason),
            None => Ok(ExperimentEvaluation {
                reason,
                target_evaluations: context.target_evaluations().to_vec(),
                experiment: request.experiment.clone(),
                variation_id: None,
                variation_key: request.default_variation_key.clone(),
                config: None,
            }),
        }
    }

    pub fn with(self, reason: DecisionReason) -> ExperimentEvaluation {
        ExperimentEvaluation { reason, ..self }
    }
}

/// Evaluates A/B tests and feature flags through the flow of their experiment type.
pub struct ExperimentEvaluator {
    flow_factory: ExperimentFlowFactory,
}

impl ExperimentEvaluator {
    pub fn new(flow_factory: ExperimentFlowFactory) -> Self {
        ExperimentEvaluator { flow_factory }
    }
}

impl ContextualEvaluator for ExperimentEvaluator {
    fn supports(&self, request: &Request) -> bool {
        matches!(request, Request::Experiment(_))
    }

    fn evaluate_internal(
        &self,
        request: &Request,
        context: &mut EvaluatorContext,
    ) -> Result<Evaluation> {
        let Request::Experiment(request) = request else {
            return Err(Error::UnsupportedRequest(request.key()));
        };

        let flow = self.flow_factory.get(request.experiment.experiment_type);
        let evaluation = match flow.evaluate(request, context)? {
            Some(evaluation) => evaluation,
            None => {
                ExperimentEvaluation::of_default(request, context, DecisionReason::TrafficNotAllocated)?
            }
        };

        log::trace!(target: "hackle",
            experiment_key = request.experiment.key,
            variation_key = evaluation.variation_key.as_str(),
            reason:% = evaluation.reason;
            "evaluated an experiment");
        Ok(evaluation.into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        decision::DecisionReason,
        evaluation::EvaluatorContext,
        model::ParameterConfiguration,
        testing::{ab_test, experiment_request, workspace_with},
        Error,
    };

    use super::ExperimentEvaluation;

    #[test]
    fn attaches_parameter_configuration() {
        let mut experiment = ab_test(1);
        experiment.variations[1].parameter_configuration_id = Some(100);
        let workspace = workspace_with(|dto| {
            dto.parameter_configurations.push(ParameterConfiguration {
                id: 100,
                parameters: [("color".to_owned(), "red".into())].into(),
            })
        });
        let request = experiment_request(experiment.clone()).with_workspace(workspace);
        let context = EvaluatorContext::new();

        let evaluation = ExperimentEvaluation::of(
            &request,
            &context,
            &experiment.variations[1],
            DecisionReason::TrafficAllocated,
        )
        .unwrap();
        assert_eq!(evaluation.variation_key, "B");
        assert_eq!(evaluation.config.unwrap().get("color"), Some(&"red".into()));
    }

    #[test]
    fn missing_parameter_configuration_is_an_error() {
        let mut experiment = ab_test(1);
        experiment.variations[0].parameter_configuration_id = Some(404);
        let request = experiment_request(experiment.clone());

        assert_eq!(
            ExperimentEvaluation::of(
                &request,
                &EvaluatorContext::new(),
                &experiment.variations[0],
                DecisionReason::TrafficAllocated,
            ),
            Err(Error::ParameterConfigurationNotFound(404))
        );
    }

    #[test]
    fn default_variation_outside_experiment() {
        let mut request = experiment_request(ab_test(1));
        request.default_variation_key = "Z".into();

        let evaluation = ExperimentEvaluation::of_default(
            &request,
            &EvaluatorContext::new(),
            DecisionReason::ExperimentDraft,
        )
        .unwrap();
        assert_eq!(evaluation.variation_id, None);
        assert_eq!(evaluation.variation_key, "Z");
        assert_eq!(evaluation.reason, DecisionReason::ExperimentDraft);
        assert!(Arc::ptr_eq(&evaluation.experiment, &request.experiment));
    }
}
