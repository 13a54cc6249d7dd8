//! Resolvers shared by the experiment flow evaluators.
use std::sync::Arc;

use crate::{
    bucketer::Bucketer,
    model::{Action, Container, Variation},
    Error, Result,
};

use super::{matcher::TargetMatcher, EvaluatorContext, ExperimentRequest};

/// Resolves a rule action to a variation of the requested experiment.
pub struct ActionResolver {
    bucketer: Arc<dyn Bucketer>,
}

impl ActionResolver {
    pub fn new(bucketer: Arc<dyn Bucketer>) -> Self {
        ActionResolver { bucketer }
    }

    /// `Ok(None)` if a bucket action does not allocate the user.
    pub fn resolve_or_none<'a>(
        &self,
        request: &'a ExperimentRequest,
        action: &Action,
    ) -> Result<Option<&'a Variation>> {
        let experiment = &request.experiment;
        match *action {
            Action::Variation { variation_id } => experiment
                .get_variation_by_id(variation_id)
                .map(Some)
                .ok_or(Error::VariationNotFound {
                    experiment_id: experiment.id,
                    variation_id,
                }),
            Action::Bucket { bucket_id } => {
                let bucket = request
                    .workspace
                    .get_bucket(bucket_id)
                    .ok_or(Error::BucketNotFound(bucket_id))?;
                let Some(identifier) = request.identifier() else {
                    return Ok(None);
                };
                let Some(slot) = self.bucketer.bucketing(bucket, identifier) else {
                    return Ok(None);
                };
                Ok(experiment.get_variation_by_id(slot.variation_id))
            }
        }
    }
}

/// Resolves a manually assigned variation: user overrides first, then segment overrides.
pub struct OverrideResolver {
    target_matcher: Arc<TargetMatcher>,
    action_resolver: Arc<ActionResolver>,
}

impl OverrideResolver {
    pub fn new(target_matcher: Arc<TargetMatcher>, action_resolver: Arc<ActionResolver>) -> Self {
        OverrideResolver {
            target_matcher,
            action_resolver,
        }
    }

    pub fn resolve_or_none<'a>(
        &self,
        request: &'a ExperimentRequest,
        context: &mut EvaluatorContext,
    ) -> Result<Option<&'a Variation>> {
        if let Some(variation) = self.resolve_user_override(request) {
            return Ok(Some(variation));
        }
        self.resolve_segment_override(request, context)
    }

    fn resolve_user_override<'a>(&self, request: &'a ExperimentRequest) -> Option<&'a Variation> {
        let identifier = request.identifier()?;
        let variation_id = request.experiment.user_overrides.get(identifier)?;
        request.experiment.get_variation_by_id(*variation_id)
    }

    fn resolve_segment_override<'a>(
        &self,
        request: &'a ExperimentRequest,
        context: &mut EvaluatorContext,
    ) -> Result<Option<&'a Variation>> {
        for rule in &request.experiment.segment_overrides {
            if self.target_matcher.matches(request, context, &rule.target)? {
                return self.action_resolver.resolve_or_none(request, &rule.action);
            }
        }
        Ok(None)
    }
}

/// Decides whether the user's container slot belongs to a group that contains the experiment.
pub struct ContainerResolver {
    bucketer: Arc<dyn Bucketer>,
}

impl ContainerResolver {
    pub fn new(bucketer: Arc<dyn Bucketer>) -> Self {
        ContainerResolver { bucketer }
    }

    pub fn is_user_in_container_group(
        &self,
        request: &ExperimentRequest,
        container: &Container,
    ) -> Result<bool> {
        let Some(identifier) = request.identifier() else {
            return Ok(false);
        };
        let bucket = request
            .workspace
            .get_bucket(container.bucket_id)
            .ok_or(Error::BucketNotFound(container.bucket_id))?;
        let Some(slot) = self.bucketer.bucketing(bucket, identifier) else {
            return Ok(false);
        };
        // Container slots are labeled with group ids.
        let group = container
            .get_group(slot.variation_id)
            .ok_or(Error::ContainerGroupNotFound(slot.variation_id))?;
        Ok(group.experiments.contains(&request.experiment.id))
    }
}
