//! Workspace snapshot and its thread-safe holder. [`WorkspaceStore`] provides concurrent access for
//! readers (evaluations) and writers (whatever refreshes the snapshot).
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde::Deserialize;

use crate::{
    model::{
        Bucket, Container, Experiment, ExperimentType, InAppMessage, ParameterConfiguration,
        RemoteConfigParameter, Segment,
    },
    Result,
};

/// Immutable snapshot of everything the engine evaluates against.
///
/// A workspace is never mutated. Refreshing replaces it as a whole, and every evaluation call
/// holds on to the snapshot it started with.
#[derive(Debug, Default, Deserialize)]
#[serde(from = "WorkspaceDto")]
pub struct Workspace {
    experiments: HashMap<i64, Arc<Experiment>>,
    experiment_keys: HashMap<i64, i64>,
    feature_flag_keys: HashMap<i64, i64>,
    buckets: HashMap<i64, Arc<Bucket>>,
    containers: HashMap<i64, Arc<Container>>,
    segments: HashMap<String, Arc<Segment>>,
    parameter_configurations: HashMap<i64, Arc<ParameterConfiguration>>,
    remote_config_parameters: HashMap<String, Arc<RemoteConfigParameter>>,
    in_app_messages: Vec<Arc<InAppMessage>>,
}

/// Wire shape of a workspace: flat lists that get indexed on load.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceDto {
    pub experiments: Vec<Experiment>,
    pub feature_flags: Vec<Experiment>,
    pub buckets: Vec<Bucket>,
    pub containers: Vec<Container>,
    pub segments: Vec<Segment>,
    pub parameter_configurations: Vec<ParameterConfiguration>,
    pub remote_config_parameters: Vec<RemoteConfigParameter>,
    pub in_app_messages: Vec<InAppMessage>,
}

impl From<WorkspaceDto> for Workspace {
    fn from(dto: WorkspaceDto) -> Self {
        let mut workspace = Workspace::default();

        for experiment in dto.experiments.into_iter().chain(dto.feature_flags) {
            let keys = match experiment.experiment_type {
                ExperimentType::AbTest => &mut workspace.experiment_keys,
                ExperimentType::FeatureFlag => &mut workspace.feature_flag_keys,
            };
            keys.insert(experiment.key, experiment.id);
            workspace
                .experiments
                .insert(experiment.id, Arc::new(experiment));
        }
        workspace.buckets = dto
            .buckets
            .into_iter()
            .map(|it| (it.id, Arc::new(it)))
            .collect();
        workspace.containers = dto
            .containers
            .into_iter()
            .map(|it| (it.id, Arc::new(it)))
            .collect();
        workspace.segments = dto
            .segments
            .into_iter()
            .map(|it| (it.key.clone(), Arc::new(it)))
            .collect();
        workspace.parameter_configurations = dto
            .parameter_configurations
            .into_iter()
            .map(|it| (it.id, Arc::new(it)))
            .collect();
        workspace.remote_config_parameters = dto
            .remote_config_parameters
            .into_iter()
            .map(|it| (it.key.clone(), Arc::new(it)))
            .collect();
        workspace.in_app_messages = dto.in_app_messages.into_iter().map(Arc::new).collect();

        workspace
    }
}

impl Workspace {
    /// Parse a workspace snapshot from its JSON representation.
    pub fn from_json(json: &[u8]) -> Result<Workspace> {
        Ok(serde_json::from_slice(json)?)
    }

    pub fn get_experiment(&self, experiment_key: i64) -> Option<&Arc<Experiment>> {
        let id = self.experiment_keys.get(&experiment_key)?;
        self.experiments.get(id)
    }

    pub fn get_feature_flag(&self, feature_key: i64) -> Option<&Arc<Experiment>> {
        let id = self.feature_flag_keys.get(&feature_key)?;
        self.experiments.get(id)
    }

    /// Look up an A/B test or a feature flag by id.
    pub fn get_experiment_by_id(&self, experiment_id: i64) -> Option<&Arc<Experiment>> {
        self.experiments.get(&experiment_id)
    }

    pub fn get_bucket(&self, bucket_id: i64) -> Option<&Arc<Bucket>> {
        self.buckets.get(&bucket_id)
    }

    pub fn get_container(&self, container_id: i64) -> Option<&Arc<Container>> {
        self.containers.get(&container_id)
    }

    pub fn get_segment(&self, segment_key: &str) -> Option<&Arc<Segment>> {
        self.segments.get(segment_key)
    }

    pub fn get_parameter_configuration(
        &self,
        parameter_configuration_id: i64,
    ) -> Option<&Arc<ParameterConfiguration>> {
        self.parameter_configurations
            .get(&parameter_configuration_id)
    }

    pub fn get_remote_config_parameter(
        &self,
        parameter_key: &str,
    ) -> Option<&Arc<RemoteConfigParameter>> {
        self.remote_config_parameters.get(parameter_key)
    }

    pub fn in_app_messages(&self) -> &[Arc<InAppMessage>] {
        &self.in_app_messages
    }

    pub fn get_in_app_message(&self, in_app_message_key: i64) -> Option<&Arc<InAppMessage>> {
        self.in_app_messages
            .iter()
            .find(|it| it.key == in_app_message_key)
    }
}

/// Source of the currently active workspace.
pub trait WorkspaceFetcher: Send + Sync {
    /// Returns `None` if no workspace has been loaded yet.
    fn fetch(&self) -> Option<Arc<Workspace>>;
}

/// `WorkspaceStore` provides a thread-safe (`Sync`) storage for the workspace that allows
/// concurrent access for readers and writers.
#[derive(Default)]
pub struct WorkspaceStore {
    workspace: RwLock<Option<Arc<Workspace>>>,
}

impl WorkspaceStore {
    /// Create a new empty workspace store.
    pub fn new() -> Self {
        WorkspaceStore::default()
    }

    /// Replace the active workspace. Evaluations already in flight keep the previous snapshot.
    pub fn set_workspace(&self, workspace: Arc<Workspace>) {
        let mut slot = self
            .workspace
            .write()
            .expect("thread holding workspace lock should not panic");

        *slot = Some(workspace);
    }
}

impl WorkspaceFetcher for WorkspaceStore {
    fn fetch(&self) -> Option<Arc<Workspace>> {
        // Err() is only possible if the lock is poisoned, which should never happen.
        let workspace = self
            .workspace
            .read()
            .expect("thread holding workspace lock should not panic");

        workspace.clone()
    }
}
