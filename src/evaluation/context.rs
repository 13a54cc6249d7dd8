use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use super::{EvaluatorKey, Evaluation, ExperimentEvaluation};

/// Decision metadata accumulated while evaluating.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// State of a single evaluation call tree.
///
/// A context is created for every top-level evaluation and is never shared between concurrent
/// calls. Nested evaluations (e.g., an experiment referenced from a targeting condition) run in
/// the same context, which is how circular references are detected and how nested results are
/// reused.
#[derive(Default)]
pub struct EvaluatorContext {
    stack: Vec<EvaluatorKey>,
    target_evaluations: Vec<Evaluation>,
    properties: Properties,
    values: HashMap<TypeId, Box<dyn Any>>,
}

impl EvaluatorContext {
    pub fn new() -> Self {
        EvaluatorContext::default()
    }

    /// Requests currently being evaluated, outermost first.
    pub fn stack(&self) -> &[EvaluatorKey] {
        &self.stack
    }

    pub fn contains(&self, key: &EvaluatorKey) -> bool {
        self.stack.contains(key)
    }

    pub fn push(&mut self, key: EvaluatorKey) {
        self.stack.push(key);
    }

    pub fn remove(&mut self, key: &EvaluatorKey) {
        self.stack.retain(|it| it != key);
    }

    /// Nested evaluations consulted so far.
    pub fn target_evaluations(&self) -> &[Evaluation] {
        &self.target_evaluations
    }

    pub fn add_target_evaluation(&mut self, evaluation: Evaluation) {
        self.target_evaluations.push(evaluation);
    }

    /// Previously computed evaluation of the experiment, if any.
    pub fn get_experiment_evaluation(&self, experiment_id: i64) -> Option<&ExperimentEvaluation> {
        self.target_evaluations.iter().find_map(|it| match it {
            Evaluation::Experiment(evaluation) if evaluation.experiment.id == experiment_id => {
                Some(evaluation)
            }
            _ => None,
        })
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Null values are skipped.
    pub fn set_property(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        let value = value.into();
        if !value.is_null() {
            self.properties.insert(key.to_owned(), value);
        }
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|it| it.downcast_ref())
    }

    /// Store a value for later stages of the same call. One value per type.
    pub fn set<T: Any>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }
}
