use crate::evaluation::EvaluatorKey;

/// Result type used throughout the decision engine.
///
/// The error variant is the crate-wide [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while evaluating a request or orchestrating in-app messages.
///
/// Most of the variants indicate that the workspace snapshot references something it does not
/// contain. These are fatal to the current evaluation call but never escape the public decision
/// APIs, which fall back to a default decision with the `EXCEPTION` reason.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Referenced bucket is missing from the workspace.
    #[error("Bucket[{0}]")]
    BucketNotFound(i64),

    /// Referenced container is missing from the workspace.
    #[error("Container[{0}]")]
    ContainerNotFound(i64),

    /// Bucketing into a container resolved a group the container does not have.
    #[error("ContainerGroup[{0}]")]
    ContainerGroupNotFound(i64),

    /// Referenced experiment is missing from the workspace.
    #[error("Experiment[{0}]")]
    ExperimentNotFound(i64),

    /// Resolved variation id is not a variation of the experiment.
    #[error("Variation[{variation_id}] (experiment: {experiment_id})")]
    VariationNotFound { experiment_id: i64, variation_id: i64 },

    /// Completed experiment has no winner variation.
    #[error("winner variation [{0}]")]
    WinnerVariationNotFound(i64),

    /// A matched feature flag rule did not resolve to a variation.
    #[error("FeatureFlag must decide the variation [{0}]")]
    UndecidedVariation(i64),

    /// Referenced parameter configuration is missing from the workspace.
    #[error("ParameterConfiguration[{0}]")]
    ParameterConfigurationNotFound(i64),

    /// Referenced segment is missing from the workspace.
    #[error("Segment[{0}]")]
    SegmentNotFound(String),

    /// No message variant of the in-app message fits the language/variation.
    #[error("InAppMessage must be decided [{0}]")]
    MessageNotFound(i64),

    /// Configured delivery delay does not fit in the calendar.
    #[error("invalid delay [{duration_millis}ms] (inAppMessageKey: {in_app_message_key})")]
    InvalidDelay {
        in_app_message_key: i64,
        duration_millis: i64,
    },

    /// Traffic allocation requested for an experiment that cannot be allocated.
    #[error("experiment status must be running and type must be AB_TEST [{0}]")]
    NotAllocatable(i64),

    /// The request is already being evaluated further up the call tree.
    #[error("circular evaluation has occurred [{0}]")]
    CircularEvaluation(EvaluatorKey),

    /// No evaluator supports the request.
    #[error("unsupported evaluator request [{0}]")]
    UnsupportedRequest(EvaluatorKey),

    /// An evaluator returned an evaluation of a different kind than requested.
    #[error("unexpected evaluation [{0}]")]
    UnexpectedEvaluation(EvaluatorKey),

    /// Target key name cannot be interpreted for its key type.
    #[error("invalid target key [{key_type}, {name}]")]
    InvalidTargetKey { key_type: String, name: String },

    /// The dispatching evaluator was dropped while a condition still referenced it.
    #[error("evaluator is no longer available")]
    EvaluatorDropped,

    /// A delay for this dispatch id is still pending.
    #[error("InAppMessageDelay already exists (dispatchId: {0})")]
    DelayAlreadyRegistered(String),

    /// A delayed schedule fired but its delay entry is gone.
    #[error("InAppMessageDelay not found (inAppMessageKey: {0})")]
    DelayNotFound(i64),

    /// Workspace snapshot could not be parsed.
    #[error("invalid workspace: {0}")]
    InvalidWorkspace(String),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::InvalidWorkspace(value.to_string())
    }
}
