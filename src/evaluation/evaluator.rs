use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use derive_more::{Display, From};

use crate::{
    decision::DecisionReason, event::Event, user::HackleUser, workspace::Workspace, Error,
    Result,
};

use super::{
    EvaluatorContext, ExperimentEvaluation, ExperimentRequest, InAppMessageEligibilityEvaluation,
    InAppMessageEligibilityRequest, InAppMessageLayoutEvaluation, InAppMessageLayoutRequest,
    RemoteConfigEvaluation, RemoteConfigRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EvaluatorKind {
    #[display("EXPERIMENT")]
    Experiment,
    #[display("REMOTE_CONFIG")]
    RemoteConfig,
    #[display("IN_APP_MESSAGE")]
    InAppMessage,
}

/// Identity of a request on the evaluation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{kind}[{id}]")]
pub struct EvaluatorKey {
    pub kind: EvaluatorKind,
    pub id: i64,
}

impl EvaluatorKey {
    pub fn new(kind: EvaluatorKind, id: i64) -> Self {
        EvaluatorKey { kind, id }
    }
}

/// What every request exposes to targeting.
pub trait EvaluatorRequest {
    fn key(&self) -> EvaluatorKey;
    fn workspace(&self) -> &Arc<Workspace>;
    fn user(&self) -> &Arc<HackleUser>;

    /// Event being matched, for requests evaluated against a tracked event.
    fn event(&self) -> Option<&Event> {
        None
    }
}

/// Any request the engine can evaluate.
#[derive(Debug, Clone, From)]
pub enum Request {
    Experiment(ExperimentRequest),
    RemoteConfig(RemoteConfigRequest),
    InAppMessageEligibility(InAppMessageEligibilityRequest),
    InAppMessageLayout(InAppMessageLayoutRequest),
}

impl Request {
    fn inner(&self) -> &dyn EvaluatorRequest {
        match self {
            Request::Experiment(it) => it,
            Request::RemoteConfig(it) => it,
            Request::InAppMessageEligibility(it) => it,
            Request::InAppMessageLayout(it) => it,
        }
    }
}

impl EvaluatorRequest for Request {
    fn key(&self) -> EvaluatorKey {
        self.inner().key()
    }

    fn workspace(&self) -> &Arc<Workspace> {
        self.inner().workspace()
    }

    fn user(&self) -> &Arc<HackleUser> {
        self.inner().user()
    }

    fn event(&self) -> Option<&Event> {
        self.inner().event()
    }
}

/// Result of evaluating a [`Request`]; the variant always corresponds to the request's.
#[derive(Debug, Clone, PartialEq, From)]
pub enum Evaluation {
    Experiment(ExperimentEvaluation),
    RemoteConfig(RemoteConfigEvaluation),
    InAppMessageEligibility(InAppMessageEligibilityEvaluation),
    InAppMessageLayout(InAppMessageLayoutEvaluation),
}

impl Evaluation {
    pub fn reason(&self) -> DecisionReason {
        match self {
            Evaluation::Experiment(it) => it.reason,
            Evaluation::RemoteConfig(it) => it.reason,
            Evaluation::InAppMessageEligibility(it) => it.reason,
            Evaluation::InAppMessageLayout(it) => it.reason,
        }
    }

    pub fn target_evaluations(&self) -> &[Evaluation] {
        match self {
            Evaluation::Experiment(it) => &it.target_evaluations,
            Evaluation::RemoteConfig(it) => &it.target_evaluations,
            Evaluation::InAppMessageEligibility(it) => &it.target_evaluations,
            Evaluation::InAppMessageLayout(it) => &it.target_evaluations,
        }
    }
}

/// Typed view of an [`Evaluation`] variant.
pub trait EvaluationType: Sized {
    fn from_evaluation(evaluation: Evaluation) -> Option<Self>;
}

macro_rules! evaluation_type {
    ($variant:ident, $ty:ty) => {
        impl EvaluationType for $ty {
            fn from_evaluation(evaluation: Evaluation) -> Option<Self> {
                match evaluation {
                    Evaluation::$variant(it) => Some(it),
                    _ => None,
                }
            }
        }
    };
}

evaluation_type!(Experiment, ExperimentEvaluation);
evaluation_type!(RemoteConfig, RemoteConfigEvaluation);
evaluation_type!(InAppMessageEligibility, InAppMessageEligibilityEvaluation);
evaluation_type!(InAppMessageLayout, InAppMessageLayoutEvaluation);

/// Evaluates any [`Request`].
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, request: &Request, context: &mut EvaluatorContext) -> Result<Evaluation>;
}

/// Evaluate `request` and expect an evaluation of type `E`.
pub fn evaluate_as<E: EvaluationType>(
    evaluator: &(impl Evaluator + ?Sized),
    request: &Request,
    context: &mut EvaluatorContext,
) -> Result<E> {
    let evaluation = evaluator.evaluate(request, context)?;
    E::from_evaluation(evaluation).ok_or_else(|| Error::UnexpectedEvaluation(request.key()))
}

/// An evaluator for one kind of request.
///
/// [`evaluate`](ContextualEvaluator::evaluate) keeps the request on the context stack for the
/// duration of the call, so a request that (indirectly) depends on itself fails with
/// [`Error::CircularEvaluation`] instead of recursing forever.
pub trait ContextualEvaluator: Send + Sync {
    fn supports(&self, request: &Request) -> bool;

    fn evaluate_internal(
        &self,
        request: &Request,
        context: &mut EvaluatorContext,
    ) -> Result<Evaluation>;

    fn evaluate(&self, request: &Request, context: &mut EvaluatorContext) -> Result<Evaluation> {
        let key = request.key();
        if context.contains(&key) {
            return Err(Error::CircularEvaluation(key));
        }

        let mut context = StackGuard::push(context, key);
        self.evaluate_internal(request, &mut context)
    }
}

/// Pops the key when dropped, including on early returns and unwinding.
struct StackGuard<'a> {
    context: &'a mut EvaluatorContext,
    key: EvaluatorKey,
}

impl<'a> StackGuard<'a> {
    fn push(context: &'a mut EvaluatorContext, key: EvaluatorKey) -> Self {
        context.push(key);
        StackGuard { context, key }
    }
}

impl Deref for StackGuard<'_> {
    type Target = EvaluatorContext;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl DerefMut for StackGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.context.remove(&self.key);
    }
}

/// Routes each request to the first evaluator that supports it.
pub struct DelegatingEvaluator {
    evaluators: Vec<Box<dyn ContextualEvaluator>>,
}

impl DelegatingEvaluator {
    pub fn new(evaluators: Vec<Box<dyn ContextualEvaluator>>) -> Self {
        DelegatingEvaluator { evaluators }
    }
}

impl Evaluator for DelegatingEvaluator {
    fn evaluate(&self, request: &Request, context: &mut EvaluatorContext) -> Result<Evaluation> {
        let evaluator = self
            .evaluators
            .iter()
            .find(|it| it.supports(request))
            .ok_or_else(|| Error::UnsupportedRequest(request.key()))?;

        evaluator.evaluate(request, context)
    }
}
