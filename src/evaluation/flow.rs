use std::{fmt, ops::Add, sync::Arc};

use crate::Result;

use super::EvaluatorContext;

/// A single step of an [`EvaluationFlow`].
///
/// A step either decides (returns `Some`) or passes the request on to `next_flow`.
pub trait FlowEvaluator<R, E>: Send + Sync {
    fn evaluate(
        &self,
        request: &R,
        context: &mut EvaluatorContext,
        next_flow: &EvaluationFlow<R, E>,
    ) -> Result<Option<E>>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Immutable chain of [`FlowEvaluator`]s, evaluated front to back until one of them decides.
///
/// Flows are built once and shared between calls.
pub enum EvaluationFlow<R, E> {
    End,
    Decision {
        evaluator: Arc<dyn FlowEvaluator<R, E>>,
        next_flow: Arc<EvaluationFlow<R, E>>,
    },
}

impl<R, E> EvaluationFlow<R, E> {
    pub fn of(evaluators: Vec<Arc<dyn FlowEvaluator<R, E>>>) -> Self {
        evaluators
            .into_iter()
            .rev()
            .fold(EvaluationFlow::End, |next_flow, evaluator| {
                EvaluationFlow::Decision {
                    evaluator,
                    next_flow: Arc::new(next_flow),
                }
            })
    }

    /// `Ok(None)` if the request reached the end of the flow without a decision.
    pub fn evaluate(&self, request: &R, context: &mut EvaluatorContext) -> Result<Option<E>> {
        match self {
            EvaluationFlow::End => Ok(None),
            EvaluationFlow::Decision {
                evaluator,
                next_flow,
            } => evaluator.evaluate(request, context, next_flow),
        }
    }

    /// Returns a new flow that continues with `other` where this one ends.
    pub fn then(&self, other: &EvaluationFlow<R, E>) -> EvaluationFlow<R, E> {
        match self {
            EvaluationFlow::End => other.clone(),
            EvaluationFlow::Decision {
                evaluator,
                next_flow,
            } => EvaluationFlow::Decision {
                evaluator: evaluator.clone(),
                next_flow: Arc::new(next_flow.then(other)),
            },
        }
    }

    pub fn evaluators(&self) -> impl Iterator<Item = &dyn FlowEvaluator<R, E>> + '_ {
        std::iter::successors(Some(self), |flow| match flow {
            EvaluationFlow::End => None,
            EvaluationFlow::Decision { next_flow, .. } => Some(next_flow.as_ref()),
        })
        .filter_map(|flow| match flow {
            EvaluationFlow::End => None,
            EvaluationFlow::Decision { evaluator, .. } => Some(evaluator.as_ref()),
        })
    }
}

impl<R, E> Clone for EvaluationFlow<R, E> {
    fn clone(&self) -> Self {
        match self {
            EvaluationFlow::End => EvaluationFlow::End,
            EvaluationFlow::Decision {
                evaluator,
                next_flow,
            } => EvaluationFlow::Decision {
                evaluator: evaluator.clone(),
                next_flow: next_flow.clone(),
            },
        }
    }
}

impl<R, E> Add for EvaluationFlow<R, E> {
    type Output = EvaluationFlow<R, E>;

    fn add(self, rhs: Self) -> Self::Output {
        self.then(&rhs)
    }
}

impl<R, E> fmt::Debug for EvaluationFlow<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.evaluators().map(|it| it.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{EvaluationFlow, FlowEvaluator};
    use crate::{evaluation::EvaluatorContext, Result};

    /// Decides `self.0` if the request equals it, otherwise continues.
    struct Step(i32);

    impl FlowEvaluator<i32, String> for Step {
        fn evaluate(
            &self,
            request: &i32,
            context: &mut EvaluatorContext,
            next_flow: &EvaluationFlow<i32, String>,
        ) -> Result<Option<String>> {
            context.set_property(&format!("visited_{}", self.0), true);
            if *request == self.0 {
                return Ok(Some(format!("decided by {}", self.0)));
            }
            next_flow.evaluate(request, context)
        }

        fn name(&self) -> &'static str {
            match self.0 {
                1 => "one",
                2 => "two",
                3 => "three",
                _ => "other",
            }
        }
    }

    fn flow(steps: &[i32]) -> EvaluationFlow<i32, String> {
        EvaluationFlow::of(
            steps
                .iter()
                .map(|it| Arc::new(Step(*it)) as Arc<dyn FlowEvaluator<i32, String>>)
                .collect(),
        )
    }

    fn names(flow: &EvaluationFlow<i32, String>) -> Vec<&'static str> {
        flow.evaluators().map(|it| it.name()).collect()
    }

    #[test]
    fn end_does_not_decide() {
        let flow = EvaluationFlow::<i32, String>::End;
        assert_eq!(flow.evaluate(&1, &mut EvaluatorContext::new()), Ok(None));
        assert_eq!(names(&flow), Vec::<&str>::new());
    }

    #[test]
    fn keeps_evaluator_order() {
        assert_eq!(names(&flow(&[1, 2, 3])), vec!["one", "two", "three"]);
        assert_eq!(format!("{:?}", flow(&[2, 1])), r#"["two", "one"]"#);
    }

    #[test]
    fn short_circuits_on_first_decision() {
        let flow = flow(&[1, 2, 3]);
        let mut context = EvaluatorContext::new();

        assert_eq!(
            flow.evaluate(&2, &mut context),
            Ok(Some("decided by 2".to_owned()))
        );
        assert!(context.properties().contains_key("visited_1"));
        assert!(context.properties().contains_key("visited_2"));
        assert!(!context.properties().contains_key("visited_3"));
    }

    #[test]
    fn falls_through_to_end() {
        let mut context = EvaluatorContext::new();
        assert_eq!(flow(&[1, 2]).evaluate(&9, &mut context), Ok(None));
        assert_eq!(context.properties().len(), 2);
    }

    #[test]
    fn splices_flows() {
        let head = flow(&[1]);
        let tail = flow(&[2, 3]);

        let combined = head.then(&tail);
        assert_eq!(names(&combined), vec!["one", "two", "three"]);
        assert_eq!(
            combined.evaluate(&3, &mut EvaluatorContext::new()),
            Ok(Some("decided by 3".to_owned()))
        );

        assert_eq!(names(&head), vec!["one"]);
        assert_eq!(names(&(tail + flow(&[4]))), vec!["two", "three", "other"]);
    }
}
