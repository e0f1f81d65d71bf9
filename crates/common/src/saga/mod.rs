//! Ordered step lists with compensating actions
//!
//! A [`Saga`] runs its steps in order against a shared context. When a step
//! fails, every step that already completed is compensated in reverse order
//! and the original error is returned. Compensation failures are logged and
//! counted but never replace the original error.

use crate::errors::Result;
use crate::metrics::{record_compensation, record_saga};
use async_trait::async_trait;
use std::time::Instant;

/// One forward action and its undo
#[async_trait]
pub trait SagaStep<C: Send>: Send + Sync {
    /// Step name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Perform the step, recording whatever the undo will need in `ctx`
    async fn execute(&self, ctx: &mut C) -> Result<()>;

    /// Undo a completed step. Steps with nothing to undo keep the default.
    async fn compensate(&self, _ctx: &mut C) -> Result<()> {
        Ok(())
    }
}

/// A named, ordered list of steps
pub struct Saga<C> {
    name: &'static str,
    steps: Vec<Box<dyn SagaStep<C>>>,
}

impl<C: Send> Saga<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step(mut self, step: impl SagaStep<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step, unwinding completed steps if one fails
    pub async fn run(&self, ctx: &mut C) -> Result<()> {
        let start = Instant::now();
        let mut completed: Vec<&dyn SagaStep<C>> = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            tracing::debug!(saga = self.name, step = step.name(), "Executing step");

            if let Err(err) = step.execute(ctx).await {
                tracing::warn!(
                    saga = self.name,
                    step = step.name(),
                    completed = completed.len(),
                    error = %err,
                    "Step failed, compensating"
                );
                self.unwind(completed, ctx).await;
                record_saga(self.name, "compensated", start.elapsed().as_secs_f64());
                return Err(err);
            }

            completed.push(step.as_ref());
        }

        record_saga(self.name, "completed", start.elapsed().as_secs_f64());
        tracing::info!(saga = self.name, steps = completed.len(), "Workflow completed");
        Ok(())
    }

    async fn unwind(&self, completed: Vec<&dyn SagaStep<C>>, ctx: &mut C) {
        for step in completed.into_iter().rev() {
            match step.compensate(ctx).await {
                Ok(()) => {
                    tracing::info!(saga = self.name, step = step.name(), "Step compensated");
                    record_compensation(self.name, step.name(), true);
                }
                Err(err) => {
                    tracing::error!(
                        saga = self.name,
                        step = step.name(),
                        error = %err,
                        "Compensation failed"
                    );
                    record_compensation(self.name, step.name(), false);
                }
            }
        }
    }
}
