//! Accumulates errors across a cycle so one bad record does not abort the
//! rest of the batch. Each entry carries its [`RecoveryAction`]; a cycle that
//! collected an `Escalate` finishes its work and then fails with it.

use super::{RecoveryAction, StrataError};

/// An error tagged with the step at which it occurred.
#[derive(Debug)]
pub struct ChainedError {
    pub step: usize,
    pub action: RecoveryAction,
    pub error: StrataError,
}

/// Ordered collection of non-fatal errors from one cycle.
#[derive(Debug, Default)]
pub struct ErrorChain {
    errors: Vec<ChainedError>,
}

impl ErrorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: usize, error: impl Into<StrataError>) {
        let error = error.into();
        self.errors.push(ChainedError {
            step,
            action: RecoveryAction::for_error(&error),
            error,
        });
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainedError> {
        self.errors.iter()
    }

    pub fn escalations(&self) -> usize {
        self.errors
            .iter()
            .filter(|c| c.action == RecoveryAction::Escalate)
            .count()
    }

    /// The first error no later cycle can recover from, if any.
    pub fn into_escalation(self) -> Option<StrataError> {
        self.errors
            .into_iter()
            .find(|c| c.action == RecoveryAction::Escalate)
            .map(|c| c.error)
    }

    /// Log every accumulated error as one batch summary.
    pub fn log_summary(&self, component: &str) {
        if self.errors.is_empty() {
            return;
        }
        tracing::warn!(
            component,
            error_count = self.errors.len(),
            escalated = self.escalations(),
            "{} cycle completed with {} errors",
            component,
            self.errors.len()
        );
        for chained in &self.errors {
            if chained.action == RecoveryAction::Escalate {
                tracing::error!(
                    component,
                    step = chained.step,
                    action = %chained.action,
                    error = %chained.error,
                    "{} error at step {} needs an operator",
                    component,
                    chained.step
                );
            } else {
                tracing::warn!(
                    component,
                    step = chained.step,
                    action = %chained.action,
                    error = %chained.error,
                    "{} error at step {}",
                    component,
                    chained.step
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_accumulates_in_order() {
        let mut chain = ErrorChain::new();
        assert!(!chain.has_errors());
        chain.push(1, StrataError::ValidationError("first".into()));
        chain.push(4, StrataError::ValidationError("second".into()));
        assert_eq!(chain.len(), 2);
        let steps: Vec<usize> = chain.iter().map(|c| c.step).collect();
        assert_eq!(steps, vec![1, 4]);
        assert!(chain.iter().all(|c| c.action == RecoveryAction::Fallback));
    }

    #[test]
    fn escalation_is_the_first_unrecoverable_entry() {
        let mut chain = ErrorChain::new();
        chain.push(0, StrataError::ValidationError("recoverable".into()));
        chain.push(2, StrataError::ConfigError("first".into()));
        chain.push(3, StrataError::ConfigError("second".into()));
        assert_eq!(chain.escalations(), 2);
        match chain.into_escalation() {
            Some(StrataError::ConfigError(msg)) => assert_eq!(msg, "first"),
            other => panic!("expected the first config error, got {other:?}"),
        }
    }

    #[test]
    fn recoverable_errors_do_not_escalate() {
        let mut chain = ErrorChain::new();
        chain.push(0, StrataError::ValidationError("bad output".into()));
        assert_eq!(chain.escalations(), 0);
        assert!(chain.into_escalation().is_none());
    }
}
