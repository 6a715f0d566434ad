//! The rule list and its evaluation driver.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::error::ValidationError;

/// How a chain reacts to a failing rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Stop at the first failing rule and report only its error.
    #[default]
    ExitOnError,
    /// Evaluate every rule and report all failures in declaration order.
    Accumulate,
}

/// Lifecycle of a chain: `Pending → Evaluating → {Passed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Pending,
    Evaluating,
    Passed,
    Failed,
}

/// Parameters bound to a rule plus the error it reports on failure.
pub struct RuleOptions<P> {
    pub parameters: P,
    pub error: ValidationError,
}

impl<P> RuleOptions<P> {
    pub fn new(parameters: P, error: ValidationError) -> Self {
        Self { parameters, error }
    }
}

enum Check<'a> {
    Sync(Box<dyn Fn() -> bool + Send + Sync + 'a>),
    Async(Box<dyn Fn() -> BoxFuture<'a, bool> + Send + Sync + 'a>),
}

struct Rule<'a> {
    check: Check<'a>,
    error: ValidationError,
}

/// An ordered list of validation rules.
///
/// Built with [`add`](Self::add) / [`add_async`](Self::add_async), evaluated
/// with [`validate`](Self::validate). A rule passes when its predicate
/// returns `true`. Parameters are captured at add-time, so re-running
/// `validate` sees the same snapshot.
pub struct ValidationChain<'a> {
    rules: Vec<Rule<'a>>,
    state: ChainState,
}

impl Default for ValidationChain<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ValidationChain<'a> {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            state: ChainState::Pending,
        }
    }

    /// Append a synchronous rule.
    pub fn add<P, F>(mut self, predicate: F, options: RuleOptions<P>) -> Self
    where
        P: Send + Sync + 'a,
        F: Fn(&P) -> bool + Send + Sync + 'a,
    {
        let RuleOptions { parameters, error } = options;
        self.rules.push(Rule {
            check: Check::Sync(Box::new(move || predicate(&parameters))),
            error,
        });
        self
    }

    /// Append an asynchronous rule. The predicate receives a clone of the
    /// bound parameters on every evaluation.
    pub fn add_async<P, F, Fut>(mut self, predicate: F, options: RuleOptions<P>) -> Self
    where
        P: Clone + Send + Sync + 'a,
        F: Fn(P) -> Fut + Send + Sync + 'a,
        Fut: Future<Output = bool> + Send + 'a,
    {
        let RuleOptions { parameters, error } = options;
        self.rules.push(Rule {
            check: Check::Async(Box::new(move || predicate(parameters.clone()).boxed())),
            error,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Evaluate the rules in order.
    ///
    /// # Errors
    ///
    /// In `ExitOnError` mode, the first failing rule's error. In
    /// `Accumulate` mode, every failing rule's entries merged in declaration
    /// order under the first failure's message.
    pub async fn validate(&mut self, mode: ValidationMode) -> Result<(), ValidationError> {
        self.state = ChainState::Evaluating;
        let result = self.evaluate(mode).await;
        self.state = match result {
            Ok(()) => ChainState::Passed,
            Err(_) => ChainState::Failed,
        };
        result
    }

    async fn evaluate(&self, mode: ValidationMode) -> Result<(), ValidationError> {
        let mut failures = Vec::new();

        for (index, rule) in self.rules.iter().enumerate() {
            let passed = match &rule.check {
                Check::Sync(predicate) => predicate(),
                Check::Async(predicate) => predicate().await,
            };
            if passed {
                continue;
            }

            tracing::debug!(rule = index, codes = ?rule.error.codes(), "validation rule failed");
            match mode {
                ValidationMode::ExitOnError => return Err(rule.error.clone()),
                ValidationMode::Accumulate => failures.push(&rule.error),
            }
        }

        match ValidationError::aggregate(failures) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
