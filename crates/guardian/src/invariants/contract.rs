//! Pre/postcondition wrapper for async operations.

use std::fmt::Debug;
use std::future::Future;

use super::{InvariantOptions, Invariants};
use crate::error::GuardResult;

type Precondition<'a> = (Box<dyn FnOnce() -> bool + Send + 'a>, String);
type Postcondition<'a, T> = (Box<dyn FnOnce(&T) -> bool + Send + 'a>, String);

/// Operation wrapped with preconditions checked before it runs and
/// postconditions checked against its output.
///
/// ```ignore
/// use guardian_core::invariants::Invariants;
/// use guardian_core::logger::NoopLogger;
/// use std::sync::Arc;
///
/// let checks = Invariants::new(Arc::new(NoopLogger));
/// let balance = 40;
/// let charged = checks
///     .contract::<i64>("charge")
///     .requires(move || balance >= 25, "insufficient balance")
///     .ensures(|remaining| *remaining >= 0, "balance went negative")
///     .run(|| async move { Ok(balance - 25) })
///     .await
///     .unwrap();
/// assert_eq!(charged, 15);
/// ```
pub struct Contract<'a, T> {
    invariants: &'a Invariants,
    name: String,
    preconditions: Vec<Precondition<'a>>,
    postconditions: Vec<Postcondition<'a, T>>,
}

impl<'a, T: Debug> Contract<'a, T> {
    pub(super) fn new(invariants: &'a Invariants, name: String) -> Self {
        Self {
            invariants,
            name,
            preconditions: Vec::new(),
            postconditions: Vec::new(),
        }
    }

    pub fn requires<F>(mut self, condition: F, message: impl Into<String>) -> Self
    where
        F: FnOnce() -> bool + Send + 'a,
    {
        self.preconditions.push((Box::new(condition), message.into()));
        self
    }

    pub fn ensures<F>(mut self, condition: F, message: impl Into<String>) -> Self
    where
        F: FnOnce(&T) -> bool + Send + 'a,
    {
        self.postconditions.push((Box::new(condition), message.into()));
        self
    }

    /// Check preconditions, run `operation`, then check postconditions.
    ///
    /// A failed precondition means `operation` is never invoked. A failed
    /// postcondition discards the output.
    pub async fn run<F, Fut>(self, operation: F) -> GuardResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        for (condition, message) in self.preconditions {
            self.invariants.require(
                |_: &str| condition(),
                self.name.as_str(),
                &message,
                InvariantOptions::default(),
            )?;
        }

        let output = operation().await?;

        for (condition, message) in self.postconditions {
            self.invariants
                .ensure(|out: &T| condition(out), &output, &message, InvariantOptions::default())?;
        }

        Ok(output)
    }
}
