use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::error::AppError;

/// Outcome of a future raced against a deadline.
#[derive(Debug)]
pub enum Timed<T> {
    Completed(T),
    TimedOut(Duration),
}

impl<T> Timed<T> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Timed::TimedOut(_))
    }
}

/// Run `fut` for at most `limit`. A future that misses the deadline is
/// dropped, which cancels whatever it was awaiting.
pub async fn within<F>(limit: Duration, fut: F) -> Timed<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(output) => Timed::Completed(output),
        Err(_) => Timed::TimedOut(limit),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Curator,
    Reaper,
    Sage,
    Store,
    Alert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Curator => "curator",
            Stage::Reaper => "reaper",
            Stage::Sage => "sage",
            Stage::Store => "store",
            Stage::Alert => "alert",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    TimedOut(Duration),
    Failed(String),
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageFailure::TimedOut(limit) => write!(f, "timed out after {limit:?}"),
            StageFailure::Failed(reason) => f.write_str(reason),
        }
    }
}

/// A pipeline failure labelled with where it happened.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} stage {failure}")]
pub struct StageError {
    pub stage: Stage,
    pub failure: StageFailure,
}

impl StageError {
    pub fn failed(stage: Stage, err: impl fmt::Display) -> Self {
        Self {
            stage,
            failure: StageFailure::Failed(err.to_string()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, StageFailure::TimedOut(_))
    }
}

/// Run one pipeline stage under its deadline, folding the timeout and the
/// stage's own error into a `StageError`.
pub async fn run_stage<T, F>(stage: Stage, limit: Duration, fut: F) -> Result<T, StageError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match within(limit, fut).await {
        Timed::Completed(Ok(value)) => Ok(value),
        Timed::Completed(Err(e)) => Err(StageError::failed(stage, e)),
        Timed::TimedOut(limit) => Err(StageError {
            stage,
            failure: StageFailure::TimedOut(limit),
        }),
    }
}
