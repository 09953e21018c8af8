//! Drives long-running platform operations to a terminal state.

use std::time::Duration;

use azure_api::{BoxPoller, PollState};
use tokio::time::Instant;

use crate::{Error, Result, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LroConfig {
    /// Delay between polls when the platform gives no `Retry-After` hint.
    pub poll_interval: Duration,
    /// Overall bound per operation. `None` waits as long as the platform does.
    pub max_wait: Option<Duration>,
}

impl Default for LroConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_wait: None,
        }
    }
}

/// Terminal state of a long-running operation.
#[derive(Debug)]
pub enum OperationOutcome<T> {
    Succeeded(T),
    Failed(azure_api::Error),
    TimedOut(Duration),
}

/// Poll until the operation succeeds, fails or exceeds `config.max_wait`.
pub async fn await_operation<T>(mut poller: BoxPoller<T>, config: &LroConfig) -> OperationOutcome<T> {
    let started = Instant::now();

    loop {
        let delay = match poller.poll().await {
            Ok(PollState::Succeeded(value)) => return OperationOutcome::Succeeded(value),
            Ok(PollState::Failed(message)) => {
                return OperationOutcome::Failed(azure_api::Error::Operation(message));
            }
            Ok(PollState::Pending { retry_after }) => retry_after.unwrap_or(config.poll_interval),
            Err(e) => return OperationOutcome::Failed(e),
        };

        if let Some(max_wait) = config.max_wait {
            let elapsed = started.elapsed();
            if elapsed + delay > max_wait {
                return OperationOutcome::TimedOut(max_wait);
            }
        }

        tokio::time::sleep(delay).await;
    }
}

/// Start-and-wait helper: turns the result of a `begin_*` call plus its
/// outcome into a single `Result`, labelling any failure with `step`.
pub async fn complete<T>(
    step: Step,
    begin: azure_api::Result<BoxPoller<T>>,
    config: &LroConfig,
) -> Result<T> {
    let poller = begin.map_err(Error::remote(step))?;
    match await_operation(poller, config).await {
        OperationOutcome::Succeeded(value) => Ok(value),
        OperationOutcome::Failed(source) => Err(Error::Remote { step, source }),
        OperationOutcome::TimedOut(timeout) => Err(Error::OperationTimedOut { step, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPoller;

    #[tokio::test(start_paused = true)]
    async fn waits_for_success() {
        let poller = ScriptedPoller::pending_then(3, Ok(42u32), None);
        let started = Instant::now();

        let outcome = await_operation(Box::new(poller), &LroConfig::default()).await;

        assert!(matches!(outcome, OperationOutcome::Succeeded(42)));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn honours_retry_after_hint() {
        let poller = ScriptedPoller::pending_then(2, Ok(()), Some(Duration::from_secs(10)));
        let started = Instant::now();

        let outcome = await_operation(Box::new(poller), &LroConfig::default()).await;

        assert!(matches!(outcome, OperationOutcome::Succeeded(())));
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn reports_platform_failure() {
        let poller = ScriptedPoller::<()>::pending_then(1, Err("QuotaExceeded: no cores left".into()), None);

        match await_operation(Box::new(poller), &LroConfig::default()).await {
            OperationOutcome::Failed(e) => assert!(e.to_string().contains("QuotaExceeded")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_wait() {
        let poller = ScriptedPoller::pending_then(1_000, Ok(()), None);
        let config = LroConfig {
            poll_interval: Duration::from_secs(1),
            max_wait: Some(Duration::from_secs(5)),
        };
        let started = Instant::now();

        let outcome = await_operation(Box::new(poller), &config).await;

        assert!(matches!(outcome, OperationOutcome::TimedOut(d) if d == Duration::from_secs(5)));
        assert!(started.elapsed() <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn complete_labels_errors_with_step() {
        let begin: azure_api::Result<BoxPoller<()>> =
            Err(azure_api::Error::Operation("conflict".into()));

        let err = complete(Step::DeleteSubnet, begin, &LroConfig::default())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "cannot delete subnet: azure operation error: conflict");
    }
}
