//! Per-request context carried through every backend call

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{BackendError, Operation};

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            deadline: None,
        }
    }

    /// Context whose calls must finish within `budget` from now
    pub fn with_timeout(budget: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + budget)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Smaller of the remaining deadline and `per_call`
    pub fn budget(&self, per_call: Option<Duration>) -> Option<Duration> {
        let remaining = self
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()));
        match (remaining, per_call) {
            (Some(r), Some(c)) => Some(r.min(c)),
            (r, c) => r.or(c),
        }
    }

    /// Run one backend call under the context deadline
    pub async fn run<T, F>(
        &self,
        operation: Operation,
        per_call: Option<Duration>,
        call: F,
    ) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match self.budget(per_call) {
            Some(budget) => match tokio::time::timeout(budget, call).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!(
                        "[{}] {} exceeded its {:?} budget",
                        self.request_id,
                        operation,
                        budget
                    );
                    Err(BackendError::Timeout { operation })
                }
            },
            None => call.await,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_without_deadline_runs_to_completion() {
        let ctx = RequestContext::new();
        let value = ctx
            .run(Operation::CreatePort, None, async { Ok::<_, BackendError>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert!(!ctx.is_expired());
    }

    #[tokio::test]
    async fn expired_deadline_surfaces_timeout() {
        let ctx = RequestContext::new().with_deadline(Instant::now());
        let result = ctx
            .run(Operation::AllocateAddresses, None, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, BackendError>(())
            })
            .await;

        match result {
            Err(BackendError::Timeout { operation }) => {
                assert_eq!(operation, Operation::AllocateAddresses)
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn budget_takes_the_tighter_bound() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(60));
        let budget = ctx.budget(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(budget, Duration::from_secs(5));

        assert_eq!(RequestContext::new().budget(None), None);
    }
}
