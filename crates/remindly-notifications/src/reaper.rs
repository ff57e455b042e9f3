use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::error::NotificationError;
use crate::store::JobStore;

/// Outcome of reaping a set of requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub deleted: usize,
    pub retained: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReapOutcome {
    Deleted,
    Retained(usize),
}

/// Deletes requests whose jobs are all gone.
///
/// The remaining-job count is always queried fresh so that jobs created or
/// removed by concurrent handlers are seen. Each request is handled on its
/// own; a failure only leaves that request for a later sweep.
#[derive(Clone)]
pub struct RequestReaper {
    jobs: JobStore,
}

impl RequestReaper {
    pub fn new(jobs: JobStore) -> Self {
        Self { jobs }
    }

    pub async fn reap<I>(&self, request_ids: I) -> ReapReport
    where
        I: IntoIterator<Item = String>,
    {
        let ids: Vec<String> = request_ids.into_iter().collect();
        let outcomes = join_all(ids.iter().map(|id| self.reap_one(id))).await;

        let mut report = ReapReport::default();
        for (id, outcome) in ids.iter().zip(outcomes) {
            match outcome {
                Ok(ReapOutcome::Deleted) => report.deleted += 1,
                Ok(ReapOutcome::Retained(remaining)) => {
                    debug!(request_id = %id, remaining, "Request still has jobs");
                    report.retained += 1;
                }
                Err(e) => {
                    warn!(request_id = %id, error = %e, "Failed to reap request");
                    report.failures += 1;
                }
            }
        }
        report
    }

    async fn reap_one(&self, request_id: &str) -> Result<ReapOutcome, NotificationError> {
        let remaining = self.jobs.count_jobs_for_request(request_id).await?;
        if remaining > 0 {
            return Ok(ReapOutcome::Retained(remaining));
        }
        if self.jobs.delete_request(request_id).await? {
            info!(request_id, "Request completed and removed");
        }
        Ok(ReapOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{job_at, memory_job_store, pending_request};
    use time::macros::datetime;

    #[tokio::test]
    async fn test_deletes_only_requests_without_jobs() {
        let jobs = memory_job_store();
        let at = datetime!(2024-05-01 10:00:00 UTC);

        let done = jobs
            .create_request(&pending_request("s1", vec![at]))
            .await
            .unwrap();
        let busy = jobs
            .create_request(&pending_request("s2", vec![at]))
            .await
            .unwrap();
        jobs.create_job(&job_at(&busy, "s2", at)).await.unwrap();

        let report = RequestReaper::new(jobs.clone())
            .reap(vec![done.clone(), busy.clone()])
            .await;

        assert_eq!(
            report,
            ReapReport {
                deleted: 1,
                retained: 1,
                failures: 0
            }
        );
        assert!(jobs.get_request(&done).await.unwrap().is_none());
        assert!(jobs.get_request(&busy).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_already_deleted_request_is_fine() {
        let report = RequestReaper::new(memory_job_store())
            .reap(vec!["gone".to_string()])
            .await;
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failures, 0);
    }
}
