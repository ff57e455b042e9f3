use tracing::{info, warn};

use crate::store::JobStore;

/// What a schedule teardown removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub requests_deleted: usize,
    pub jobs_deleted: usize,
    /// Number of cleanup steps that failed and were only logged
    pub failures: usize,
}

/// Cascades a schedule deletion to every request and job that references it.
///
/// Each step is independent and safe to re-run; a failed step is logged and
/// does not stop the other.
#[derive(Clone)]
pub struct ScheduleTeardown {
    jobs: JobStore,
}

impl ScheduleTeardown {
    pub fn new(jobs: JobStore) -> Self {
        Self { jobs }
    }

    pub async fn on_schedule_deleted(&self, schedule_id: &str) -> TeardownReport {
        let mut report = TeardownReport::default();

        let requests = match self.jobs.request_ids_for_schedule(schedule_id).await {
            Ok(ids) => self.jobs.delete_requests(&ids).await,
            Err(e) => Err(e),
        };
        match requests {
            Ok(count) => report.requests_deleted = count,
            Err(e) => {
                warn!(schedule_id, error = %e, "Failed to delete requests for schedule");
                report.failures += 1;
            }
        }

        let jobs = match self.jobs.job_ids_for_schedule(schedule_id).await {
            Ok(ids) => self.jobs.delete_jobs(&ids).await,
            Err(e) => Err(e),
        };
        match jobs {
            Ok(count) => report.jobs_deleted = count,
            Err(e) => {
                warn!(schedule_id, error = %e, "Failed to delete jobs for schedule");
                report.failures += 1;
            }
        }

        info!(
            schedule_id,
            requests = report.requests_deleted,
            jobs = report.jobs_deleted,
            "Schedule teardown complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{job_at, memory_job_store, pending_request};
    use crate::types::JobStatus;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_removes_everything_for_schedule() {
        let jobs = memory_job_store();
        let at = datetime!(2024-05-01 10:00:00 UTC);

        let request_id = jobs
            .create_request(&pending_request("s1", vec![at]))
            .await
            .unwrap();
        let keep_request = jobs
            .create_request(&pending_request("s2", vec![at]))
            .await
            .unwrap();

        jobs.create_job(&job_at(&request_id, "s1", at)).await.unwrap();
        let mut claimed = job_at(&request_id, "s1", at);
        claimed.status = JobStatus::Processing;
        jobs.create_job(&claimed).await.unwrap();
        jobs.create_job(&job_at("orphan", "s1", at)).await.unwrap();
        let keep_job = jobs.create_job(&job_at(&keep_request, "s2", at)).await.unwrap();

        let report = ScheduleTeardown::new(jobs.clone())
            .on_schedule_deleted("s1")
            .await;
        assert_eq!(
            report,
            TeardownReport {
                requests_deleted: 1,
                jobs_deleted: 3,
                failures: 0
            }
        );

        assert!(jobs.request_ids_for_schedule("s1").await.unwrap().is_empty());
        assert!(jobs.job_ids_for_schedule("s1").await.unwrap().is_empty());
        assert!(jobs.get_request(&keep_request).await.unwrap().is_some());
        assert!(jobs.get_job(&keep_job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_schedule_is_noop() {
        let report = ScheduleTeardown::new(memory_job_store())
            .on_schedule_deleted("missing")
            .await;
        assert_eq!(report, TeardownReport::default());
    }
}
