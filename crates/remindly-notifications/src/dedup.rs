use time::OffsetDateTime;
use tracing::debug;

use crate::error::NotificationError;
use crate::store::JobStore;

/// Decides whether a `(schedule, time)` pair already has a live job.
///
/// Guards against a creation event being delivered twice, or two intakes for
/// the same schedule running side by side.
#[derive(Clone)]
pub struct DedupGuard {
    jobs: JobStore,
}

impl DedupGuard {
    pub fn new(jobs: JobStore) -> Self {
        Self { jobs }
    }

    pub async fn is_duplicate(
        &self,
        schedule_id: &str,
        notification_time: OffsetDateTime,
    ) -> Result<bool, NotificationError> {
        let duplicate = self
            .jobs
            .has_pending_job_at(schedule_id, notification_time)
            .await?;
        if duplicate {
            debug!(
                schedule_id,
                notification_time = %notification_time,
                "Pending job already exists for this time"
            );
        }
        Ok(duplicate)
    }
}
