use serde_json::Value;
use tracing::info;

use crate::error::NotificationError;
use crate::store::JobStore;
use crate::types::RequestStatus;

/// Whether an update moved a request from `pending` to `cancelled`.
pub fn is_cancellation(before: &Value, after: &Value) -> bool {
    let status = |doc: &Value| doc.get("status").and_then(Value::as_str).map(str::to_owned);
    status(before).as_deref() == Some(RequestStatus::Pending.as_str())
        && status(after).as_deref() == Some(RequestStatus::Cancelled.as_str())
}

/// Drops the still-pending jobs of a cancelled request.
///
/// Jobs a sweep has already claimed are left to finish their send.
#[derive(Clone)]
pub struct CancellationHandler {
    jobs: JobStore,
}

impl CancellationHandler {
    pub fn new(jobs: JobStore) -> Self {
        Self { jobs }
    }

    /// Returns how many pending jobs were removed.
    pub async fn on_request_cancelled(&self, request_id: &str) -> Result<usize, NotificationError> {
        let pending = self.jobs.pending_job_ids_for_request(request_id).await?;
        let deleted = self.jobs.delete_jobs(&pending).await?;
        info!(request_id, deleted, "Cancelled request's pending jobs removed");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{job_at, memory_job_store};
    use crate::types::JobStatus;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn test_only_pending_to_cancelled_matches() {
        let pending = json!({"status": "pending"});
        let cancelled = json!({"status": "cancelled"});
        let processing = json!({"status": "processing"});

        assert!(is_cancellation(&pending, &cancelled));
        assert!(!is_cancellation(&processing, &cancelled));
        assert!(!is_cancellation(&cancelled, &cancelled));
        assert!(!is_cancellation(&pending, &processing));
        assert!(!is_cancellation(&json!({}), &cancelled));
    }

    #[tokio::test]
    async fn test_only_pending_jobs_removed() {
        let jobs = memory_job_store();
        let at = datetime!(2024-05-01 10:00:00 UTC);

        let pending = jobs.create_job(&job_at("r1", "s1", at)).await.unwrap();
        let mut claimed = job_at("r1", "s1", at + time::Duration::HOUR);
        claimed.status = JobStatus::Processing;
        let claimed = jobs.create_job(&claimed).await.unwrap();
        let other = jobs.create_job(&job_at("r2", "s2", at)).await.unwrap();

        let handler = CancellationHandler::new(jobs.clone());
        assert_eq!(handler.on_request_cancelled("r1").await.unwrap(), 1);

        assert!(jobs.get_job(&pending.id).await.unwrap().is_none());
        assert!(jobs.get_job(&claimed.id).await.unwrap().is_some());
        assert!(jobs.get_job(&other.id).await.unwrap().is_some());

        // Re-running is harmless.
        assert_eq!(handler.on_request_cancelled("r1").await.unwrap(), 0);
    }
}
