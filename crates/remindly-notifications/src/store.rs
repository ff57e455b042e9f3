use remindly_storage::{BatchOp, DynStore, Query, StoredDocument};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::NotificationError;
use crate::types::{
    JOBS_COLLECTION, JobStatus, NotificationJob, NotificationRequest, REQUESTS_COLLECTION,
    RequestStatus, SCHEDULES_COLLECTION, Schedule, epoch_millis,
};

/// Upper bound on re-running a transaction body after commit conflicts.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// Typed access to the request, job and schedule collections.
///
/// Every method is a single store call (or one transaction) so callers can
/// reason about exactly which operations may interleave with other handlers.
#[derive(Clone)]
pub struct JobStore {
    store: DynStore,
}

impl JobStore {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &DynStore {
        &self.store
    }

    // ==================== Requests ====================

    pub async fn create_request(
        &self,
        request: &NotificationRequest,
    ) -> Result<String, NotificationError> {
        let doc = self
            .store
            .create(REQUESTS_COLLECTION, request.to_fields()?)
            .await?;
        Ok(doc.id)
    }

    pub async fn get_request(
        &self,
        id: &str,
    ) -> Result<Option<NotificationRequest>, NotificationError> {
        self.store
            .get(REQUESTS_COLLECTION, id)
            .await?
            .map(|doc| NotificationRequest::from_document(&doc.id, &doc.data))
            .transpose()
    }

    pub async fn mark_request_failed(&self, id: &str, error: &str) -> Result<(), NotificationError> {
        self.store
            .update(
                REQUESTS_COLLECTION,
                id,
                json!({"status": RequestStatus::Failed, "error": error}),
            )
            .await?;
        Ok(())
    }

    /// Moves a pending request to `processing` with its final job count.
    ///
    /// Returns `false` if the request is gone or was moved out of `pending`
    /// by someone else in the meantime.
    pub async fn mark_request_processing(
        &self,
        id: &str,
        job_count: u32,
    ) -> Result<bool, NotificationError> {
        self.transact(REQUESTS_COLLECTION, id, |doc| {
            let Some(doc) = doc else {
                return Ok((false, None));
            };
            let request = NotificationRequest::from_document(&doc.id, &doc.data)?;
            if !request.status.can_transition_to(RequestStatus::Processing) {
                return Ok((false, None));
            }
            Ok((
                true,
                Some(json!({"status": RequestStatus::Processing, "jobCount": job_count})),
            ))
        })
        .await
    }

    /// Moves a request to `cancelled` only while it is still `pending`.
    ///
    /// Returns the status found if the request could not be cancelled.
    pub async fn cancel_request(&self, id: &str) -> Result<CancelOutcome, NotificationError> {
        self.transact(REQUESTS_COLLECTION, id, |doc| {
            let Some(doc) = doc else {
                return Ok((CancelOutcome::NotFound, None));
            };
            let request = NotificationRequest::from_document(&doc.id, &doc.data)?;
            if request.status != RequestStatus::Pending {
                return Ok((CancelOutcome::NotPending(request.status), None));
            }
            Ok((
                CancelOutcome::Cancelled,
                Some(json!({"status": RequestStatus::Cancelled})),
            ))
        })
        .await
    }

    /// Returns `true` if a document was removed.
    pub async fn delete_request(&self, id: &str) -> Result<bool, NotificationError> {
        Ok(self.store.delete(REQUESTS_COLLECTION, id).await?.is_some())
    }

    pub async fn request_ids_for_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<Vec<String>, NotificationError> {
        let query = Query::new().where_eq("scheduleId", schedule_id);
        let docs = self.store.query(REQUESTS_COLLECTION, &query).await?;
        Ok(ids(docs))
    }

    /// Requests in `processing` or `cancelled`, up to `limit` of each.
    ///
    /// These no longer receive new jobs, so once none remain they can be
    /// reaped.
    pub async fn settled_request_ids(&self, limit: usize) -> Result<Vec<String>, NotificationError> {
        let mut settled = Vec::new();
        for status in [RequestStatus::Processing, RequestStatus::Cancelled] {
            let query = Query::new()
                .where_eq("status", status.as_str())
                .with_limit(limit);
            settled.extend(ids(self.store.query(REQUESTS_COLLECTION, &query).await?));
        }
        Ok(settled)
    }

    pub async fn delete_requests(&self, ids: &[String]) -> Result<usize, NotificationError> {
        self.delete_batch(REQUESTS_COLLECTION, ids).await
    }

    // ==================== Jobs ====================

    /// Persists a job and returns it with its store-assigned ID.
    pub async fn create_job(
        &self,
        job: &NotificationJob,
    ) -> Result<NotificationJob, NotificationError> {
        let doc = self.store.create(JOBS_COLLECTION, job.to_fields()?).await?;
        let mut created = job.clone();
        created.id = doc.id;
        Ok(created)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<NotificationJob>, NotificationError> {
        self.store
            .get(JOBS_COLLECTION, id)
            .await?
            .map(|doc| NotificationJob::from_document(&doc.id, &doc.data))
            .transpose()
    }

    pub async fn pending_job_ids_for_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<Vec<String>, NotificationError> {
        let query = Query::new()
            .where_eq("scheduleId", schedule_id)
            .where_eq("status", JobStatus::Pending.as_str());
        Ok(ids(self.store.query(JOBS_COLLECTION, &query).await?))
    }

    pub async fn pending_job_ids_for_request(
        &self,
        request_id: &str,
    ) -> Result<Vec<String>, NotificationError> {
        let query = Query::new()
            .where_eq("requestId", request_id)
            .where_eq("status", JobStatus::Pending.as_str());
        Ok(ids(self.store.query(JOBS_COLLECTION, &query).await?))
    }

    /// All jobs for a schedule regardless of status.
    pub async fn job_ids_for_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<Vec<String>, NotificationError> {
        let query = Query::new().where_eq("scheduleId", schedule_id);
        Ok(ids(self.store.query(JOBS_COLLECTION, &query).await?))
    }

    /// Fresh count of every job still referencing a request.
    pub async fn count_jobs_for_request(&self, request_id: &str) -> Result<usize, NotificationError> {
        let query = Query::new().where_eq("requestId", request_id);
        Ok(self.store.query(JOBS_COLLECTION, &query).await?.len())
    }

    /// Whether a pending job exists for the exact `(schedule, time)` pair.
    pub async fn has_pending_job_at(
        &self,
        schedule_id: &str,
        notification_time: OffsetDateTime,
    ) -> Result<bool, NotificationError> {
        let query = Query::new()
            .where_eq("scheduleId", schedule_id)
            .where_eq("notificationTime", epoch_millis::to_millis(notification_time))
            .where_eq("status", JobStatus::Pending.as_str())
            .with_limit(1);
        Ok(!self.store.query(JOBS_COLLECTION, &query).await?.is_empty())
    }

    /// Pending jobs due in the half-open window `(now - grace, now]`.
    pub async fn due_jobs(
        &self,
        now: OffsetDateTime,
        grace: time::Duration,
    ) -> Result<Vec<NotificationJob>, NotificationError> {
        let query = Query::new()
            .where_eq("status", JobStatus::Pending.as_str())
            .where_le("notificationTime", epoch_millis::to_millis(now))
            .where_gt("notificationTime", epoch_millis::to_millis(now - grace));
        Ok(parse_jobs(self.store.query(JOBS_COLLECTION, &query).await?))
    }

    /// Pending jobs at or beyond the grace window, oldest handling first.
    pub async fn stale_jobs(
        &self,
        now: OffsetDateTime,
        grace: time::Duration,
        limit: usize,
    ) -> Result<Vec<NotificationJob>, NotificationError> {
        let query = Query::new()
            .where_eq("status", JobStatus::Pending.as_str())
            .where_le("notificationTime", epoch_millis::to_millis(now - grace))
            .with_limit(limit);
        Ok(parse_jobs(self.store.query(JOBS_COLLECTION, &query).await?))
    }

    /// Returns `true` if a document was removed; a missing job is not an error.
    pub async fn delete_job(&self, id: &str) -> Result<bool, NotificationError> {
        Ok(self.store.delete(JOBS_COLLECTION, id).await?.is_some())
    }

    pub async fn delete_jobs(&self, ids: &[String]) -> Result<usize, NotificationError> {
        self.delete_batch(JOBS_COLLECTION, ids).await
    }

    /// Runs a read-modify-write on one job inside a store transaction.
    ///
    /// `body` sees the job as currently stored (or `None`) and returns the
    /// outcome plus the fields to write, if any. On a commit conflict the body
    /// is re-run on a fresh read, so it must not have side effects.
    pub async fn transact_job<T, F>(&self, id: &str, mut body: F) -> Result<T, NotificationError>
    where
        T: Send,
        F: FnMut(Option<&NotificationJob>) -> Result<(T, Option<Value>), NotificationError> + Send,
    {
        self.transact(JOBS_COLLECTION, id, |doc| {
            let job = doc
                .map(|doc| NotificationJob::from_document(&doc.id, &doc.data))
                .transpose()?;
            body(job.as_ref())
        })
        .await
    }

    // ==================== Schedules ====================

    pub async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, NotificationError> {
        self.store
            .get(SCHEDULES_COLLECTION, id)
            .await?
            .map(|doc| Schedule::from_document(&doc.id, &doc.data))
            .transpose()
    }

    pub async fn put_schedule(&self, schedule: &Schedule) -> Result<String, NotificationError> {
        let doc = self
            .store
            .create(SCHEDULES_COLLECTION, schedule.to_fields()?)
            .await?;
        Ok(doc.id)
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<bool, NotificationError> {
        Ok(self.store.delete(SCHEDULES_COLLECTION, id).await?.is_some())
    }

    // ==================== Internals ====================

    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<usize, NotificationError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ops = ids
            .iter()
            .map(|id| BatchOp::delete(collection, id))
            .collect();
        Ok(self.store.batch(ops).await?.len())
    }

    async fn transact<T, F>(&self, collection: &str, id: &str, mut body: F) -> Result<T, NotificationError>
    where
        T: Send,
        F: FnMut(Option<&StoredDocument>) -> Result<(T, Option<Value>), NotificationError> + Send,
    {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let mut tx = self.store.begin_transaction().await?;
            let doc = tx.get(collection, id).await?;

            let (outcome, write) = match body(doc.as_ref()) {
                Ok(result) => result,
                Err(e) => {
                    tx.rollback().await?;
                    return Err(e);
                }
            };

            let Some(fields) = write else {
                tx.rollback().await?;
                return Ok(outcome);
            };

            tx.update(collection, id, fields)?;
            match tx.commit().await {
                Ok(_) => return Ok(outcome),
                Err(e) if e.is_conflict() => {
                    debug!(collection, document_id = id, attempt, "Transaction conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(NotificationError::TransactionExhausted(
            format!("{collection}/{id}"),
            MAX_TRANSACTION_ATTEMPTS,
        ))
    }
}

/// Result of [`JobStore::cancel_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotPending(RequestStatus),
    NotFound,
}

fn ids(docs: Vec<StoredDocument>) -> Vec<String> {
    docs.into_iter().map(|doc| doc.id).collect()
}

fn parse_jobs(docs: Vec<StoredDocument>) -> Vec<NotificationJob> {
    docs.into_iter()
        .filter_map(|doc| match NotificationJob::from_document(&doc.id, &doc.data) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(job_id = %doc.id, error = %e, "Skipping malformed job");
                None
            }
        })
        .collect()
}
