use std::collections::BTreeSet;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::dedup::DedupGuard;
use crate::error::NotificationError;
use crate::store::JobStore;
use crate::types::{JobStatus, NotificationJob, NotificationRequest, RequestStatus, epoch_millis};

pub const MISSING_TOKEN_ERROR: &str = "Push token missing";

/// What intake should do with a freshly created request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakePlan {
    /// Status is not `pending`; leave the request alone.
    Skip(RequestStatus),
    /// Terminal validation failure recorded on the request.
    Fail(&'static str),
    /// Expand into jobs for these future times (deduplicated, ascending).
    Expand(Vec<OffsetDateTime>),
}

/// Decides what to do with a request snapshot at `now`.
///
/// Times are compared at the millisecond precision they are stored with.
/// Times at or before `now` are dropped, as are repeats of the same instant
/// within the request.
pub fn plan_intake(request: &NotificationRequest, now: OffsetDateTime) -> IntakePlan {
    if request.status != RequestStatus::Pending {
        return IntakePlan::Skip(request.status);
    }
    if request.usable_token().is_none() {
        return IntakePlan::Fail(MISSING_TOKEN_ERROR);
    }

    let times: BTreeSet<i64> = future_millis(request, now).collect();

    IntakePlan::Expand(
        times
            .into_iter()
            .filter_map(|ms| epoch_millis::from_millis(ms).ok())
            .collect(),
    )
}

fn future_millis(
    request: &NotificationRequest,
    now: OffsetDateTime,
) -> impl Iterator<Item = i64> + '_ {
    let now_ms = epoch_millis::to_millis(now);
    request
        .notification_times
        .iter()
        .map(|time| epoch_millis::to_millis(*time))
        .filter(move |ms| *ms > now_ms)
}

/// What a single intake run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeReport {
    pub superseded_jobs: usize,
    pub created_jobs: Vec<String>,
    pub skipped_past: usize,
    /// Instants listed more than once in the request itself
    pub skipped_repeats: usize,
    /// Times that already had a pending job for the schedule
    pub skipped_duplicates: usize,
    pub failed: bool,
    pub skipped: bool,
}

/// Expands a new request into jobs.
#[derive(Clone)]
pub struct RequestIntake {
    jobs: JobStore,
    dedup: DedupGuard,
    clock: Arc<dyn Clock>,
    default_title: String,
}

impl RequestIntake {
    pub fn new(jobs: JobStore, clock: Arc<dyn Clock>, default_title: impl Into<String>) -> Self {
        Self {
            dedup: DedupGuard::new(jobs.clone()),
            jobs,
            clock,
            default_title: default_title.into(),
        }
    }

    /// Handles a request-created event carrying the request snapshot.
    pub async fn on_request_created(
        &self,
        request: &NotificationRequest,
    ) -> Result<IntakeReport, NotificationError> {
        let mut report = IntakeReport::default();

        info!(
            request_id = %request.id,
            schedule_id = %request.schedule_id,
            times = request.notification_times.len(),
            "Notification request created"
        );

        let now = self.clock.now();
        let plan = plan_intake(request, now);
        let times = match plan {
            IntakePlan::Skip(status) => {
                debug!(request_id = %request.id, status = %status, "Request not pending, skipping");
                report.skipped = true;
                return Ok(report);
            }
            IntakePlan::Fail(reason) => {
                warn!(request_id = %request.id, reason, "Rejecting notification request");
                self.jobs.mark_request_failed(&request.id, reason).await?;
                report.failed = true;
                return Ok(report);
            }
            IntakePlan::Expand(times) => times,
        };

        // A redelivered creation event, or one racing a cancellation or
        // teardown, must not resurrect jobs.
        match self.jobs.get_request(&request.id).await? {
            Some(current) if current.status == RequestStatus::Pending => {}
            Some(current) => {
                debug!(request_id = %request.id, status = %current.status, "Request already handled");
                report.skipped = true;
                return Ok(report);
            }
            None => {
                debug!(request_id = %request.id, "Request no longer exists");
                report.skipped = true;
                return Ok(report);
            }
        }

        let future = future_millis(request, now).count();
        report.skipped_past = request.notification_times.len() - future;
        report.skipped_repeats = future - times.len();

        // Last writer wins: an earlier request's pending jobs for the same
        // schedule are dropped. Jobs already claimed are not matched.
        let superseded = self
            .jobs
            .pending_job_ids_for_schedule(&request.schedule_id)
            .await?;
        if !superseded.is_empty() {
            report.superseded_jobs = self.jobs.delete_jobs(&superseded).await?;
            info!(
                schedule_id = %request.schedule_id,
                count = report.superseded_jobs,
                "Removed pending jobs superseded by new request"
            );
        }

        let token = request.usable_token().unwrap_or_default().to_string();
        let title = request.title_or(&self.default_title).to_string();

        for notification_time in times {
            if self
                .dedup
                .is_duplicate(&request.schedule_id, notification_time)
                .await?
            {
                report.skipped_duplicates += 1;
                continue;
            }

            let job = NotificationJob {
                id: String::new(),
                request_id: request.id.clone(),
                schedule_id: request.schedule_id.clone(),
                push_token: token.clone(),
                title: title.clone(),
                notification_time,
                status: JobStatus::Pending,
                created_at: self.clock.now(),
                processing_started_at: None,
            };
            let created = self.jobs.create_job(&job).await?;
            debug!(
                job_id = %created.id,
                notification_time = %notification_time,
                "Notification job created"
            );
            report.created_jobs.push(created.id);
        }

        let job_count = u32::try_from(report.created_jobs.len()).unwrap_or(u32::MAX);
        if !self
            .jobs
            .mark_request_processing(&request.id, job_count)
            .await?
        {
            // Cancelled or torn down while jobs were being written.
            let orphaned = self.jobs.pending_job_ids_for_request(&request.id).await?;
            let removed = self.jobs.delete_jobs(&orphaned).await?;
            info!(
                request_id = %request.id,
                removed,
                "Request left pending state during intake, dropped its jobs"
            );
            report.skipped = true;
            return Ok(report);
        }

        info!(
            request_id = %request.id,
            job_count,
            skipped_past = report.skipped_past,
            skipped_repeats = report.skipped_repeats,
            skipped_duplicates = report.skipped_duplicates,
            "Notification jobs created"
        );
        Ok(report)
    }
}
