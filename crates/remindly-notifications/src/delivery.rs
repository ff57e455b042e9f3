use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::json;
use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::NotificationError;
use crate::gateway::PushGateway;
use crate::messages::{build_message, generic_body, select_body};
use crate::reaper::{ReapReport, RequestReaper};
use crate::store::JobStore;
use crate::types::{JobStatus, NotificationJob, epoch_millis};

/// Default grace window: how late a job may still be sent.
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::minutes(5);

/// Default cap on overdue jobs picked up for expiry in one sweep.
pub const DEFAULT_STALE_BATCH_LIMIT: usize = 500;

/// Default cap on settled requests checked for reaping in one sweep.
pub const DEFAULT_REAP_BATCH_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct DeliverySettings {
    pub grace_window: Duration,
    /// Fixed offset used when rendering start times in message bodies
    pub display_offset: UtcOffset,
    pub stale_batch_limit: usize,
    /// Per status, how many settled requests the post-phase looks at
    pub reap_batch_limit: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            grace_window: DEFAULT_GRACE_WINDOW,
            display_offset: UtcOffset::UTC,
            stale_batch_limit: DEFAULT_STALE_BATCH_LIMIT,
            reap_batch_limit: DEFAULT_REAP_BATCH_LIMIT,
        }
    }
}

/// What a sweep should do with a pending job, from its distance to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueAction {
    NotYetDue,
    /// Overdue past the grace window: delete without sending
    Expired,
    Claim,
}

/// `time_diff_ms` is `notificationTime - now`.
pub fn classify_due(time_diff_ms: i64, grace_window_ms: i64) -> DueAction {
    if time_diff_ms > 0 {
        DueAction::NotYetDue
    } else if time_diff_ms < -grace_window_ms {
        DueAction::Expired
    } else {
        DueAction::Claim
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    Claim,
    /// Job is gone or no longer pending; carries the status seen, if any
    Abort(Option<JobStatus>),
}

/// Decides a claim from the job as read inside the claim transaction.
pub fn decide_claim(current: Option<&NotificationJob>) -> ClaimDecision {
    match current {
        Some(job) if job.status == JobStatus::Pending => ClaimDecision::Claim,
        other => ClaimDecision::Abort(other.map(|job| job.status)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The job as written by the claim
    Claimed(NotificationJob),
    NotClaimed(Option<JobStatus>),
}

/// How one job ended up in a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    NotYetDue,
    Expired,
    LostRace,
    Sent,
    SendFailed,
    /// A store operation failed before the job could be resolved
    Errored,
}

/// Totals for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub selected: usize,
    pub sent: usize,
    pub send_failures: usize,
    pub expired: usize,
    pub lost_races: usize,
    pub not_due: usize,
    pub errors: usize,
    /// Requests that had a job resolved in this sweep
    pub processed_requests: BTreeSet<String>,
    /// Requests handed to the reaper: the processed ones plus settled
    /// requests picked up by the post-phase scan
    pub reap_candidates: usize,
    pub reaped: ReapReport,
}

impl SweepReport {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::NotYetDue => self.not_due += 1,
            JobOutcome::Expired => self.expired += 1,
            JobOutcome::LostRace => self.lost_races += 1,
            JobOutcome::Sent => self.sent += 1,
            JobOutcome::SendFailed => self.send_failures += 1,
            JobOutcome::Errored => self.errors += 1,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.selected == 0
    }
}

/// Periodic sweep that claims due jobs and hands them to the push gateway.
///
/// `sweep` may run concurrently with itself over the same store: the claim
/// transaction is what keeps two sweeps from sending the same job.
#[derive(Clone)]
pub struct DeliveryExecutor {
    jobs: JobStore,
    gateway: Arc<dyn PushGateway>,
    clock: Arc<dyn Clock>,
    reaper: RequestReaper,
    settings: DeliverySettings,
}

impl DeliveryExecutor {
    pub fn new(
        jobs: JobStore,
        gateway: Arc<dyn PushGateway>,
        clock: Arc<dyn Clock>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            reaper: RequestReaper::new(jobs.clone()),
            jobs,
            gateway,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    /// Runs one sweep: select, resolve each job, then reap finished requests.
    ///
    /// The post-phase covers the requests resolved here plus settled
    /// (`processing` or `cancelled`) requests whose jobs went away by another
    /// path, such as being superseded or cancelled. Only the job selection
    /// queries can fail the sweep as a whole.
    pub async fn sweep(&self) -> Result<SweepReport, NotificationError> {
        let now = self.clock.now();
        let grace = self.settings.grace_window;

        let mut candidates = self.jobs.due_jobs(now, grace).await?;
        let stale = self
            .jobs
            .stale_jobs(now, grace, self.settings.stale_batch_limit)
            .await?;
        candidates.extend(stale);

        let mut report = SweepReport {
            selected: candidates.len(),
            ..SweepReport::default()
        };
        if candidates.is_empty() {
            debug!("No due notification jobs");
        }

        let outcomes = join_all(candidates.iter().map(|job| self.process_job(job, now))).await;
        for (job, outcome) in candidates.iter().zip(outcomes) {
            report.record(outcome);
            if matches!(
                outcome,
                JobOutcome::Expired | JobOutcome::Sent | JobOutcome::SendFailed
            ) {
                report.processed_requests.insert(job.request_id.clone());
            }
        }

        let mut to_reap = report.processed_requests.clone();
        match self
            .jobs
            .settled_request_ids(self.settings.reap_batch_limit)
            .await
        {
            Ok(settled) => to_reap.extend(settled),
            Err(e) => warn!(error = %e, "Failed to list settled requests for reaping"),
        }
        report.reap_candidates = to_reap.len();
        report.reaped = self.reaper.reap(to_reap).await;

        if report.is_idle() && report.reaped.deleted == 0 {
            return Ok(report);
        }
        info!(
            selected = report.selected,
            sent = report.sent,
            send_failures = report.send_failures,
            expired = report.expired,
            lost_races = report.lost_races,
            errors = report.errors,
            requests_reaped = report.reaped.deleted,
            "Notification sweep complete"
        );
        Ok(report)
    }

    pub async fn process_job(&self, job: &NotificationJob, now: OffsetDateTime) -> JobOutcome {
        let time_diff_ms = job.time_diff_ms(now);
        let grace_ms = self.settings.grace_window.whole_milliseconds() as i64;

        match classify_due(time_diff_ms, grace_ms) {
            DueAction::NotYetDue => JobOutcome::NotYetDue,
            DueAction::Expired => {
                info!(
                    job_id = %job.id,
                    request_id = %job.request_id,
                    time_diff_ms,
                    "Notification job expired, deleting without send"
                );
                self.remove_job(&job.id).await;
                JobOutcome::Expired
            }
            DueAction::Claim => match self.claim_job(&job.id, now).await {
                Ok(ClaimOutcome::Claimed(claimed)) => self.deliver(&claimed, time_diff_ms).await,
                Ok(ClaimOutcome::NotClaimed(status)) => {
                    debug!(
                        job_id = %job.id,
                        status = ?status,
                        "Job already claimed or removed, skipping"
                    );
                    JobOutcome::LostRace
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Failed to claim notification job");
                    JobOutcome::Errored
                }
            },
        }
    }

    /// Moves a job from `pending` to `processing` in one transaction.
    pub async fn claim_job(
        &self,
        job_id: &str,
        now: OffsetDateTime,
    ) -> Result<ClaimOutcome, NotificationError> {
        self.jobs
            .transact_job(job_id, |current| match (decide_claim(current), current) {
                (ClaimDecision::Claim, Some(job)) => {
                    let mut claimed = job.clone();
                    claimed.status = JobStatus::Processing;
                    claimed.processing_started_at = Some(now);
                    let fields = json!({
                        "status": JobStatus::Processing,
                        "processingStartedAt": epoch_millis::to_millis(now),
                    });
                    Ok((ClaimOutcome::Claimed(claimed), Some(fields)))
                }
                (_, current) => Ok((ClaimOutcome::NotClaimed(current.map(|job| job.status)), None)),
            })
            .await
    }

    async fn deliver(&self, job: &NotificationJob, time_diff_ms: i64) -> JobOutcome {
        let body = self.compose_body(job).await;
        let message = build_message(job, body);

        let outcome = match self.gateway.send(&message).await {
            Ok(result) if result.success => {
                info!(
                    job_id = %job.id,
                    request_id = %job.request_id,
                    schedule_id = %job.schedule_id,
                    gateway = self.gateway.name(),
                    external_id = ?result.external_id,
                    time_diff_ms,
                    "Reminder sent"
                );
                JobOutcome::Sent
            }
            Ok(result) => {
                warn!(
                    job_id = %job.id,
                    gateway = self.gateway.name(),
                    error = result.error.as_deref().unwrap_or("Unknown error"),
                    "Reminder rejected by gateway"
                );
                JobOutcome::SendFailed
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    gateway = self.gateway.name(),
                    error = %e,
                    "Reminder send failed"
                );
                JobOutcome::SendFailed
            }
        };

        self.remove_job(&job.id).await;
        outcome
    }

    /// Picks the body from the schedule's start date, falling back to the
    /// generic phrasing when the schedule cannot be read.
    async fn compose_body(&self, job: &NotificationJob) -> String {
        match self.jobs.get_schedule(&job.schedule_id).await {
            Ok(schedule) => select_body(
                &job.title,
                job.notification_time,
                schedule.and_then(|s| s.start_date),
                self.settings.display_offset,
            ),
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    schedule_id = %job.schedule_id,
                    error = %e,
                    "Schedule lookup failed, using generic body"
                );
                generic_body(&job.title)
            }
        }
    }

    async fn remove_job(&self, job_id: &str) {
        match self.jobs.delete_job(job_id).await {
            Ok(true) => {}
            Ok(false) => debug!(job_id, "Job already removed"),
            Err(e) => error!(job_id, error = %e, "Failed to delete notification job"),
        }
    }
}
