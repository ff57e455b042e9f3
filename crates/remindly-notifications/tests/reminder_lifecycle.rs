//! End-to-end reminder lifecycle over the in-memory store.
//!
//! Each test drives the handlers directly, in the order the trigger runtime
//! would invoke them, with a manual clock.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{Harness, NOW, request};
use remindly_notifications::{
    CancelOutcome, JobStatus, RecordingGateway, RequestStatus, Schedule, epoch_millis,
};
use time::Duration;

// =============================================================================
// Intake
// =============================================================================

#[tokio::test]
async fn request_with_two_future_times_creates_two_jobs() {
    let h = Harness::new();
    let submitted = h
        .submit(request(
            "sched-1",
            vec![NOW + Duration::minutes(2), NOW + Duration::minutes(90)],
        ))
        .await;

    let stored = h.jobs.get_request(&submitted.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Processing);
    assert_eq!(stored.job_count, Some(2));

    let jobs = h.pending_jobs_for("sched-1").await;
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
        assert_eq!(job.request_id, submitted.id);
        assert_eq!(job.push_token, "device-token");
        assert_eq!(job.title, "Team sync");
    }
}

#[tokio::test]
async fn second_request_supersedes_first_for_same_schedule() {
    let h = Harness::new();
    let first = h
        .submit(request(
            "sched-1",
            vec![NOW + Duration::minutes(10), NOW + Duration::minutes(20)],
        ))
        .await;
    let second = h
        .submit(request("sched-1", vec![NOW + Duration::minutes(30)]))
        .await;

    let jobs = h.pending_jobs_for("sched-1").await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].request_id, second.id);
    assert_eq!(h.jobs.count_jobs_for_request(&first.id).await.unwrap(), 0);
}

#[tokio::test]
async fn past_times_never_produce_jobs() {
    let h = Harness::new();
    let submitted = h
        .submit(request(
            "sched-1",
            vec![
                NOW,
                NOW - Duration::milliseconds(1),
                NOW - Duration::DAY,
                NOW + Duration::milliseconds(1),
            ],
        ))
        .await;

    let jobs = h.pending_jobs_for("sched-1").await;
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].notification_time > NOW);

    let stored = h.jobs.get_request(&submitted.id).await.unwrap().unwrap();
    assert_eq!(stored.job_count, Some(1));
}

#[tokio::test]
async fn at_most_one_pending_job_per_schedule_and_time() {
    let h = Harness::new();
    let times = vec![
        NOW + Duration::minutes(5),
        NOW + Duration::minutes(5),
        NOW + Duration::minutes(15),
    ];

    let first = h.submit(request("sched-1", times.clone())).await;
    // Redelivery of the same creation event.
    h.intake.on_request_created(&first).await.unwrap();
    h.submit(request("sched-1", times.clone())).await;
    h.submit(request("sched-2", times)).await;

    for schedule in ["sched-1", "sched-2"] {
        let jobs = h.pending_jobs_for(schedule).await;
        let distinct: HashSet<i64> = jobs
            .iter()
            .map(|job| epoch_millis::to_millis(job.notification_time))
            .collect();
        assert_eq!(distinct.len(), jobs.len(), "duplicate pending job in {schedule}");
        assert_eq!(jobs.len(), 2);
    }
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test]
async fn job_far_past_due_expires_without_send() {
    let h = Harness::new();
    let job = h
        .job("req-1", "sched-1", NOW - Duration::milliseconds(400_000))
        .await;

    let report = h.executor.sweep().await.unwrap();

    assert_eq!(report.expired, 1);
    assert_eq!(report.sent, 0);
    assert_eq!(h.gateway.attempt_count(), 0);
    assert!(h.jobs.get_job(&job.id).await.unwrap().is_none());
    assert!(report.processed_requests.contains("req-1"));
}

#[tokio::test]
async fn job_within_grace_window_is_sent_then_deleted() {
    let h = Harness::new();
    let job = h
        .job("req-1", "sched-1", NOW - Duration::milliseconds(30_000))
        .await;

    let report = h.executor.sweep().await.unwrap();

    assert_eq!(report.sent, 1);
    let sent = h.gateway.attempts();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].token, "device-token");
    assert_eq!(sent[0].body, "Team sync is starting soon.");
    assert!(h.jobs.get_job(&job.id).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_send_still_deletes_job() {
    let h = Harness::with_gateway(Arc::new(RecordingGateway::failing()));
    let job = h
        .job("req-1", "sched-1", NOW - Duration::milliseconds(30_000))
        .await;

    let report = h.executor.sweep().await.unwrap();

    assert_eq!(report.send_failures, 1);
    assert_eq!(h.gateway.attempt_count(), 1);
    assert!(h.jobs.get_job(&job.id).await.unwrap().is_none());

    // Nothing left to retry.
    let again = h.executor.sweep().await.unwrap();
    assert!(again.is_idle());
    assert_eq!(h.gateway.attempt_count(), 1);
}

#[tokio::test]
async fn admission_window_edges() {
    let h = Harness::new();
    let at_now = h.job("req-1", "sched-1", NOW).await;
    let at_edge = h
        .job("req-1", "sched-1", NOW - Duration::minutes(5))
        .await;
    let beyond = h
        .job("req-1", "sched-1", NOW - Duration::minutes(5) - Duration::milliseconds(1))
        .await;
    let future = h
        .job("req-1", "sched-1", NOW + Duration::milliseconds(1))
        .await;

    let report = h.executor.sweep().await.unwrap();

    assert_eq!(report.sent, 2);
    assert_eq!(report.expired, 1);
    for gone in [&at_now, &at_edge, &beyond] {
        assert!(h.jobs.get_job(&gone.id).await.unwrap().is_none());
    }
    assert!(h.jobs.get_job(&future.id).await.unwrap().is_some());
}

#[tokio::test]
async fn day_before_reminder_uses_schedule_start() {
    let h = Harness::new();
    let start = NOW + Duration::DAY;
    let schedule_id = h
        .jobs
        .put_schedule(&Schedule {
            id: String::new(),
            start_date: Some(start),
        })
        .await
        .unwrap();
    h.job("req-1", &schedule_id, NOW).await;

    h.executor.sweep().await.unwrap();

    let sent = h.gateway.attempts();
    assert_eq!(sent[0].body, "Tomorrow at 10:00 AM: Team sync.");
    assert_eq!(sent[0].data["scheduleId"], schedule_id);
}

// =============================================================================
// Cancellation and teardown
// =============================================================================

#[tokio::test]
async fn cancellation_removes_only_pending_jobs() {
    let h = Harness::new();
    let mut pending = request("sched-1", vec![]);
    pending.id = h.jobs.create_request(&pending).await.unwrap();

    let in_flight = h.job(&pending.id, "sched-1", NOW).await;
    let later = h
        .job(&pending.id, "sched-1", NOW + Duration::HOUR)
        .await;
    h.executor.claim_job(&in_flight.id, NOW).await.unwrap();

    assert_eq!(
        h.jobs.cancel_request(&pending.id).await.unwrap(),
        CancelOutcome::Cancelled
    );
    h.cancellation.on_request_cancelled(&pending.id).await.unwrap();

    let survivor = h.jobs.get_job(&in_flight.id).await.unwrap().unwrap();
    assert_eq!(survivor.status, JobStatus::Processing);
    assert!(h.jobs.get_job(&later.id).await.unwrap().is_none());
}

#[tokio::test]
async fn schedule_deletion_removes_every_dependent_record() {
    let h = Harness::new();
    let schedule_id = h
        .jobs
        .put_schedule(&Schedule {
            id: String::new(),
            start_date: Some(NOW + Duration::HOUR),
        })
        .await
        .unwrap();

    let mut owner = request(&schedule_id, vec![]);
    owner.id = h.jobs.create_request(&owner).await.unwrap();
    h.job(&owner.id, &schedule_id, NOW + Duration::minutes(1)).await;
    h.job(&owner.id, &schedule_id, NOW + Duration::minutes(2)).await;
    let claimed = h.job(&owner.id, &schedule_id, NOW).await;
    h.executor.claim_job(&claimed.id, NOW).await.unwrap();

    h.jobs.delete_schedule(&schedule_id).await.unwrap();
    let report = h.teardown.on_schedule_deleted(&schedule_id).await;

    assert_eq!(report.requests_deleted, 1);
    assert_eq!(report.jobs_deleted, 3);
    assert!(h.jobs.request_ids_for_schedule(&schedule_id).await.unwrap().is_empty());
    assert!(h.jobs.job_ids_for_schedule(&schedule_id).await.unwrap().is_empty());
    assert_eq!(h.store.count().await, 0);
}

// =============================================================================
// Reaping
// =============================================================================

#[tokio::test]
async fn request_reaped_only_after_last_job() {
    let h = Harness::new();
    let submitted = h
        .submit(request(
            "sched-1",
            vec![NOW + Duration::seconds(30), NOW + Duration::minutes(3)],
        ))
        .await;

    h.clock.advance(Duration::minutes(1));
    let first = h.executor.sweep().await.unwrap();
    assert_eq!(first.sent, 1);
    assert_eq!(first.reaped.retained, 1);
    assert!(h.jobs.get_request(&submitted.id).await.unwrap().is_some());

    h.clock.advance(Duration::minutes(3));
    let second = h.executor.sweep().await.unwrap();
    assert_eq!(second.sent, 1);
    assert_eq!(second.reaped.deleted, 1);
    assert!(h.jobs.get_request(&submitted.id).await.unwrap().is_none());
}

#[tokio::test]
async fn expiry_also_feeds_reaping() {
    let h = Harness::new();
    let submitted = h
        .submit(request("sched-1", vec![NOW + Duration::minutes(1)]))
        .await;

    // The process was down long enough for the job to go stale.
    h.clock.advance(Duration::minutes(30));
    let report = h.executor.sweep().await.unwrap();

    assert_eq!(report.expired, 1);
    assert_eq!(report.reaped.deleted, 1);
    assert_eq!(h.gateway.attempt_count(), 0);
    assert!(h.jobs.get_request(&submitted.id).await.unwrap().is_none());
}

#[tokio::test]
async fn superseded_request_is_reaped_on_next_sweep() {
    let h = Harness::new();
    let first = h
        .submit(request("sched-1", vec![NOW + Duration::minutes(10)]))
        .await;
    let second = h
        .submit(request("sched-1", vec![NOW + Duration::minutes(20)]))
        .await;

    let report = h.executor.sweep().await.unwrap();

    assert!(report.is_idle());
    assert_eq!(report.reaped.deleted, 1);
    assert!(h.jobs.get_request(&first.id).await.unwrap().is_none());
    // Still owns a pending job.
    assert!(h.jobs.get_request(&second.id).await.unwrap().is_some());
}

#[tokio::test]
async fn request_with_only_past_times_is_reaped() {
    let h = Harness::new();
    let submitted = h
        .submit(request("sched-1", vec![NOW - Duration::minutes(1)]))
        .await;
    let stored = h.jobs.get_request(&submitted.id).await.unwrap().unwrap();
    assert_eq!(stored.job_count, Some(0));

    h.executor.sweep().await.unwrap();

    assert!(h.jobs.get_request(&submitted.id).await.unwrap().is_none());
}

#[tokio::test]
async fn cancelled_request_is_reaped_once_jobs_are_removed() {
    let h = Harness::new();
    let mut pending = request("sched-1", vec![]);
    pending.id = h.jobs.create_request(&pending).await.unwrap();
    h.job(&pending.id, "sched-1", NOW + Duration::HOUR).await;
    h.jobs.cancel_request(&pending.id).await.unwrap();

    // The cancellation handler has not run yet, so the job keeps it alive.
    let before = h.executor.sweep().await.unwrap();
    assert_eq!(before.reaped.deleted, 0);
    assert!(h.jobs.get_request(&pending.id).await.unwrap().is_some());

    h.cancellation.on_request_cancelled(&pending.id).await.unwrap();
    let after = h.executor.sweep().await.unwrap();
    assert_eq!(after.reaped.deleted, 1);
    assert!(h.jobs.get_request(&pending.id).await.unwrap().is_none());
}

#[tokio::test]
async fn pending_and_failed_requests_are_not_reaped() {
    let h = Harness::new();
    let mut waiting = request("sched-1", vec![NOW + Duration::minutes(5)]);
    waiting.id = h.jobs.create_request(&waiting).await.unwrap();
    let mut tokenless = request("sched-2", vec![NOW + Duration::minutes(5)]);
    tokenless.push_token = None;
    let rejected = h.submit(tokenless).await;

    h.executor.sweep().await.unwrap();

    assert!(h.jobs.get_request(&waiting.id).await.unwrap().is_some());
    let failed = h.jobs.get_request(&rejected.id).await.unwrap().unwrap();
    assert_eq!(failed.status, RequestStatus::Failed);
}
