#![allow(dead_code)]

use std::sync::Arc;

use remindly_db_memory::InMemoryStore;
use remindly_notifications::{
    CancellationHandler, DeliveryExecutor, DeliverySettings, JobStatus, JobStore, ManualClock,
    NotificationJob, NotificationRequest, PushGateway, RecordingGateway, RequestIntake,
    RequestStatus, ScheduleTeardown,
};
use time::OffsetDateTime;
use time::macros::datetime;

pub const NOW: OffsetDateTime = datetime!(2024-05-01 10:00:00 UTC);

/// Every component wired over one in-memory store and one manual clock.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub jobs: JobStore,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<RecordingGateway>,
    pub intake: RequestIntake,
    pub cancellation: CancellationHandler,
    pub teardown: ScheduleTeardown,
    pub executor: DeliveryExecutor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway(Arc::new(RecordingGateway::new()))
    }

    pub fn with_gateway(gateway: Arc<RecordingGateway>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let jobs = JobStore::new(store.clone());
        let clock = Arc::new(ManualClock::new(NOW));
        let executor = executor_with(&jobs, gateway.clone(), clock.clone());

        Self {
            intake: RequestIntake::new(jobs.clone(), clock.clone(), "Schedule"),
            cancellation: CancellationHandler::new(jobs.clone()),
            teardown: ScheduleTeardown::new(jobs.clone()),
            executor,
            store,
            jobs,
            clock,
            gateway,
        }
    }

    /// Stores a pending request and runs intake on it, as the trigger would.
    pub async fn submit(&self, mut request: NotificationRequest) -> NotificationRequest {
        request.id = self
            .jobs
            .create_request(&request)
            .await
            .expect("create request");
        self.intake
            .on_request_created(&request)
            .await
            .expect("intake");
        request
    }

    pub async fn job(&self, request_id: &str, schedule_id: &str, at: OffsetDateTime) -> NotificationJob {
        self.jobs
            .create_job(&job(request_id, schedule_id, at))
            .await
            .expect("create job")
    }

    pub async fn pending_jobs_for(&self, schedule_id: &str) -> Vec<NotificationJob> {
        let mut found = Vec::new();
        for id in self
            .jobs
            .pending_job_ids_for_schedule(schedule_id)
            .await
            .expect("query jobs")
        {
            if let Some(job) = self.jobs.get_job(&id).await.expect("get job") {
                found.push(job);
            }
        }
        found
    }
}

pub fn executor_with(
    jobs: &JobStore,
    gateway: Arc<dyn PushGateway>,
    clock: Arc<ManualClock>,
) -> DeliveryExecutor {
    DeliveryExecutor::new(jobs.clone(), gateway, clock, DeliverySettings::default())
}

pub fn request(schedule_id: &str, times: Vec<OffsetDateTime>) -> NotificationRequest {
    NotificationRequest {
        id: String::new(),
        schedule_id: schedule_id.to_string(),
        push_token: Some("device-token".to_string()),
        title: Some("Team sync".to_string()),
        notification_times: times,
        status: RequestStatus::Pending,
        job_count: None,
        error: None,
    }
}

pub fn job(request_id: &str, schedule_id: &str, at: OffsetDateTime) -> NotificationJob {
    NotificationJob {
        id: String::new(),
        request_id: request_id.to_string(),
        schedule_id: schedule_id.to_string(),
        push_token: "device-token".to_string(),
        title: "Team sync".to_string(),
        notification_time: at,
        status: JobStatus::Pending,
        created_at: NOW,
        processing_started_at: None,
    }
}
