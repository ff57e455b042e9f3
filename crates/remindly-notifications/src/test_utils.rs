use std::sync::Arc;

use remindly_db_memory::InMemoryStore;
use time::OffsetDateTime;
use time::macros::datetime;

use crate::store::JobStore;
use crate::types::{JobStatus, NotificationJob, NotificationRequest, RequestStatus};

pub fn memory_job_store() -> JobStore {
    JobStore::new(Arc::new(InMemoryStore::new()))
}

pub fn job_at(request_id: &str, schedule_id: &str, at: OffsetDateTime) -> NotificationJob {
    NotificationJob {
        id: String::new(),
        request_id: request_id.to_string(),
        schedule_id: schedule_id.to_string(),
        push_token: "token-1".to_string(),
        title: "Dentist".to_string(),
        notification_time: at,
        status: JobStatus::Pending,
        created_at: datetime!(2024-01-01 00:00:00 UTC),
        processing_started_at: None,
    }
}

pub fn pending_request(schedule_id: &str, times: Vec<OffsetDateTime>) -> NotificationRequest {
    NotificationRequest {
        id: String::new(),
        schedule_id: schedule_id.to_string(),
        push_token: Some("token-1".to_string()),
        title: Some("Dentist".to_string()),
        notification_times: times,
        status: RequestStatus::Pending,
        job_count: None,
        error: None,
    }
}
