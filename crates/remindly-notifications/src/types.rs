use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::NotificationError;

/// Collection holding user-facing reminder requests.
pub const REQUESTS_COLLECTION: &str = "notification_requests";

/// Collection holding one document per scheduled delivery.
pub const JOBS_COLLECTION: &str = "notification_jobs";

/// Collection holding the calendar entries reminders refer to.
pub const SCHEDULES_COLLECTION: &str = "schedules";

/// Title used when a request carries none.
pub const DEFAULT_TITLE: &str = "Schedule";

/// Request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Failed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Failed => "failed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Every allowed transition starts at `Pending`.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (
                RequestStatus::Pending,
                RequestStatus::Processing | RequestStatus::Failed | RequestStatus::Cancelled
            )
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to schedule reminders for one calendar entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    /// Store-assigned document ID (not persisted as a field)
    #[serde(skip)]
    pub id: String,

    pub schedule_id: String,

    /// Push gateway destination
    #[serde(default, alias = "fcmToken", skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Moments at which a reminder should fire
    #[serde(default, with = "epoch_millis::vec")]
    pub notification_times: Vec<OffsetDateTime>,

    pub status: RequestStatus,

    /// Number of jobs actually created at intake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_count: Option<u32>,

    /// Validation failure annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationRequest {
    pub fn from_document(id: &str, data: &Value) -> Result<Self, NotificationError> {
        let mut request: Self = serde_json::from_value(data.clone())
            .map_err(|e| NotificationError::invalid_record(REQUESTS_COLLECTION, id, e.to_string()))?;
        request.id = id.to_string();
        Ok(request)
    }

    pub fn to_fields(&self) -> Result<Value, NotificationError> {
        serde_json::to_value(self).map_err(|e| NotificationError::Internal(e.to_string()))
    }

    /// The push token, if present and non-blank.
    pub fn usable_token(&self) -> Option<&str> {
        self.push_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// The title, falling back to `default` when absent or blank.
    pub fn title_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(default)
    }
}

/// One concrete delivery unit derived from a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    /// Store-assigned document ID (not persisted as a field)
    #[serde(skip)]
    pub id: String,

    /// Owning request (non-owning back-reference)
    pub request_id: String,

    pub schedule_id: String,

    /// Snapshot of the request's token at creation
    #[serde(alias = "fcmToken")]
    pub push_token: String,

    pub title: String,

    #[serde(with = "epoch_millis")]
    pub notification_time: OffsetDateTime,

    pub status: JobStatus,

    #[serde(with = "epoch_millis")]
    pub created_at: OffsetDateTime,

    #[serde(default, with = "epoch_millis::option", skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<OffsetDateTime>,
}

impl NotificationJob {
    pub fn from_document(id: &str, data: &Value) -> Result<Self, NotificationError> {
        let mut job: Self = serde_json::from_value(data.clone())
            .map_err(|e| NotificationError::invalid_record(JOBS_COLLECTION, id, e.to_string()))?;
        job.id = id.to_string();
        Ok(job)
    }

    pub fn to_fields(&self) -> Result<Value, NotificationError> {
        serde_json::to_value(self).map_err(|e| NotificationError::Internal(e.to_string()))
    }

    /// Milliseconds until the job is due; negative once overdue.
    pub fn time_diff_ms(&self, now: OffsetDateTime) -> i64 {
        epoch_millis::to_millis(self.notification_time) - epoch_millis::to_millis(now)
    }
}

/// The calendar entry a reminder refers to.
///
/// Only the start date is read, to choose the reminder phrasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(skip)]
    pub id: String,

    #[serde(default, with = "epoch_millis::option", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<OffsetDateTime>,
}

impl Schedule {
    pub fn from_document(id: &str, data: &Value) -> Result<Self, NotificationError> {
        let mut schedule: Self = serde_json::from_value(data.clone()).map_err(|e| {
            NotificationError::invalid_record(SCHEDULES_COLLECTION, id, e.to_string())
        })?;
        schedule.id = id.to_string();
        Ok(schedule)
    }

    pub fn to_fields(&self) -> Result<Value, NotificationError> {
        serde_json::to_value(self).map_err(|e| NotificationError::Internal(e.to_string()))
    }
}

/// Serde helpers persisting timestamps as integer epoch milliseconds.
///
/// Range predicates on these fields then compare numerically in any store.
pub mod epoch_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn to_millis(t: OffsetDateTime) -> i64 {
        (t.unix_timestamp_nanos() / 1_000_000) as i64
    }

    pub fn from_millis(ms: i64) -> Result<OffsetDateTime, time::error::ComponentRange> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
    }

    pub fn serialize<S: Serializer>(t: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(to_millis(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<OffsetDateTime, D::Error> {
        let ms = i64::deserialize(d)?;
        from_millis(ms).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(t: &Option<OffsetDateTime>, s: S) -> Result<S::Ok, S::Error> {
            match t {
                Some(t) => s.serialize_some(&to_millis(*t)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<OffsetDateTime>, D::Error> {
            Option::<i64>::deserialize(d)?
                .map(from_millis)
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }

    pub mod vec {
        use super::*;
        use serde::ser::SerializeSeq;

        #[allow(clippy::ptr_arg)]
        pub fn serialize<S: Serializer>(
            times: &Vec<OffsetDateTime>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            let mut seq = s.serialize_seq(Some(times.len()))?;
            for t in times {
                seq.serialize_element(&to_millis(*t))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<OffsetDateTime>, D::Error> {
            Vec::<i64>::deserialize(d)?
                .into_iter()
                .map(|ms| from_millis(ms).map_err(serde::de::Error::custom))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn test_request_from_document() {
        let data = json!({
            "scheduleId": "s1",
            "fcmToken": "tok",
            "notificationTimes": [1_700_000_000_000_i64, 1_700_000_060_000_i64],
            "status": "pending"
        });
        let request = NotificationRequest::from_document("r1", &data).unwrap();
        assert_eq!(request.id, "r1");
        assert_eq!(request.usable_token(), Some("tok"));
        assert_eq!(request.notification_times.len(), 2);
        assert_eq!(request.title_or(DEFAULT_TITLE), DEFAULT_TITLE);
    }

    #[test]
    fn test_blank_token_is_unusable() {
        let data = json!({"scheduleId": "s1", "pushToken": "  ", "status": "pending"});
        let request = NotificationRequest::from_document("r1", &data).unwrap();
        assert_eq!(request.usable_token(), None);
        assert!(request.notification_times.is_empty());
    }

    #[test]
    fn test_request_missing_schedule_is_invalid() {
        let err = NotificationRequest::from_document("r1", &json!({"status": "pending"})).unwrap_err();
        assert!(matches!(err, NotificationError::InvalidRecord { .. }));
    }

    #[test]
    fn test_job_fields_use_epoch_millis() {
        let job = NotificationJob {
            id: "ignored".into(),
            request_id: "r1".into(),
            schedule_id: "s1".into(),
            push_token: "tok".into(),
            title: "Dentist".into(),
            notification_time: datetime!(2023-11-14 22:13:20 UTC),
            status: JobStatus::Pending,
            created_at: datetime!(2023-11-14 22:00:00 UTC),
            processing_started_at: None,
        };
        let fields = job.to_fields().unwrap();
        assert_eq!(fields["notificationTime"], json!(1_700_000_000_000_i64));
        assert_eq!(fields["status"], json!("pending"));
        assert!(fields.get("id").is_none());
        assert!(fields.get("processingStartedAt").is_none());

        let back = NotificationJob::from_document("j1", &fields).unwrap();
        assert_eq!(back.id, "j1");
        assert_eq!(back.notification_time, job.notification_time);
    }

    #[test]
    fn test_time_diff() {
        let job_time = datetime!(2024-01-01 12:00:00 UTC);
        let job = NotificationJob {
            id: "j".into(),
            request_id: "r".into(),
            schedule_id: "s".into(),
            push_token: "t".into(),
            title: "x".into(),
            notification_time: job_time,
            status: JobStatus::Pending,
            created_at: job_time,
            processing_started_at: None,
        };
        assert_eq!(job.time_diff_ms(job_time + time::Duration::seconds(30)), -30_000);
        assert_eq!(job.time_diff_ms(job_time - time::Duration::minutes(1)), 60_000);
    }

    #[test]
    fn test_request_status_transitions() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Processing));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Failed));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Cancelled));
        assert!(!RequestStatus::Processing.can_transition_to(RequestStatus::Cancelled));
        assert!(!RequestStatus::Cancelled.can_transition_to(RequestStatus::Pending));
    }
}
