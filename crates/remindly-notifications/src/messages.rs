use std::collections::BTreeMap;

use time::macros::format_description;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::gateway::PushMessage;
use crate::types::NotificationJob;

/// Title shown on every reminder notification.
pub const PUSH_TITLE: &str = "Schedule reminder";

/// Value of the `type` entry in the data section.
pub const REMINDER_TYPE: &str = "schedule_reminder";

/// Which phrasing a reminder uses, from how far ahead of the start it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    /// About 24 hours ahead (within 10%)
    DayBefore,
    /// About one hour ahead (within 10%)
    HourBefore,
    /// Four to six minutes ahead
    Imminent,
    Generic,
}

/// Picks the phrasing band for the gap between start and fire time.
pub fn select_kind(gap: Duration) -> ReminderKind {
    let gap_ms = gap.whole_milliseconds() as f64;
    let hours = gap_ms / Duration::HOUR.whole_milliseconds() as f64;
    let days = gap_ms / Duration::DAY.whole_milliseconds() as f64;

    if (0.9..=1.1).contains(&days) {
        ReminderKind::DayBefore
    } else if (0.9..=1.1).contains(&hours) {
        ReminderKind::HourBefore
    } else if gap >= Duration::minutes(4) && gap <= Duration::minutes(6) {
        ReminderKind::Imminent
    } else {
        ReminderKind::Generic
    }
}

pub fn generic_body(title: &str) -> String {
    format!("{title} is starting soon.")
}

/// Renders the body for a job given the schedule's start, if known.
///
/// `display_offset` is the fixed offset used to show the start time.
pub fn select_body(
    title: &str,
    notification_time: OffsetDateTime,
    start: Option<OffsetDateTime>,
    display_offset: UtcOffset,
) -> String {
    let Some(start) = start else {
        return generic_body(title);
    };

    match select_kind(start - notification_time) {
        ReminderKind::DayBefore => match format_clock(start, display_offset) {
            Some(at) => format!("Tomorrow at {at}: {title}."),
            None => generic_body(title),
        },
        ReminderKind::HourBefore => format!("{title} starts in one hour."),
        ReminderKind::Imminent => format!("{title} is about to start."),
        ReminderKind::Generic => generic_body(title),
    }
}

fn format_clock(at: OffsetDateTime, offset: UtcOffset) -> Option<String> {
    let format = format_description!("[hour repr:12]:[minute] [period]");
    at.to_offset(offset).format(&format).ok()
}

/// Builds the push payload for a claimed job.
pub fn build_message(job: &NotificationJob, body: String) -> PushMessage {
    let mut data = BTreeMap::new();
    data.insert("scheduleId".to_string(), job.schedule_id.clone());
    data.insert("type".to_string(), REMINDER_TYPE.to_string());
    data.insert("requestId".to_string(), job.request_id.clone());

    PushMessage {
        token: job.push_token.clone(),
        title: PUSH_TITLE.to_string(),
        body,
        data,
    }
}
