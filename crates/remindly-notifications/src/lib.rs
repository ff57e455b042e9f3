//! # remindly-notifications
//!
//! Push reminder lifecycle on top of a [`remindly_storage::DocumentStore`].
//!
//! A reminder request for a schedule is expanded into one job per future
//! notification time. A periodic sweep claims due jobs with a single-document
//! transaction before sending, so overlapping sweeps never send the same job
//! twice. Cancelling a request, deleting its schedule, or finishing its last
//! job cleans up the records left behind.
//!
//! Components:
//! - [`RequestIntake`]: request created → jobs
//! - [`CancellationHandler`]: request cancelled → pending jobs removed
//! - [`ScheduleTeardown`]: schedule deleted → requests and jobs removed
//! - [`DeliveryExecutor`]: periodic sweep, claim, send, expire and reap
//! - [`TriggerRouter`]: feeds store events to the handlers above

pub mod cancellation;
pub mod clock;
pub mod dedup;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod intake;
pub mod messages;
pub mod reaper;
pub mod store;
pub mod teardown;
pub mod triggers;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use cancellation::{CancellationHandler, is_cancellation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::DedupGuard;
pub use delivery::{
    ClaimDecision, ClaimOutcome, DeliveryExecutor, DeliverySettings, DueAction, JobOutcome,
    SweepReport, classify_due, decide_claim,
};
pub use error::NotificationError;
pub use gateway::{
    FcmConfig, FcmGateway, LogGateway, PushGateway, PushMessage, RecordingGateway, SendResult,
};
pub use intake::{IntakePlan, IntakeReport, RequestIntake, plan_intake};
pub use messages::{ReminderKind, select_body};
pub use reaper::{ReapReport, RequestReaper};
pub use store::{CancelOutcome, JobStore, MAX_TRANSACTION_ATTEMPTS};
pub use teardown::{ScheduleTeardown, TeardownReport};
pub use triggers::{TriggerAction, TriggerRouter, route};
pub use types::*;
