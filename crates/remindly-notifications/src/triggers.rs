//! Routes document events to the reminder handlers.
//!
//! [`route`] is a pure mapping from an event to the handler that should see
//! it. [`TriggerRouter::run`] consumes a broadcast receiver and runs every
//! routed event as its own task, so handlers for different documents proceed
//! concurrently the same way reactive triggers would.

use remindly_storage::DocumentEvent;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cancellation::{CancellationHandler, is_cancellation};
use crate::intake::RequestIntake;
use crate::teardown::ScheduleTeardown;
use crate::types::{NotificationRequest, REQUESTS_COLLECTION, SCHEDULES_COLLECTION};

/// Handler invocation derived from one event.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerAction {
    Intake { request_id: String, data: Value },
    Cancel { request_id: String },
    Teardown { schedule_id: String },
}

/// Maps an event to a handler, or `None` when nothing listens for it.
pub fn route(event: &DocumentEvent) -> Option<TriggerAction> {
    match event {
        DocumentEvent::Created {
            collection, id, data, ..
        } if collection == REQUESTS_COLLECTION => Some(TriggerAction::Intake {
            request_id: id.clone(),
            data: data.clone(),
        }),
        DocumentEvent::Updated {
            collection,
            id,
            before,
            after,
            ..
        } if collection == REQUESTS_COLLECTION && is_cancellation(before, after) => {
            Some(TriggerAction::Cancel {
                request_id: id.clone(),
            })
        }
        DocumentEvent::Deleted { collection, id, .. } if collection == SCHEDULES_COLLECTION => {
            Some(TriggerAction::Teardown {
                schedule_id: id.clone(),
            })
        }
        _ => None,
    }
}

#[derive(Clone)]
pub struct TriggerRouter {
    intake: RequestIntake,
    cancellation: CancellationHandler,
    teardown: ScheduleTeardown,
}

impl TriggerRouter {
    pub fn new(
        intake: RequestIntake,
        cancellation: CancellationHandler,
        teardown: ScheduleTeardown,
    ) -> Self {
        Self {
            intake,
            cancellation,
            teardown,
        }
    }

    /// Runs one handler to completion, logging any failure.
    pub async fn dispatch(&self, action: TriggerAction) {
        match action {
            TriggerAction::Intake { request_id, data } => {
                let request = match NotificationRequest::from_document(&request_id, &data) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(request_id = %request_id, error = %e, "Ignoring malformed request");
                        return;
                    }
                };
                if let Err(e) = self.intake.on_request_created(&request).await {
                    warn!(request_id = %request_id, error = %e, "Request intake failed");
                }
            }
            TriggerAction::Cancel { request_id } => {
                if let Err(e) = self.cancellation.on_request_cancelled(&request_id).await {
                    warn!(request_id = %request_id, error = %e, "Cancellation cleanup failed");
                }
            }
            TriggerAction::Teardown { schedule_id } => {
                self.teardown.on_schedule_deleted(&schedule_id).await;
            }
        }
    }

    /// Spawns the handler for `event`, if any.
    pub fn spawn(&self, event: &DocumentEvent) -> Option<JoinHandle<()>> {
        let action = route(event)?;
        debug!(
            collection = event.collection(),
            document_id = event.id(),
            action = action_name(&action),
            "Dispatching trigger"
        );
        let router = self.clone();
        Some(tokio::spawn(async move { router.dispatch(action).await }))
    }

    /// Consumes events until the channel closes.
    pub async fn run(self, mut receiver: broadcast::Receiver<DocumentEvent>) {
        info!("Starting trigger router");

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    self.spawn(&event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "Trigger router lagged, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event channel closed, stopping trigger router");
                    break;
                }
            }
        }
    }
}

fn action_name(action: &TriggerAction) -> &'static str {
    match action {
        TriggerAction::Intake { .. } => "intake",
        TriggerAction::Cancel { .. } => "cancel",
        TriggerAction::Teardown { .. } => "teardown",
    }
}
