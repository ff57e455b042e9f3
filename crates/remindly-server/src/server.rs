use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use remindly_db_memory::InMemoryStore;
use remindly_notifications::{
    CancellationHandler, Clock, DeliveryExecutor, FcmGateway, JobStore, LogGateway, PushGateway,
    RequestIntake, ScheduleTeardown, SystemClock, TriggerRouter,
};
use remindly_storage::{EventBroadcaster, EventedStore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::api::{self, AppState};
use crate::config::{AppConfig, PushProvider};

/// Picks the push transport named in the config.
pub fn build_gateway(cfg: &AppConfig) -> anyhow::Result<Arc<dyn PushGateway>> {
    let gateway: Arc<dyn PushGateway> = match cfg.push.provider {
        PushProvider::Log => Arc::new(LogGateway::new()),
        PushProvider::Fcm => Arc::new(FcmGateway::new(cfg.fcm_config())?),
    };
    info!(gateway = gateway.name(), "Push gateway configured");
    Ok(gateway)
}

/// Fires a sweep every `period`. Each tick gets its own task, so a slow
/// sweep does not hold back the next one.
pub fn spawn_sweep_loop(executor: DeliveryExecutor, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = period.as_millis() as u64, "Notification sweep started");

        loop {
            ticker.tick().await;
            let executor = executor.clone();
            tokio::spawn(async move {
                if let Err(e) = executor.sweep().await {
                    error!(error = %e, "Notification sweep failed");
                }
            });
        }
    })
}

/// Handles of the loops started by [`ReminderServer::start_background`].
pub struct BackgroundTasks {
    pub triggers: JoinHandle<()>,
    pub sweep: JoinHandle<()>,
}

impl BackgroundTasks {
    pub fn abort(&self) {
        self.triggers.abort();
        self.sweep.abort();
    }
}

pub struct ReminderServer {
    addr: SocketAddr,
    sweep_interval: Duration,
    broadcaster: Arc<EventBroadcaster>,
    jobs: JobStore,
    triggers: TriggerRouter,
    executor: DeliveryExecutor,
}

pub struct ServerBuilder {
    config: AppConfig,
    gateway: Option<Arc<dyn PushGateway>>,
    clock: Arc<dyn Clock>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            gateway: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Overrides the gateway the config would select.
    pub fn with_gateway(mut self, gateway: Arc<dyn PushGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> anyhow::Result<ReminderServer> {
        let cfg = self.config;
        let settings = cfg.delivery_settings().map_err(anyhow::Error::msg)?;
        let gateway = match self.gateway {
            Some(gateway) => gateway,
            None => build_gateway(&cfg)?,
        };

        let broadcaster = EventBroadcaster::new_shared();
        let store = Arc::new(EventedStore::new(InMemoryStore::new(), broadcaster.clone()));
        let jobs = JobStore::new(store);
        info!(backend = jobs.inner().backend_name(), "Document store ready");

        let triggers = TriggerRouter::new(
            RequestIntake::new(jobs.clone(), self.clock.clone(), cfg.delivery.default_title.clone()),
            CancellationHandler::new(jobs.clone()),
            ScheduleTeardown::new(jobs.clone()),
        );
        let executor = DeliveryExecutor::new(jobs.clone(), gateway, self.clock, settings);

        Ok(ReminderServer {
            addr: cfg.addr(),
            sweep_interval: cfg.sweep_interval(),
            broadcaster,
            jobs,
            triggers,
            executor,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReminderServer {
    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn executor(&self) -> &DeliveryExecutor {
        &self.executor
    }

    pub fn app(&self) -> Router {
        api::router(AppState {
            jobs: self.jobs.clone(),
        })
    }

    /// Subscribes the trigger router and starts the periodic sweep.
    pub fn start_background(&self) -> BackgroundTasks {
        let receiver = self.broadcaster.subscribe();
        BackgroundTasks {
            triggers: tokio::spawn(self.triggers.clone().run(receiver)),
            sweep: spawn_sweep_loop(self.executor.clone(), self.sweep_interval),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let background = self.start_background();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("listening on {}", self.addr);

        let served = axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown_signal())
            .await;
        background.abort();
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
