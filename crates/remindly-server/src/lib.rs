pub mod api;
pub mod config;
pub mod observability;
pub mod server;

pub use config::{AppConfig, DeliveryConfig, LoggingConfig, PushConfig, PushProvider, ServerConfig};
pub use observability::{apply_logging_level, init_tracing};
pub use server::{BackgroundTasks, ReminderServer, ServerBuilder, build_gateway, spawn_sweep_loop};
