use remindly_notifications::{DEFAULT_TITLE, DeliverySettings, FcmConfig};
use remindly_notifications::delivery::{DEFAULT_REAP_BATCH_LIMIT, DEFAULT_STALE_BATCH_LIMIT};
use remindly_notifications::gateway::fcm::DEFAULT_FCM_ENDPOINT;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

/// Longest accepted grace window (one day).
const MAX_GRACE_WINDOW_MS: u64 = 86_400_000;

/// Largest accepted display offset, in minutes.
const MAX_DISPLAY_OFFSET_MINUTES: i16 = 18 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub push: PushConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Delivery validations
        if self.delivery.sweep_interval_secs == 0 {
            return Err("delivery.sweep_interval_secs must be > 0".into());
        }
        if self.delivery.grace_window_ms == 0 {
            return Err("delivery.grace_window_ms must be > 0".into());
        }
        if self.delivery.grace_window_ms > MAX_GRACE_WINDOW_MS {
            return Err(format!(
                "delivery.grace_window_ms must be <= {MAX_GRACE_WINDOW_MS}"
            ));
        }
        if self.delivery.display_utc_offset_minutes.abs() > MAX_DISPLAY_OFFSET_MINUTES {
            return Err(format!(
                "delivery.display_utc_offset_minutes must be within ±{MAX_DISPLAY_OFFSET_MINUTES}"
            ));
        }
        if self.delivery.stale_batch_limit == 0 {
            return Err("delivery.stale_batch_limit must be > 0".into());
        }
        if self.delivery.reap_batch_limit == 0 {
            return Err("delivery.reap_batch_limit must be > 0".into());
        }
        // Push validations
        if self.push.provider == PushProvider::Fcm {
            if self.push.project_id.as_deref().unwrap_or("").is_empty() {
                return Err("push.provider=fcm requires push.project_id".into());
            }
            if self.push.access_token.as_deref().unwrap_or("").is_empty() {
                return Err("push.provider=fcm requires push.access_token".into());
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.delivery.sweep_interval_secs)
    }

    pub fn delivery_settings(&self) -> Result<DeliverySettings, String> {
        let offset_secs = i32::from(self.delivery.display_utc_offset_minutes) * 60;
        let display_offset = time::UtcOffset::from_whole_seconds(offset_secs)
            .map_err(|e| format!("delivery.display_utc_offset_minutes: {e}"))?;
        let grace_ms = i64::try_from(self.delivery.grace_window_ms)
            .map_err(|_| "delivery.grace_window_ms is out of range".to_string())?;

        Ok(DeliverySettings {
            grace_window: time::Duration::milliseconds(grace_ms),
            display_offset,
            stale_batch_limit: self.delivery.stale_batch_limit,
            reap_batch_limit: self.delivery.reap_batch_limit,
        })
    }

    /// FCM connection settings; only meaningful once `validate` passed.
    pub fn fcm_config(&self) -> FcmConfig {
        FcmConfig {
            endpoint: self.push.endpoint.clone(),
            project_id: self.push.project_id.clone().unwrap_or_default(),
            access_token: self.push.access_token.clone().unwrap_or_default(),
            timeout: Duration::from_millis(self.push.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Seconds between sweep ticks; ticks may overlap
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// How late a due job may still be sent
    #[serde(default = "default_grace_window_ms")]
    pub grace_window_ms: u64,
    /// Fixed offset used to render start times in reminder bodies
    #[serde(default)]
    pub display_utc_offset_minutes: i16,
    /// Title used for jobs whose request has none
    #[serde(default = "default_title")]
    pub default_title: String,
    /// Cap on overdue jobs expired per sweep
    #[serde(default = "default_stale_batch_limit")]
    pub stale_batch_limit: usize,
    /// Cap, per status, on settled requests checked for reaping per sweep
    #[serde(default = "default_reap_batch_limit")]
    pub reap_batch_limit: usize,
}

fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_grace_window_ms() -> u64 {
    300_000
}
fn default_title() -> String {
    DEFAULT_TITLE.into()
}
fn default_stale_batch_limit() -> usize {
    DEFAULT_STALE_BATCH_LIMIT
}
fn default_reap_batch_limit() -> usize {
    DEFAULT_REAP_BATCH_LIMIT
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            grace_window_ms: default_grace_window_ms(),
            display_utc_offset_minutes: 0,
            default_title: default_title(),
            stale_batch_limit: default_stale_batch_limit(),
            reap_batch_limit: default_reap_batch_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PushProvider {
    /// Log messages instead of sending them
    #[default]
    Log,
    Fcm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub provider: PushProvider,
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub project_id: Option<String>,
    /// For security, prefer the REMINDLY__PUSH__ACCESS_TOKEN env var
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_push_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_push_endpoint() -> String {
    DEFAULT_FCM_ENDPOINT.into()
}
fn default_push_timeout_ms() -> u64 {
    10_000
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            provider: PushProvider::default(),
            endpoint: default_push_endpoint(),
            project_id: None,
            access_token: None,
            timeout_ms: default_push_timeout_ms(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "remindly.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., REMINDLY__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("REMINDLY")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
