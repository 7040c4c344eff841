use chrono::FixedOffset;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub market: MarketConfig,
    pub settlement: SettlementConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketConfig {
    pub store: StoreKind,
    pub utc_offset_hours: i32,
    pub cancel_window_minutes: i64,
    pub max_conflict_retries: u32,
    pub sweep_interval_seconds: u64,
}

impl MarketConfig {
    /// None when the configured offset is outside +/-24h
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
    }

    pub fn cancel_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cancel_window_minutes)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlementConfig {
    /// Shared with the payment provider, sent as `X-Webhook-Secret`
    pub webhook_secret: String,
    pub pix_delay_seconds: u64,
    pub card_delay_seconds: u64,
    pub billet_delay_seconds: u64,
    pub max_in_flight: usize,
    pub compensation_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `ENERMARKET__MARKET__STORE=memory`
            .add_source(config::Environment::with_prefix("ENERMARKET").separator("__"))
            .build()?;

        let cfg: Config = s.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the background tasks cannot run with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.market.sweep_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "market.sweep_interval_seconds must be at least 1".into(),
            ));
        }
        if self.market.utc_offset().is_none() {
            return Err(config::ConfigError::Message(
                "market.utc_offset_hours must be within +/-23".into(),
            ));
        }
        if self.settlement.webhook_secret.is_empty() {
            return Err(config::ConfigError::Message(
                "settlement.webhook_secret must not be empty".into(),
            ));
        }
        Ok(())
    }
}
