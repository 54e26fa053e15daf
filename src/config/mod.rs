use serde::Deserialize;
use std::sync::Arc;

/// The literal root-key value that disables every L402 gate.
pub const TEST_MODE_KEY: &str = "test-mode";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payments: PaymentsConfig,
    pub auth: AuthConfig,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Root key for macaroon minting. The literal "test-mode" bypasses all
    /// payment gates; an empty value refuses startup.
    pub root_key: String,
    pub price_sats: u64,
    pub submit_price_sats: u64,
    pub review_price_sats: u64,
    pub bulk_price_sats: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("database.url", "sqlite://satring.db")?
            .set_default("database.max.connections", 10)?
            .set_default("payment.url", "")?
            .set_default("payment.key", "")?
            .set_default("base.url", "http://localhost:8080")?
            .set_default("auth.price.sats", 100)?
            .set_default("auth.submit.price.sats", 1000)?
            .set_default("auth.review.price.sats", 10)?
            .set_default("auth.bulk.price.sats", 1000)?
            .add_source(config::Environment::default().separator("_").try_parsing(true))
            .build()?;

        // Manual construction due to environment variable naming
        Ok(Config {
            server: ServerConfig {
                host: config.get_string("host").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: config.get_int("port").unwrap_or(8080) as u16,
            },
            database: DatabaseConfig {
                url: config.get_string("database.url")?,
                max_connections: config.get_int("database.max.connections").unwrap_or(10) as u32,
            },
            payments: PaymentsConfig {
                url: config.get_string("payment.url")?,
                api_key: config.get_string("payment.key")?,
            },
            auth: AuthConfig {
                root_key: config.get_string("auth.root.key")?,
                price_sats: config.get_int("auth.price.sats").unwrap_or(100) as u64,
                submit_price_sats: config.get_int("auth.submit.price.sats").unwrap_or(1000) as u64,
                review_price_sats: config.get_int("auth.review.price.sats").unwrap_or(10) as u64,
                bulk_price_sats: config.get_int("auth.bulk.price.sats").unwrap_or(1000) as u64,
            },
            base_url: config.get_string("base.url")?,
        })
    }

    /// True when the process runs with payment gates disabled.
    pub fn test_mode(&self) -> bool {
        self.auth.root_key == TEST_MODE_KEY
    }
}

pub type SharedConfig = Arc<Config>;
