pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use std::sync::Arc;

use sqlx::SqlitePool;

use api::middleware::RateLimits;
use config::Config;
use services::{DomainVerifier, PaymentsClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: SqlitePool,
    pub payments: Arc<PaymentsClient>,
    pub domain_verifier: Arc<DomainVerifier>,
    pub rate_limits: Arc<RateLimits>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: SqlitePool,
        payments: PaymentsClient,
        domain_verifier: DomainVerifier,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db,
            payments: Arc::new(payments),
            domain_verifier: Arc::new(domain_verifier),
            rate_limits: Arc::new(RateLimits::new()),
        }
    }
}
