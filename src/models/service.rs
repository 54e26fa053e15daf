use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::Category;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Unverified,
    Live,
    Dead,
    Purged,
}

/// Database row. `edit_token_hash` and `domain_challenge` stay server-side;
/// every boundary response goes through [`ServiceOut`].
#[derive(Debug, Clone, FromRow)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub url: String,
    pub description: String,
    pub pricing_sats: i64,
    pub pricing_model: String,
    pub protocol: String,
    pub owner_name: String,
    pub owner_contact: String,
    pub logo_url: String,
    pub edit_token_hash: Option<String>,
    pub domain_challenge: Option<String>,
    pub domain_challenge_expires_at: Option<DateTime<Utc>>,
    pub domain_verified: bool,
    pub avg_rating: f64,
    pub rating_count: i64,
    pub status: ServiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn has_active_challenge(&self, now: DateTime<Utc>) -> bool {
        matches!(
            (&self.domain_challenge, self.domain_challenge_expires_at),
            (Some(_), Some(expires)) if expires > now
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceOut {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub url: String,
    pub description: String,
    pub pricing_sats: i64,
    pub pricing_model: String,
    pub protocol: String,
    pub owner_name: String,
    pub logo_url: String,
    pub avg_rating: f64,
    pub rating_count: i64,
    pub status: ServiceStatus,
    pub domain_verified: bool,
    pub categories: Vec<Category>,
    pub created_at: DateTime<Utc>,
}

impl ServiceOut {
    pub fn from_service(service: Service, categories: Vec<Category>) -> Self {
        Self {
            id: service.id,
            name: service.name,
            slug: service.slug,
            url: service.url,
            description: service.description,
            pricing_sats: service.pricing_sats,
            pricing_model: service.pricing_model,
            protocol: service.protocol,
            owner_name: service.owner_name,
            logo_url: service.logo_url,
            avg_rating: service.avg_rating,
            rating_count: service.rating_count,
            status: service.status,
            domain_verified: service.domain_verified,
            categories,
            created_at: service.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceListOut {
    pub services: Vec<ServiceOut>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// The plaintext edit token leaves the system exactly once, here.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceCreateOut {
    #[serde(flatten)]
    pub service: ServiceOut,
    pub edit_token: String,
    pub token_reused: bool,
}

fn default_pricing_model() -> String {
    "per-request".to_string()
}

fn default_protocol() -> String {
    "L402".to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServiceCreate {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 500))]
    pub url: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    #[serde(default)]
    pub pricing_sats: i64,
    #[serde(default = "default_pricing_model")]
    #[validate(length(max = 50))]
    pub pricing_model: String,
    #[serde(default = "default_protocol")]
    #[validate(length(max = 10))]
    pub protocol: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub owner_name: String,
    #[serde(default)]
    #[validate(length(max = 300))]
    pub owner_contact: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub logo_url: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 2))]
    pub category_ids: Vec<i64>,
    #[serde(default)]
    pub existing_edit_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ServiceUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub pricing_sats: Option<i64>,
    #[validate(length(max = 50))]
    pub pricing_model: Option<String>,
    #[validate(length(max = 10))]
    pub protocol: Option<String>,
    #[validate(length(max = 200))]
    pub owner_name: Option<String>,
    #[validate(length(max = 300))]
    pub owner_contact: Option<String>,
    #[validate(length(max = 500))]
    pub logo_url: Option<String>,
    #[validate(length(min = 1, max = 2))]
    pub category_ids: Option<Vec<i64>>,
}
