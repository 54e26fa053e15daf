use chrono::{Duration, Utc};
use reqwest::{redirect, Client};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::repositories::ServiceRepository;
use crate::error::{AppError, AppResult};
use crate::models::Service;
use crate::services::{edit_token, netcheck};

pub const CHALLENGE_TTL_MINUTES: i64 = 30;
pub const WELL_KNOWN_PATH: &str = "/.well-known/satring-verify";

const FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeIssued {
    pub challenge: String,
    pub verify_url: String,
    pub expires_in_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub edit_token: String,
    pub affected_slugs: Vec<String>,
}

/// HTTP-01-style proof of domain control. One successful proof rebinds every
/// same-domain listing to a single fresh edit token.
#[derive(Clone)]
pub struct DomainVerifier {
    http_client: Client,
    enforce_public_addresses: bool,
}

impl DomainVerifier {
    pub fn new() -> Self {
        // Redirects stay off: a redirect chain could walk the fetch into an
        // address the pre-check never saw.
        let http_client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            enforce_public_addresses: true,
        }
    }

    /// Test-only: skip the reserved-address gate so scenarios can target a
    /// loopback stub server.
    #[cfg(test)]
    pub(crate) fn permissive() -> Self {
        Self {
            enforce_public_addresses: false,
            ..Self::new()
        }
    }

    pub fn verify_url(service_url: &str) -> Option<String> {
        netcheck::domain_root(service_url).map(|root| format!("{}{}", root, WELL_KNOWN_PATH))
    }

    /// Issue a fresh challenge for the listing: 32 random bytes hex-encoded,
    /// valid for 30 minutes.
    pub async fn issue(&self, pool: &SqlitePool, service: &Service) -> AppResult<ChallengeIssued> {
        let mut bytes = [0u8; 32];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| AppError::Internal(format!("Failed to generate random bytes: {}", e)))?;
        let challenge = hex::encode(bytes);

        let verify_url = Self::verify_url(&service.url)
            .ok_or_else(|| AppError::BadInput("Listing URL has no hostname".to_string()))?;

        let expires_at = Utc::now() + Duration::minutes(CHALLENGE_TTL_MINUTES);
        ServiceRepository::set_challenge(pool, service.id, &challenge, expires_at).await?;

        Ok(ChallengeIssued {
            challenge,
            verify_url,
            expires_in_minutes: CHALLENGE_TTL_MINUTES,
        })
    }

    /// Fetch the well-known file and, on an exact challenge match, rotate the
    /// edit token across the whole domain in one transaction.
    pub async fn verify(&self, pool: &SqlitePool, service: &Service) -> AppResult<RecoveryOutcome> {
        let expected = match (&service.domain_challenge, service.has_active_challenge(Utc::now())) {
            (Some(challenge), true) => challenge.as_str(),
            _ => return Err(AppError::NoActiveChallenge),
        };

        // SSRF gate: resolve and vet the hostname before any outbound request.
        let hostname =
            netcheck::effective_domain(&service.url).ok_or(AppError::PrivateAddress)?;
        if self.enforce_public_addresses && !netcheck::resolves_public(&hostname).await {
            tracing::warn!(host = %hostname, "Domain verify refused: private or unresolvable");
            return Err(AppError::PrivateAddress);
        }

        let verify_url = Self::verify_url(&service.url).ok_or(AppError::PrivateAddress)?;
        let response = self
            .http_client
            .get(&verify_url)
            .send()
            .await
            .map_err(|_| AppError::Unreachable(verify_url.clone()))?;
        let body = response
            .text()
            .await
            .map_err(|_| AppError::Unreachable(verify_url.clone()))?;

        if body.trim() != expected {
            return Err(AppError::ChallengeMismatch);
        }

        let token = edit_token::mint()?;
        let new_hash = edit_token::hash(&token);

        let affected = ServiceRepository::same_domain(pool, &service.url).await?;
        let affected_ids: Vec<i64> = affected.iter().map(|s| s.id).collect();
        ServiceRepository::rotate_edit_tokens(pool, &affected_ids, &new_hash, service.id).await?;

        tracing::info!(
            domain = %hostname,
            listings = affected_ids.len(),
            "Domain verified; edit token rotated"
        );

        Ok(RecoveryOutcome {
            edit_token: token,
            affected_slugs: affected.into_iter().map(|s| s.slug).collect(),
        })
    }
}

impl Default for DomainVerifier {
    fn default() -> Self {
        Self::new()
    }
}
