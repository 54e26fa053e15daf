use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use url::Url;
use validator::Validate;

use crate::api::middleware::peer_ip;
use crate::db::repositories::{
    service_repo::ListFilter, CategoryRepository, ServiceRepository,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    Service, ServiceCreate, ServiceCreateOut, ServiceListOut, ServiceOut, ServiceUpdate,
};
use crate::services::{edit_token, l402};
use crate::AppState;

pub const EDIT_TOKEN_HEADER: &str = "x-edit-token";

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub verified: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

impl ListParams {
    fn into_filter(self, with_query: bool) -> ListFilter {
        ListFilter {
            q: if with_query { self.q } else { None },
            category: self.category,
            status: self.status,
            verified: self.verified.as_deref() == Some("true"),
            sort: self.sort,
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, 100),
        }
    }
}

pub(crate) async fn get_service_or_404(pool: &SqlitePool, slug: &str) -> AppResult<Service> {
    ServiceRepository::find_by_slug(pool, slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Service".to_string()))
}

/// Attach categories to a page of rows in one batch query.
async fn hydrate(pool: &SqlitePool, services: Vec<Service>) -> AppResult<Vec<ServiceOut>> {
    let ids: Vec<i64> = services.iter().map(|s| s.id).collect();
    let mut by_service = CategoryRepository::for_services(pool, &ids).await?;
    Ok(services
        .into_iter()
        .map(|service| {
            let categories = by_service.remove(&service.id).unwrap_or_default();
            ServiceOut::from_service(service, categories)
        })
        .collect())
}

pub(crate) async fn hydrate_one(pool: &SqlitePool, service: Service) -> AppResult<ServiceOut> {
    let categories = CategoryRepository::for_service(pool, service.id).await?;
    Ok(ServiceOut::from_service(service, categories))
}

fn ensure_http_scheme(raw: &str) -> AppResult<()> {
    match Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(AppError::BadInput(
            "URL must start with http:// or https://".to_string(),
        )),
    }
}

fn verify_edit_header(headers: &HeaderMap, service: &Service) -> AppResult<()> {
    let presented = headers
        .get(EDIT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let valid = !presented.is_empty()
        && service
            .edit_token_hash
            .as_deref()
            .map(|stored| edit_token::verify(presented, stored))
            .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidEditToken)
    }
}

// --- free reads ---

pub async fn list_services(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ServiceListOut>> {
    let filter = params.into_filter(false);
    let (services, total) = ServiceRepository::list(&state.db, &filter).await?;
    let services = hydrate(&state.db, services).await?;
    Ok(Json(ServiceListOut {
        services,
        total,
        page: filter.page,
        page_size: filter.page_size,
    }))
}

pub async fn search_services(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ServiceListOut>> {
    let ip = peer_ip(addr.as_ref());
    state.rate_limits.search.enforce(ip)?;
    state.rate_limits.search_api.enforce(ip)?;

    let filter = params.into_filter(true);
    let (services, total) = ServiceRepository::list(&state.db, &filter).await?;
    let services = hydrate(&state.db, services).await?;
    Ok(Json(ServiceListOut {
        services,
        total,
        page: filter.page,
        page_size: filter.page_size,
    }))
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<ServiceOut>> {
    let service = get_service_or_404(&state.db, &slug).await?;
    Ok(Json(hydrate_one(&state.db, service).await?))
}

// --- priced reads ---

pub async fn bulk_export(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<ServiceOut>>> {
    l402::require_l402(
        &state,
        &headers,
        state.config.auth.bulk_price_sats,
        "satring.com bulk export",
    )
    .await?;

    let services = ServiceRepository::list_all(&state.db).await?;
    Ok(Json(hydrate(&state.db, services).await?))
}

// --- writes ---

pub async fn create_service(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<ServiceCreate>,
) -> AppResult<(StatusCode, Json<ServiceCreateOut>)> {
    state.rate_limits.submit.enforce(peer_ip(addr.as_ref()))?;
    l402::require_l402(
        &state,
        &headers,
        state.config.auth.submit_price_sats,
        "satring.com service submission",
    )
    .await?;

    body.validate()?;
    ensure_http_scheme(&body.url)?;
    if !body.logo_url.is_empty() {
        ensure_http_scheme(&body.logo_url)?;
    }

    let slug = ServiceRepository::unique_slug(&state.db, &body.name).await?;

    // One edit token governs a whole domain: a matching token presented at
    // submission binds the new listing to the existing hash.
    let mut reused_hash: Option<String> = None;
    if let Some(existing) = body.existing_edit_token.as_deref().filter(|t| !t.is_empty()) {
        for candidate in ServiceRepository::same_domain(&state.db, &body.url).await? {
            if let Some(stored) = candidate.edit_token_hash.as_deref() {
                if edit_token::verify(existing, stored) {
                    reused_hash = Some(stored.to_string());
                    break;
                }
            }
        }
    }

    let (plaintext, token_hash, token_reused) = match reused_hash {
        Some(hash) => (
            body.existing_edit_token.clone().unwrap_or_default(),
            hash,
            true,
        ),
        None => {
            let token = edit_token::mint()?;
            let hash = edit_token::hash(&token);
            (token, hash, false)
        }
    };

    let service = match ServiceRepository::find_purged_by_url(&state.db, &body.url).await? {
        Some(purged) => {
            ServiceRepository::overwrite_purged(&state.db, purged.id, &body, &slug, &token_hash)
                .await?
        }
        None => ServiceRepository::create(&state.db, &body, &slug, &token_hash).await?,
    };

    let out = hydrate_one(&state.db, service).await?;
    Ok((
        StatusCode::CREATED,
        Json(ServiceCreateOut {
            service: out,
            edit_token: plaintext,
            token_reused,
        }),
    ))
}

pub async fn update_service(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ServiceUpdate>,
) -> AppResult<Json<ServiceOut>> {
    state.rate_limits.edit.enforce(peer_ip(addr.as_ref()))?;
    body.validate()?;

    let mut service = get_service_or_404(&state.db, &slug).await?;
    verify_edit_header(&headers, &service)?;

    if let Some(logo_url) = body.logo_url.as_deref().filter(|l| !l.is_empty()) {
        ensure_http_scheme(logo_url)?;
    }

    if let Some(name) = body.name {
        service.name = name;
    }
    if let Some(description) = body.description {
        service.description = description;
    }
    if let Some(pricing_sats) = body.pricing_sats {
        service.pricing_sats = pricing_sats;
    }
    if let Some(pricing_model) = body.pricing_model {
        service.pricing_model = pricing_model;
    }
    if let Some(protocol) = body.protocol {
        service.protocol = protocol;
    }
    if let Some(owner_name) = body.owner_name {
        service.owner_name = owner_name;
    }
    if let Some(owner_contact) = body.owner_contact {
        service.owner_contact = owner_contact;
    }
    if let Some(logo_url) = body.logo_url {
        service.logo_url = logo_url;
    }

    let updated =
        ServiceRepository::update_profile(&state.db, &service, body.category_ids.as_deref())
            .await?;
    Ok(Json(hydrate_one(&state.db, updated).await?))
}

pub async fn delete_service(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    state.rate_limits.delete.enforce(peer_ip(addr.as_ref()))?;

    let service = get_service_or_404(&state.db, &slug).await?;
    verify_edit_header(&headers, &service)?;

    ServiceRepository::purge(&state.db, service.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
