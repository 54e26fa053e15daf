use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use crate::api::handlers::services::get_service_or_404;
use crate::db::repositories::{CategoryRepository, RatingRepository, ServiceRepository};
use crate::error::AppResult;
use crate::models::{RatingOut, ServiceOut};
use crate::services::l402;
use crate::AppState;

const PREMIUM_MEMO: &str = "satring.com premium API access";

#[derive(Debug, Serialize)]
pub struct AnalyticsOut {
    pub total_services: i64,
    pub total_ratings: i64,
    pub avg_price_sats: f64,
    pub top_rated: Vec<ServiceOut>,
}

#[derive(Debug, Serialize)]
pub struct ReputationOut {
    pub service: String,
    pub slug: String,
    pub avg_rating: f64,
    pub rating_count: i64,
    pub distribution: BTreeMap<String, i64>,
    pub recent_reviews: Vec<RatingOut>,
}

pub async fn analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<AnalyticsOut>> {
    l402::require_l402(&state, &headers, state.config.auth.price_sats, PREMIUM_MEMO).await?;

    let total_services = ServiceRepository::count_non_purged(&state.db).await?;
    let total_ratings = RatingRepository::count_all(&state.db).await?;
    let avg_price = ServiceRepository::avg_price_sats(&state.db).await?;

    let top = ServiceRepository::top_rated(&state.db, 10).await?;
    let ids: Vec<i64> = top.iter().map(|s| s.id).collect();
    let mut by_service = CategoryRepository::for_services(&state.db, &ids).await?;
    let top_rated = top
        .into_iter()
        .map(|service| {
            let categories = by_service.remove(&service.id).unwrap_or_default();
            ServiceOut::from_service(service, categories)
        })
        .collect();

    Ok(Json(AnalyticsOut {
        total_services,
        total_ratings,
        avg_price_sats: (avg_price * 10.0).round() / 10.0,
        top_rated,
    }))
}

pub async fn reputation(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<ReputationOut>> {
    l402::require_l402(&state, &headers, state.config.auth.price_sats, PREMIUM_MEMO).await?;

    let service = get_service_or_404(&state.db, &slug).await?;

    let counts = RatingRepository::distribution(&state.db, service.id).await?;
    let mut distribution: BTreeMap<String, i64> =
        (1..=5).map(|score| (score.to_string(), 0)).collect();
    for (score, count) in counts {
        distribution.insert(score.to_string(), count);
    }

    let recent = RatingRepository::recent_for_service(&state.db, service.id, 20).await?;

    Ok(Json(ReputationOut {
        service: service.name,
        slug: service.slug,
        avg_rating: service.avg_rating,
        rating_count: service.rating_count,
        distribution,
        recent_reviews: recent.into_iter().map(RatingOut::from).collect(),
    }))
}
