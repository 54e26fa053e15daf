use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use validator::Validate;

use crate::api::handlers::services::get_service_or_404;
use crate::api::middleware::peer_ip;
use crate::db::repositories::RatingRepository;
use crate::error::AppResult;
use crate::models::{RatingCreate, RatingOut};
use crate::services::l402;
use crate::AppState;

pub async fn list_ratings(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Vec<RatingOut>>> {
    let service = get_service_or_404(&state.db, &slug).await?;
    let ratings = RatingRepository::list_for_service(&state.db, service.id).await?;
    Ok(Json(ratings.into_iter().map(RatingOut::from).collect()))
}

pub async fn create_rating(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RatingCreate>,
) -> AppResult<(StatusCode, Json<RatingOut>)> {
    state.rate_limits.review.enforce(peer_ip(addr.as_ref()))?;
    l402::require_l402(
        &state,
        &headers,
        state.config.auth.review_price_sats,
        "satring.com review submission",
    )
    .await?;

    body.validate()?;
    let service = get_service_or_404(&state.db, &slug).await?;
    let rating = RatingRepository::create_with_aggregate(&state.db, service.id, &body).await?;
    Ok((StatusCode::CREATED, Json(RatingOut::from(rating))))
}
