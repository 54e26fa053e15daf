use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State},
    Json,
};
use serde::Serialize;

use crate::api::handlers::services::get_service_or_404;
use crate::api::middleware::peer_ip;
use crate::error::AppResult;
use crate::services::recovery::ChallengeIssued;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RecoverVerifyOut {
    pub edit_token: String,
    pub affected_services: Vec<String>,
}

pub async fn recover_generate(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Path(slug): Path<String>,
) -> AppResult<Json<ChallengeIssued>> {
    state.rate_limits.recover.enforce(peer_ip(addr.as_ref()))?;

    let service = get_service_or_404(&state.db, &slug).await?;
    let issued = state.domain_verifier.issue(&state.db, &service).await?;
    Ok(Json(issued))
}

pub async fn recover_verify(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Path(slug): Path<String>,
) -> AppResult<Json<RecoverVerifyOut>> {
    state.rate_limits.recover.enforce(peer_ip(addr.as_ref()))?;

    let service = get_service_or_404(&state.db, &slug).await?;
    let outcome = state.domain_verifier.verify(&state.db, &service).await?;
    Ok(Json(RecoverVerifyOut {
        edit_token: outcome.edit_token,
        affected_services: outcome.affected_slugs,
    }))
}
