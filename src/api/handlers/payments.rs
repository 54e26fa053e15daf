use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::api::middleware::peer_ip;
use crate::error::AppResult;
use crate::AppState;

/// Browser-facing paid-state poll. This is the only place the backend is
/// asked whether an invoice settled; the L402 guard itself trusts the
/// preimage instead.
pub async fn payment_status(
    State(state): State<AppState>,
    addr: Option<ConnectInfo<SocketAddr>>,
    Path(payment_hash): Path<String>,
) -> AppResult<Json<Value>> {
    state
        .rate_limits
        .payment_status
        .enforce(peer_ip(addr.as_ref()))?;

    if state.config.test_mode() {
        return Ok(Json(json!({ "paid": true })));
    }

    let paid = state.payments.is_paid(&payment_hash).await;
    Ok(Json(json!({ "paid": paid })))
}
