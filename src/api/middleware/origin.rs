use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request},
    middleware::Next,
    response::Response,
};
use url::Url;

use crate::error::AppError;
use crate::AppState;

/// CSRF defense: a mutating request carrying an Origin header must come from
/// the host `BASE_URL` names. Requests without an Origin (curl, SDKs, other
/// non-browser clients) pass through.
pub async fn origin_check(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let mutating = matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );

    if mutating {
        if let Some(origin) = request
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
        {
            let allowed = host_of(&state.config.base_url);
            let actual = host_of(origin);
            if allowed.is_none() || actual.is_none() || allowed != actual {
                tracing::warn!(origin = %origin, "Cross-origin mutation blocked");
                return Err(AppError::CrossOriginBlocked);
            }
        }
    }

    Ok(next.run(request).await)
}

fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::host_of;

    #[test]
    fn host_of_extracts_and_lowercases() {
        assert_eq!(host_of("https://Example.COM:8443"), Some("example.com".to_string()));
        assert_eq!(host_of("http://localhost:8080"), Some("localhost".to_string()));
        assert_eq!(host_of("garbage"), None);
    }
}
