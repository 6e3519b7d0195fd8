use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use postpulse_core::config::AuthMode;

use crate::{error::AppError, state::AppState};

/// Constant-time comparison of the sha256 digests of both tokens.
///
/// Hashing first fixes the compared length, so a token's length does not
/// leak either.
fn token_matches(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented.as_slice().ct_eq(expected.as_slice()).into()
}

/// Gate for `/api/admin/*`: requires `Authorization: Bearer <POSTPULSE_ADMIN_TOKEN>`.
///
/// With no token configured the admin routes are open.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let AuthMode::Token(expected) = &state.config.auth_mode else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token_matches(token, expected) => next.run(request).await,
        _ => {
            tracing::warn!(uri = %request.uri(), "Rejected admin request");
            AppError::Unauthorized.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_matches_only_the_exact_token() {
        assert!(token_matches("secret", "secret"));
        assert!(!token_matches("Secret", "secret"));
        assert!(!token_matches("secret-but-longer", "secret"));
        assert!(!token_matches("", "secret"));
    }
}
