use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};
use std::sync::Arc;
use tracing::debug;

use crate::web::models::{AuthenticatedUser, Claims};
use crate::web::{AppState, error::AppError};

/// Cookie set by the login handler.
pub const TOKEN_COOKIE: &str = "token";

/// A bearer token wins over the login cookie.
fn token_from_request(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    bearer.or_else(|| jar.get(TOKEN_COOKIE).map(|cookie| cookie.value().to_string()))
}

fn user_from_token(token: &str, jwt_secret: &str) -> Result<AuthenticatedUser, AppError> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!(error = %e, "Token rejected.");
        AppError::AuthenticationRequired
    })?
    .claims;

    Ok(AuthenticatedUser { id: claims.user_id, username: claims.sub })
}

/// Guards every favourites API route except register, login and health.
pub async fn auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    let token = token_from_request(req.headers(), &jar).ok_or(AppError::AuthenticationRequired)?;
    let user = user_from_token(&token, &state.config.jwt_secret)?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
