use crate::error::AppError;
use crate::models::Identity;
use crate::state::AppState;
use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use std::ops::Deref;

/// Bearer token from the `Authorization` header, if present.
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Caller identity verified from the bearer access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity(pub Identity);

impl Deref for AuthenticatedIdentity {
    type Target = Identity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for AuthenticatedIdentity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match (req.app_data::<web::Data<AppState>>(), bearer_token(req)) {
            (Some(state), Some(token)) => state.tokens.verify_access(token).map(AuthenticatedIdentity),
            (None, _) => {
                tracing::error!("AppState missing from app data");
                Err(AppError::Internal)
            }
            (_, None) => Err(AppError::Unauthorized),
        };
        ready(result)
    }
}
