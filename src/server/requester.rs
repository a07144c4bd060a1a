//! Caller identity, as forwarded by the trusted reverse proxy.

use crate::user::{Permission, Requester};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_PERMISSIONS_HEADER: &str = "x-user-permissions";

#[derive(Debug)]
pub enum RequesterExtractionError {
    MissingUser,
}

impl IntoResponse for RequesterExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            RequesterExtractionError::MissingUser => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn extract_requester(parts: &Parts) -> Option<Requester> {
    let user_id = header_value(parts, USER_ID_HEADER)?;
    let permissions = header_value(parts, USER_PERMISSIONS_HEADER)
        .map(Permission::parse_list)
        .unwrap_or_default();
    debug!("Requester {} with {:?}", user_id, permissions);
    Some(Requester::new(user_id, permissions))
}

impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = RequesterExtractionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_requester(parts).ok_or(RequesterExtractionError::MissingUser)
    }
}
