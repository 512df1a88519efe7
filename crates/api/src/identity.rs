//! Caller identity extracted from request headers.
//!
//! Credentials are verified by the gateway in front of this service, which
//! forwards the authenticated user as `x-user-id` and `x-user-role`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Actor, Role, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Any authenticated caller. A missing role header means customer.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Actor);

/// An authenticated caller with the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::Unauthenticated(format!("Malformed {name} header")))
        })
        .transpose()
}

fn actor_from_parts(parts: &Parts) -> Result<Actor, ApiError> {
    let user_id: UserId = header(parts, USER_ID_HEADER)?
        .ok_or_else(|| ApiError::Unauthenticated(format!("Missing {USER_ID_HEADER} header")))?
        .parse()
        .map_err(|e| ApiError::Unauthenticated(format!("Invalid {USER_ID_HEADER}: {e}")))?;

    let role = match header(parts, USER_ROLE_HEADER)? {
        Some(role) => role.parse::<Role>().map_err(ApiError::Unauthenticated)?,
        None => Role::Customer,
    };

    Ok(Actor::new(user_id, role))
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_parts(parts).map(CurrentUser)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = actor_from_parts(parts)?;
        if !actor.is_admin() {
            return Err(ApiError::Forbidden("Admin role required".to_string()));
        }
        Ok(AdminUser(actor))
    }
}
