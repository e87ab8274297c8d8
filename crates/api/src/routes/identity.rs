//! Requester identity extraction.
//!
//! Authentication happens upstream. The gateway forwards the resolved user
//! in `x-user-id` and their role in `x-user-role`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Requester, Role, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated requester of the current request.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Requester);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id: UserId = header(parts, USER_ID_HEADER)?
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER} header")))?;
        let role: Role = header(parts, USER_ROLE_HEADER)?
            .parse()
            .map_err(|e| ApiError::BadRequest(format!("Invalid {USER_ROLE_HEADER} header: {e}")))?;

        Ok(Identity(Requester::new(user_id, role)))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {name} header")))?
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {name} header")))
}
