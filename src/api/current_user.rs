//! Current principal service
//!
//! Session establishment is somebody else's job; by the time a request
//! gets here the federated login layer has put the authenticated username
//! in the `X-Remote-User` header. We take it at face value.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::roles;
use crate::storage::Storage;

use super::Error;

/// Header carrying the authenticated username
pub const PRINCIPAL_HEADER: &str = "x-remote-user";

/// The authenticated principal of a request
#[derive(Clone, Debug)]
pub struct CurrentPrincipal {
    /// The authenticated username
    pub username: String,
}

impl CurrentPrincipal {
    /// Fail with a generic permission error unless the principal is an
    /// administrator
    pub async fn require_admin<S: Storage>(&self, storage: &S) -> Result<(), Error> {
        let is_admin = storage
            .has_role(roles::ADMIN, &self.username)
            .await
            .map_err(Error::internal_server_error)?;

        if is_admin {
            Ok(())
        } else {
            Err(Error::forbidden("Not allowed"))
        }
    }
}

impl<B> FromRequestParts<B> for CurrentPrincipal
where
    B: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &B) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match username {
            Some(username) => Ok(CurrentPrincipal {
                username: username.to_string(),
            }),
            None => Err(Error::forbidden("Missing authenticated principal")),
        }
    }
}
