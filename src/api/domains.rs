//! Known-phishing domain API endpoints
//!
//! The membership table behind one of the blocked-domain rules.
//! Append-only from this surface; dropping an entry is a manual
//! storage operation.

use axum::Extension;

use crate::storage::Storage;

use super::CurrentPrincipal;
use super::Error;
use super::PathParameters;
use super::Success;

/// Add a domain to the known-phishing table
///
/// Takes effect immediately: new links under the domain fail screening.
/// Existing links are untouched; block those through the `blocked_url`
/// role instead.
pub async fn ban<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(domain): PathParameters<String>,
) -> Result<Success<&'static str>, Error> {
    principal.require_admin(&storage).await?;

    if !domain.contains('.') || domain.contains('/') {
        return Err(Error::bad_request("Invalid domain"));
    }

    storage
        .add_banned_domain(&domain)
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::<&'static str>::no_content())
}
