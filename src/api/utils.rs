//! Utility functions for the API

use uuid::Uuid;

use crate::api::Error;
use crate::links::Link;
use crate::storage::Storage;

/// Fetch a link from storage
///
/// Soft-deleted links are as good as gone for the API surface.
pub async fn fetch_link<S: Storage>(storage: &S, link_id: &Uuid) -> Result<Link, Error> {
    storage
        .find_link_by_id(link_id)
        .await
        .map_err(Error::internal_server_error)?
        .filter(|link| !link.is_deleted())
        .map_or_else(|| Err(Error::not_found("Link not found")), Ok)
}
