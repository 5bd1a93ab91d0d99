//! Access resolution
//!
//! Who may see or change a link. Everything here is read-only and safe to
//! call from any request path; no locks are taken beyond the storage's
//! own round trip.

use std::collections::HashSet;

use crate::errors::Result;
use crate::links::Link;
use crate::links::Owner;
use crate::roles;
use crate::storage::Storage;

/// Is this person the stored owner of the link?
///
/// A plain equality check; organization-owned links have no single owner.
pub fn is_owner(link: &Link, username: &str) -> bool {
    matches!(&link.owner, Owner::User(owner) if owner == username)
}

/// May this person see the link and its analytics?
///
/// Owners always may. For organization-owned links membership is enough.
/// For personally-owned links, sharing at least one organization with the
/// owner is enough: both membership lists are fetched in parallel and
/// intersected.
pub async fn may_view<S: Storage>(storage: &S, link: &Link, username: &str) -> Result<bool> {
    if is_owner(link, username) {
        return Ok(true);
    }

    if storage.has_role(roles::ADMIN, username).await? {
        return Ok(true);
    }

    match &link.owner {
        Owner::Organization(name) => {
            let memberships = storage.organizations_of(username).await?;

            Ok(memberships.iter().any(|membership| membership == name))
        }
        Owner::User(owner) => {
            let (owner_organizations, principal_organizations) = tokio::join!(
                storage.organizations_of(owner),
                storage.organizations_of(username),
            );

            let principal_organizations: HashSet<String> =
                principal_organizations?.into_iter().collect();

            Ok(owner_organizations?
                .iter()
                .any(|organization| principal_organizations.contains(organization)))
        }
    }
}

/// May this person change or delete the link?
///
/// Ownership or the admin role; for organization-owned links an
/// organization administrator also qualifies. Organization co-membership
/// alone grants viewing, never editing.
pub async fn may_edit<S: Storage>(storage: &S, link: &Link, username: &str) -> Result<bool> {
    if is_owner(link, username) {
        return Ok(true);
    }

    if let Owner::Organization(name) = &link.owner {
        if let Some(organization) = storage.find_organization(name).await? {
            if organization.has_admin(username) {
                return Ok(true);
            }
        }
    }

    storage
        .has_role(roles::ADMIN, username)
        .await
        .map_err(Into::into)
}
