//! Role management API endpoints
//!
//! Grants and revocations run the role's hooks, so blacklisting a user or
//! blocking a domain happens right here.

use axum::Extension;

use crate::roles::RoleRegistry;
use crate::storage::AuditEntry;
use crate::storage::Storage;

use super::AuditTrail;
use super::CurrentPrincipal;
use super::Error;
use super::PathParameters;
use super::Success;

/// Grant a role to an entity
pub async fn grant<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    Extension(registry): Extension<RoleRegistry<S>>,
    principal: CurrentPrincipal,
    PathParameters((role, entity)): PathParameters<(String, String)>,
) -> Result<Success<&'static str>, Error> {
    principal.require_admin(&storage).await?;

    registry
        .grant(&storage, &role, &entity, &principal.username)
        .await
        .map_err(Error::from_core)?;

    audit_trail
        .register(AuditEntry::GrantRole(&role, &entity))
        .await;

    Ok(Success::<&'static str>::no_content())
}

/// Revoke a role from an entity
pub async fn revoke<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    Extension(registry): Extension<RoleRegistry<S>>,
    principal: CurrentPrincipal,
    PathParameters((role, entity)): PathParameters<(String, String)>,
) -> Result<Success<&'static str>, Error> {
    principal.require_admin(&storage).await?;

    registry
        .revoke(&storage, &role, &entity)
        .await
        .map_err(Error::from_core)?;

    audit_trail
        .register(AuditEntry::RevokeRole(&role, &entity))
        .await;

    Ok(Success::<&'static str>::no_content())
}
