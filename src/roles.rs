//! Role registry
//!
//! A fixed enumeration of role kinds, each implementing a small capability
//! interface, registered once into an immutable map at startup. Grants and
//! revocations run the role's hooks, which is how the cascading deletions
//! are wired to role changes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::CoreError;
use crate::errors::Result;
use crate::links;
use crate::storage::Storage;
use crate::utils::env_var_or_else;

/// May manage everything, review queue included
pub const ADMIN: &str = "admin";

/// Lost the right to own links; granting soft-deletes them all
pub const BLACKLISTED: &str = "blacklisted";

/// A blocked destination domain; granting soft-deletes links under it
pub const BLOCKED_URL: &str = "blocked_url";

/// Capability interface of a single role kind
#[async_trait]
pub trait RoleHooks<S: Storage>: Send + Sync {
    /// The name the role is granted under
    fn name(&self) -> &'static str;

    /// May this entity hold the role at all?
    fn qualifies(&self, entity: &str) -> bool;

    /// Is the entity well-formed for this role?
    fn validate(&self, entity: &str) -> bool;

    /// Runs after the grant is recorded
    async fn on_grant(&self, storage: &S, entity: &str) -> Result<()>;

    /// Runs after the grant is removed
    async fn on_revoke(&self, storage: &S, entity: &str) -> Result<()>;
}

/// The administrator role, entities are usernames
struct AdminRole;

#[async_trait]
impl<S: Storage> RoleHooks<S> for AdminRole {
    fn name(&self) -> &'static str {
        ADMIN
    }

    fn qualifies(&self, _entity: &str) -> bool {
        true
    }

    fn validate(&self, entity: &str) -> bool {
        is_username(entity)
    }

    async fn on_grant(&self, _storage: &S, _entity: &str) -> Result<()> {
        Ok(())
    }

    async fn on_revoke(&self, _storage: &S, _entity: &str) -> Result<()> {
        Ok(())
    }
}

/// The blacklist role, entities are usernames
struct BlacklistedRole;

#[async_trait]
impl<S: Storage> RoleHooks<S> for BlacklistedRole {
    fn name(&self) -> &'static str {
        BLACKLISTED
    }

    fn qualifies(&self, _entity: &str) -> bool {
        true
    }

    fn validate(&self, entity: &str) -> bool {
        is_username(entity)
    }

    async fn on_grant(&self, storage: &S, entity: &str) -> Result<()> {
        let deleted = links::blacklist_user_links(storage, entity).await?;

        tracing::info!("Blacklisted {entity}, soft-deleted {deleted} links");

        Ok(())
    }

    async fn on_revoke(&self, storage: &S, entity: &str) -> Result<()> {
        let restored = links::unblacklist_user_links(storage, entity).await?;

        tracing::info!("Unblacklisted {entity}, restored {restored} links");

        Ok(())
    }
}

/// The blocked-destination role, entities are domains
struct BlockedUrlRole;

#[async_trait]
impl<S: Storage> RoleHooks<S> for BlockedUrlRole {
    fn name(&self) -> &'static str {
        BLOCKED_URL
    }

    fn qualifies(&self, _entity: &str) -> bool {
        true
    }

    fn validate(&self, entity: &str) -> bool {
        is_domain(entity)
    }

    async fn on_grant(&self, storage: &S, entity: &str) -> Result<()> {
        let link_ids = storage.find_link_ids_by_destination_fragment(entity).await?;
        let deleted = links::block_urls(storage, &link_ids).await?;

        tracing::info!("Blocked {entity}, soft-deleted {deleted} links");

        Ok(())
    }

    async fn on_revoke(&self, storage: &S, entity: &str) -> Result<()> {
        let link_ids = storage.find_link_ids_by_destination_fragment(entity).await?;
        let restored = links::unblock_urls(storage, &link_ids).await?;

        tracing::info!("Unblocked {entity}, restored {restored} links");

        Ok(())
    }
}

/// The immutable role registry
///
/// Built once at startup; dispatch never changes afterwards.
pub struct RoleRegistry<S: Storage> {
    /// All known roles by name
    roles: Arc<HashMap<&'static str, Arc<dyn RoleHooks<S>>>>,
}

impl<S: Storage> Clone for RoleRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            roles: Arc::clone(&self.roles),
        }
    }
}

impl<S: Storage> RoleRegistry<S> {
    /// The standard registry with all built-in roles
    pub fn standard() -> Self {
        let all: Vec<Arc<dyn RoleHooks<S>>> = vec![
            Arc::new(AdminRole),
            Arc::new(BlacklistedRole),
            Arc::new(BlockedUrlRole),
        ];

        Self {
            roles: Arc::new(all.into_iter().map(|role| (role.name(), role)).collect()),
        }
    }

    /// Grant a role to an entity and run its hook
    pub async fn grant(
        &self,
        storage: &S,
        role: &str,
        entity: &str,
        granted_by: &str,
    ) -> Result<()> {
        let hooks = self.roles.get(role).ok_or(CoreError::NotFound)?;

        if !hooks.qualifies(entity) || !hooks.validate(entity) {
            return Err(CoreError::BadDestination(format!(
                r#"invalid entity "{entity}" for role {role}"#
            )));
        }

        storage.grant_role(role, entity, granted_by).await?;

        hooks.on_grant(storage, entity).await
    }

    /// Revoke a role from an entity and run its hook
    pub async fn revoke(&self, storage: &S, role: &str, entity: &str) -> Result<()> {
        let hooks = self.roles.get(role).ok_or(CoreError::NotFound)?;

        if !storage.has_role(role, entity).await? {
            return Err(CoreError::NotFound);
        }

        storage.revoke_role(role, entity).await?;

        hooks.on_revoke(storage, entity).await
    }
}

/// Seed the first administrator
///
/// Without one the review queue and the role endpoints are unreachable.
pub async fn ensure_initial_admin<S: Storage>(storage: &S) -> anyhow::Result<()> {
    let admins = storage.role_entities(ADMIN).await?;

    if admins.is_empty() {
        let username = env_var_or_else("INITIAL_ADMIN", String::new);

        if username.is_empty() {
            tracing::info!("`INITIAL_ADMIN` not set, no administrator seeded");
        } else {
            storage.grant_role(ADMIN, &username, "startup").await?;

            tracing::info!("Granted the admin role to {username}");
        }
    }

    Ok(())
}

/// Usernames: short, printable, no whitespace
fn is_username(entity: &str) -> bool {
    !entity.is_empty()
        && entity.len() <= 64
        && entity
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '@'))
}

/// Domains: at least one dot, no whitespace, no path separators
fn is_domain(entity: &str) -> bool {
    !entity.is_empty()
        && entity.contains('.')
        && !entity.contains('/')
        && !entity.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_username() {
        assert!(is_username("jdoe"));
        assert!(is_username("j.doe@example"));

        assert!(!is_username(""));
        assert!(!is_username("has space"));
    }

    #[test]
    fn test_is_domain() {
        assert!(is_domain("example.com"));
        assert!(is_domain("sub.example.com"));

        assert!(!is_domain("example"));
        assert!(!is_domain("example.com/path"));
        assert!(!is_domain("two words.com"));
    }
}
