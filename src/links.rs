//! Links and their lifecycle
//!
//! Create/modify/delete operations, alias management and the cascading
//! bulk operations triggered by role changes. Everything here is a
//! soft-delete; visit history and deletion metadata are never destroyed.

use chrono::Utc;
use chrono::naive::NaiveDateTime;
use serde::Deserialize;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::aliases;
use crate::aliases::Alias;
use crate::codes;
use crate::errors::CoreError;
use crate::errors::Result;
use crate::review::PendingLink;
use crate::review::ReviewStatus;
use crate::security::DestinationPolicy;
use crate::storage;
use crate::storage::CreateLinkValues;
use crate::storage::CreatePendingValues;
use crate::storage::Storage;
use crate::storage::UpdateLinkValues;

/// Owner of a link
///
/// Either a single person or a whole organization.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "kebab-case")]
pub enum Owner {
    /// Owned by a single person, by username
    User(String),

    /// Owned by an organization, by name
    Organization(String),
}

/// Who soft-deleted a link
///
/// Cascade deletions carry their own variant so they can be reversed
/// without resurrecting independently-deleted links.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "kebab-case")]
pub enum DeletedBy {
    /// Deleted on purpose, by username
    Person(String),

    /// Deleted because the owner lost their link-creation rights
    BlacklistCascade,

    /// Deleted because the destination domain was blocked
    BlockCascade,
}

/// A shortened link
#[derive(Clone, Debug)]
pub struct Link {
    /// Link ID
    pub id: Uuid,

    /// Human-readable title
    pub title: String,

    /// Where the aliases redirect to
    pub destination: String,

    /// Who owns (and may always edit) the link
    pub owner: Owner,

    /// Total recorded visits, denormalized from the visit log
    pub visits: u64,

    /// Visits from a tracking id not seen before on this link
    pub unique_visits: u64,

    /// All aliases, soft-deleted ones included
    pub aliases: Vec<Alias>,

    /// Creation date
    pub created_at: NaiveDateTime,

    /// When the link stops resolving, if ever
    pub expires_at: Option<NaiveDateTime>,

    /// Soft-deleted at
    pub deleted_at: Option<NaiveDateTime>,

    /// Soft-deleted by
    pub deleted_by: Option<DeletedBy>,
}

impl Link {
    /// Is the link soft-deleted?
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Has the expiration time passed?
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Find an alias on this link by its canonical form
    pub fn find_alias(&self, alias: &str) -> Option<&Alias> {
        self.aliases.iter().find(|entry| entry.alias == alias)
    }
}

/// How to change the expiration time on update
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ExpirationChange {
    /// Leave as-is
    #[default]
    Keep,

    /// Set or replace the expiration time
    Set(NaiveDateTime),

    /// Remove the expiration time, making the link resolvable again
    Clear,
}

/// Fields to create a link with
pub struct NewLink<'a> {
    /// Human-readable title
    pub title: &'a str,

    /// Destination URL, already syntactically valid
    pub destination: &'a Url,

    /// Owner of the new link
    pub owner: &'a Owner,

    /// Optional expiration time
    pub expires_at: Option<NaiveDateTime>,

    /// Skip the reputation oracle
    ///
    /// Blocked-domain rules always apply, bypass or not.
    pub bypass_review: bool,
}

/// Result of a create: either live, or held for review
pub enum CreatedLink {
    /// The link was persisted and resolves immediately
    Live(Link),

    /// The reputation oracle flagged the destination
    HeldForReview(PendingLink),
}

/// Create a link with zero aliases
///
/// Screens the destination against the blocked-domain rules, then routes
/// flagged destinations into the review workflow. Attaching the first
/// alias is a follow-up [`create_or_modify_alias`] call.
pub async fn create_link<S: Storage>(
    storage: &S,
    policy: &DestinationPolicy,
    new: &NewLink<'_>,
) -> Result<CreatedLink> {
    policy.screen(storage, new.destination).await?;

    // one review record per destination, pending or settled
    let existing_review = storage
        .find_pending_by_destination(new.destination.as_str())
        .await?;

    let already_approved = match existing_review {
        Some(ref pending) => match pending.status {
            ReviewStatus::Pending | ReviewStatus::Denied => {
                return Err(CoreError::PendingOrRejected);
            }
            ReviewStatus::Approved => true,
        },
        None => false,
    };

    if !new.bypass_review && !already_approved && policy.flagged(new.destination).await {
        let pending = storage
            .create_pending(&CreatePendingValues {
                title: new.title,
                destination: new.destination,
                owner: new.owner,
                expires_at: new.expires_at,
            })
            .await?;

        tracing::info!(
            "Destination {} flagged, holding link for review as {}",
            new.destination,
            pending.id
        );

        return Ok(CreatedLink::HeldForReview(pending));
    }

    let link = storage
        .create_link(&CreateLinkValues {
            title: new.title,
            destination: new.destination,
            owner: new.owner,
            expires_at: new.expires_at,
        })
        .await?;

    Ok(CreatedLink::Live(link))
}

/// Fields to update a link with
pub struct UpdateLink<'a> {
    /// New title, untouched when absent
    pub title: Option<&'a str>,

    /// New destination, untouched when absent
    pub destination: Option<&'a Url>,

    /// Expiration change
    pub expiration: ExpirationChange,
}

/// Update a link
///
/// A supplied destination is re-screened against the blocked-domain rules.
pub async fn modify_link<S: Storage>(
    storage: &S,
    policy: &DestinationPolicy,
    link_id: &Uuid,
    update: &UpdateLink<'_>,
) -> Result<Link> {
    let _ = fetch_live_link(storage, link_id).await?;

    if let Some(destination) = update.destination {
        policy.screen(storage, destination).await?;
    }

    storage
        .update_link(
            link_id,
            &UpdateLinkValues {
                title: update.title,
                destination: update.destination,
                expiration: &update.expiration,
            },
        )
        .await
        .map_err(CoreError::from)
}

/// Create an alias on a link, or recover a soft-deleted one
///
/// With an explicit alias: a soft-deleted alias on the same link is
/// restored with the new description, anything else goes through plain
/// insertion where the storage duplicate signal means the name is taken.
/// Without one, short codes are generated and inserted until one sticks.
pub async fn create_or_modify_alias<S: Storage>(
    storage: &S,
    link_id: &Uuid,
    alias: Option<&str>,
    description: &str,
) -> Result<Alias> {
    let link = fetch_live_link(storage, link_id).await?;

    if let Some(alias) = alias {
        let alias = aliases::validate(alias)?;

        if link
            .find_alias(&alias)
            .is_some_and(aliases::Alias::is_deleted)
        {
            return storage
                .restore_alias(link_id, &alias, description)
                .await
                .map_err(bad_alias_on_duplicate);
        }

        return storage
            .insert_alias(link_id, &alias, description)
            .await
            .map_err(bad_alias_on_duplicate);
    }

    for _ in 0..codes::MAX_GENERATE_ATTEMPTS {
        let code = codes::random_code();

        // generated codes go through the same reserved-word filter
        if aliases::is_reserved(&code) {
            continue;
        }

        match storage.insert_alias(link_id, &code, description).await {
            Ok(alias) => return Ok(alias),
            Err(storage::Error::DuplicateAlias) => {}
            Err(err) => return Err(err.into()),
        }
    }

    tracing::error!(
        "Could not find a free short code in {} attempts, code space misconfigured?",
        codes::MAX_GENERATE_ATTEMPTS
    );

    Err(CoreError::CodeSpaceExhausted(codes::MAX_GENERATE_ATTEMPTS))
}

/// Soft-delete a link
pub async fn delete_link<S: Storage>(
    storage: &S,
    link_id: &Uuid,
    deleted_by: &DeletedBy,
) -> Result<()> {
    let _ = fetch_live_link(storage, link_id).await?;

    storage.set_link_deleted(link_id, deleted_by).await?;

    Ok(())
}

/// Soft-delete a single alias on a link
pub async fn delete_alias<S: Storage>(storage: &S, link_id: &Uuid, alias: &str) -> Result<()> {
    let link = fetch_live_link(storage, link_id).await?;
    let alias = aliases::canonicalize(alias);

    match link.find_alias(&alias) {
        Some(entry) if !entry.is_deleted() => {
            storage.set_alias_deleted(link_id, &alias).await?;

            Ok(())
        }
        _ => Err(CoreError::NotFound),
    }
}

/// Purge the visit log of a link and zero its counters
///
/// Irreversible, unlike everything else in this module.
pub async fn clear_visits<S: Storage>(storage: &S, link_id: &Uuid) -> Result<u64> {
    let _ = fetch_live_link(storage, link_id).await?;

    let purged = storage.purge_visits(link_id).await?;
    storage.reset_visit_counters(link_id).await?;

    Ok(purged)
}

/// Soft-delete every live link a user owns
///
/// Used by the `blacklisted` role grant. Reversed by
/// [`unblacklist_user_links`].
pub async fn blacklist_user_links<S: Storage>(storage: &S, username: &str) -> Result<usize> {
    let owner = Owner::User(username.to_string());
    let links = storage.find_links_by_owner(&owner).await?;

    let mut deleted = 0;
    for link in &links {
        storage
            .set_link_deleted(&link.id, &DeletedBy::BlacklistCascade)
            .await?;
        deleted += 1;
    }

    Ok(deleted)
}

/// Restore links deleted by a blacklist cascade
///
/// Links the owner (or an admin) deleted independently stay deleted.
pub async fn unblacklist_user_links<S: Storage>(storage: &S, username: &str) -> Result<usize> {
    let owner = Owner::User(username.to_string());
    let links = storage.find_links_by_owner_any(&owner).await?;

    let mut restored = 0;
    for link in &links {
        if storage
            .restore_link(&link.id, &DeletedBy::BlacklistCascade)
            .await?
        {
            restored += 1;
        }
    }

    Ok(restored)
}

/// Soft-delete a batch of links whose destination domain was blocked
pub async fn block_urls<S: Storage>(storage: &S, link_ids: &[Uuid]) -> Result<usize> {
    let mut deleted = 0;
    for link_id in link_ids {
        let link = storage.find_link_by_id(link_id).await?;

        if link.is_some_and(|link| !link.is_deleted()) {
            storage
                .set_link_deleted(link_id, &DeletedBy::BlockCascade)
                .await?;
            deleted += 1;
        }
    }

    Ok(deleted)
}

/// Restore a batch of links deleted by a domain-block cascade
pub async fn unblock_urls<S: Storage>(storage: &S, link_ids: &[Uuid]) -> Result<usize> {
    let mut restored = 0;
    for link_id in link_ids {
        if storage
            .restore_link(link_id, &DeletedBy::BlockCascade)
            .await?
        {
            restored += 1;
        }
    }

    Ok(restored)
}

/// Fetch a link that exists and is not soft-deleted
async fn fetch_live_link<S: Storage>(storage: &S, link_id: &Uuid) -> Result<Link> {
    match storage.find_link_by_id(link_id).await? {
        Some(link) if !link.is_deleted() => Ok(link),
        _ => Err(CoreError::NotFound),
    }
}

/// Map the storage duplicate signal to the user-facing alias error
fn bad_alias_on_duplicate(err: storage::Error) -> CoreError {
    match err {
        storage::Error::DuplicateAlias => {
            CoreError::BadAlias("already taken by another link".to_string())
        }
        err => err.into(),
    }
}

/// Timestamp helper, everything in this crate records naive UTC
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
