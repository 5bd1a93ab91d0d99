//! All things related to the storage of links, visits and review records

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::naive::NaiveDateTime;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::aliases::Alias;
use crate::links::DeletedBy;
use crate::links::ExpirationChange;
use crate::links::Link;
use crate::links::Owner;
use crate::organizations::Organization;
use crate::review::PendingLink;
use crate::review::ReviewStatus;
use crate::visits::Visit;
use crate::visits::Visitor;

#[cfg(not(feature = "postgres"))]
pub use memory::Memory;
#[cfg(feature = "postgres")]
pub use postgres::Postgres;

#[cfg(not(feature = "postgres"))]
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

/// Setup the storage
#[cfg(not(feature = "postgres"))]
#[allow(clippy::unused_async)]
pub async fn setup() -> Memory {
    Memory::new()
}

/// Setup the storage
#[cfg(feature = "postgres")]
pub async fn setup() -> Postgres {
    Postgres::new().await
}

/// Storage errors
#[derive(Debug, Error)]
pub enum Error {
    /// A connection error with the storage
    #[error("Connection error: {0}")]
    Connection(String),

    /// The unique-constraint signal for alias insertion
    ///
    /// The canonical way to learn a name is taken; callers never pre-check
    /// existence for correctness, only for friendlier validation messages.
    #[error("Alias already exists")]
    DuplicateAlias,
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Values to create a Link
pub struct CreateLinkValues<'a> {
    /// Human-readable title
    pub title: &'a str,

    /// Destination URL
    pub destination: &'a Url,

    /// Owner of the link
    pub owner: &'a Owner,

    /// Optional expiration time
    pub expires_at: Option<NaiveDateTime>,
}

/// Values to update a Link
pub struct UpdateLinkValues<'a> {
    /// New title, untouched when absent
    pub title: Option<&'a str>,

    /// New destination, untouched when absent
    pub destination: Option<&'a Url>,

    /// What to do with the expiration time
    pub expiration: &'a ExpirationChange,
}

/// Values to insert a Visit
pub struct CreateVisitValues<'a> {
    /// The visited link
    pub link_id: &'a Uuid,

    /// Canonical alias the visit came in through
    pub alias: &'a str,

    /// Visitor tracking token
    pub tracking_id: &'a Uuid,

    /// Source address
    pub source_ip: Option<&'a IpAddr>,

    /// Raw user agent header
    pub user_agent: Option<&'a str>,

    /// Raw referer header
    pub referer: Option<&'a str>,

    /// Derived country code
    pub country_code: Option<&'a str>,

    /// Derived subdivision code
    pub subdivision_code: Option<&'a str>,
}

/// Values to create a PendingLink
pub struct CreatePendingValues<'a> {
    /// Title the link was submitted with
    pub title: &'a str,

    /// Destination under review
    pub destination: &'a Url,

    /// Who submitted it
    pub owner: &'a Owner,

    /// Expiration time the link was submitted with
    pub expires_at: Option<NaiveDateTime>,
}

/// Values to record a review transition
pub struct StatusChangeValues<'a> {
    /// Status before
    pub from: ReviewStatus,

    /// Status after
    pub to: ReviewStatus,

    /// Who made the change
    pub modified_by: &'a str,
}

/// Values to add an organization member
pub struct NewMemberValues<'a> {
    /// Member username
    pub username: &'a str,

    /// May manage the organization
    pub is_admin: bool,
}

/// Possible audit trail entry types
pub enum AuditEntry<'a> {
    /// Link is created
    CreateLink(&'a Link),

    /// Link is updated
    UpdateLink(&'a Link),

    /// Link is deleted
    DeleteLink(&'a Link),

    /// Visit log of a link is purged
    ClearVisits(&'a Link),

    /// Alias is created on a link
    CreateAlias(&'a Link, &'a str),

    /// Alias is deleted from a link
    DeleteAlias(&'a Link, &'a str),

    /// Link is held for review
    HoldForReview(&'a PendingLink),

    /// Pending link is approved
    PromoteReview(&'a PendingLink),

    /// Pending link is denied
    RejectReview(&'a PendingLink),

    /// Settled review record is reopened
    ReconsiderReview(&'a PendingLink),

    /// Role is granted to an entity
    GrantRole(&'a str, &'a str),

    /// Role is revoked from an entity
    RevokeRole(&'a str, &'a str),
}

/// Storage with all supported operations
#[async_trait]
pub trait Storage: Clone + Send + Sync + 'static {
    /// Find all links
    ///
    /// Respects the soft-delete
    async fn find_all_links(&self) -> Result<Vec<Link>>;

    /// Find all live links of an owner
    ///
    /// Respects the soft-delete
    async fn find_links_by_owner(&self, owner: &Owner) -> Result<Vec<Link>>;

    /// Find all links of an owner, deleted ones included
    async fn find_links_by_owner_any(&self, owner: &Owner) -> Result<Vec<Link>>;

    /// Find a single link by ID
    ///
    /// DOES NOT respect the soft-delete, handle with care
    async fn find_link_by_id(&self, id: &Uuid) -> Result<Option<Link>>;

    /// Find a link carrying an alias, and the alias entry itself
    ///
    /// Matching is against the canonical alias form. A live alias wins
    /// over a soft-deleted one with the same name on another link.
    ///
    /// DOES NOT respect the soft-delete, handle with care
    async fn find_link_by_alias(&self, alias: &str) -> Result<Option<(Link, Alias)>>;

    /// IDs of links whose destination contains a domain fragment
    ///
    /// DOES NOT respect the soft-delete; block cascades scan forward and
    /// backward over the same set.
    async fn find_link_ids_by_destination_fragment(&self, fragment: &str) -> Result<Vec<Uuid>>;

    /// Create a link with zero aliases
    async fn create_link(&self, values: &CreateLinkValues<'_>) -> Result<Link>;

    /// Update a single link
    async fn update_link(&self, id: &Uuid, values: &UpdateLinkValues<'_>) -> Result<Link>;

    /// Soft-delete a link
    async fn set_link_deleted(&self, id: &Uuid, deleted_by: &DeletedBy) -> Result<()>;

    /// Clear the soft-delete of a link, only when `deleted_by` matches
    ///
    /// Returns whether anything was restored; used to reverse cascades
    /// without touching independently-deleted links.
    async fn restore_link(&self, id: &Uuid, deleted_by: &DeletedBy) -> Result<bool>;

    /// Insert an alias on a link
    ///
    /// Fails with [`Error::DuplicateAlias`](Error::DuplicateAlias) when the
    /// name is already live anywhere in the system.
    async fn insert_alias(&self, link_id: &Uuid, alias: &str, description: &str) -> Result<Alias>;

    /// Un-delete a soft-deleted alias on a link, updating its description
    ///
    /// Subject to the same uniqueness rule as insertion.
    async fn restore_alias(&self, link_id: &Uuid, alias: &str, description: &str) -> Result<Alias>;

    /// Soft-delete an alias on a link
    async fn set_alias_deleted(&self, link_id: &Uuid, alias: &str) -> Result<()>;

    /// Bump the denormalized visit counters of a link
    ///
    /// `visits` always goes up by one; `unique_visits` only for a first
    /// visit.
    async fn increment_visit_counters(&self, link_id: &Uuid, first_time: bool) -> Result<()>;

    /// Zero the denormalized visit counters of a link
    async fn reset_visit_counters(&self, link_id: &Uuid) -> Result<()>;

    /// Append a visit to the log
    async fn insert_visit(&self, values: &CreateVisitValues<'_>) -> Result<Visit>;

    /// Read the visit log, optionally scoped to one link and/or one alias
    async fn find_visits(&self, link_id: Option<&Uuid>, alias: Option<&str>) -> Result<Vec<Visit>>;

    /// Does the link already have a visit from this tracking id?
    async fn visit_exists(&self, link_id: &Uuid, tracking_id: &Uuid) -> Result<bool>;

    /// Drop all visits of a link, returning how many went away
    async fn purge_visits(&self, link_id: &Uuid) -> Result<u64>;

    /// Find the visitor of a source address, minting one if needed
    ///
    /// Idempotent; first-writer-wins on simultaneous inserts.
    async fn find_or_create_visitor(&self, ip: &IpAddr) -> Result<Visitor>;

    /// Find all pending links, optionally filtered by status
    async fn find_all_pending(&self, status: Option<ReviewStatus>) -> Result<Vec<PendingLink>>;

    /// Find a single pending link by ID
    async fn find_pending_by_id(&self, id: &Uuid) -> Result<Option<PendingLink>>;

    /// Find the review record of a destination, whatever its status
    async fn find_pending_by_destination(&self, destination: &str)
    -> Result<Option<PendingLink>>;

    /// Hold a link for review
    async fn create_pending(&self, values: &CreatePendingValues<'_>) -> Result<PendingLink>;

    /// Apply a review transition, appending it to the status history
    ///
    /// Legality of the transition is the caller's business.
    async fn update_pending_status(
        &self,
        id: &Uuid,
        values: &StatusChangeValues<'_>,
    ) -> Result<PendingLink>;

    /// Create an organization
    async fn create_organization(&self, name: &str) -> Result<Organization>;

    /// Find an organization by name
    async fn find_organization(&self, name: &str) -> Result<Option<Organization>>;

    /// Add a member to an organization
    async fn add_organization_member(
        &self,
        name: &str,
        values: &NewMemberValues<'_>,
    ) -> Result<()>;

    /// Names of all organizations a person belongs to
    async fn organizations_of(&self, username: &str) -> Result<Vec<String>>;

    /// Record a role grant
    async fn grant_role(&self, role: &str, entity: &str, granted_by: &str) -> Result<()>;

    /// Remove a role grant
    async fn revoke_role(&self, role: &str, entity: &str) -> Result<()>;

    /// Does the entity hold the role?
    async fn has_role(&self, role: &str, entity: &str) -> Result<bool>;

    /// All entities holding a role
    async fn role_entities(&self, role: &str) -> Result<Vec<String>>;

    /// Add a domain to the known-phishing table
    async fn add_banned_domain(&self, domain: &str) -> Result<()>;

    /// Is this host (or a parent domain of it) in the phishing table?
    async fn is_banned_domain(&self, host: &str) -> Result<bool>;

    /// Register a creative/destructive action on the audit trail
    async fn register_audit_trail(
        &self,
        actor: &str,
        entry: &AuditEntry<'_>,
        ip_address: Option<&IpAddr>,
    ) -> Result<()>;
}
