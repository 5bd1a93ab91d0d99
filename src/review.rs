//! Destination review workflow
//!
//! Links whose destination the reputation oracle flags are held here until
//! an administrator settles them. `Pending -> Approved` and
//! `Pending -> Denied` are the only forward transitions; `reconsider`
//! reopens a settled record for another look.

use core::fmt;

use chrono::naive::NaiveDateTime;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::errors::Result;
use crate::links;
use crate::links::CreatedLink;
use crate::links::Link;
use crate::links::NewLink;
use crate::links::Owner;
use crate::security::DestinationPolicy;
use crate::storage::Storage;
use crate::storage::StatusChangeValues;

/// Review disposition of a held link
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewStatus {
    /// Waiting for an administrator
    Pending,

    /// Cleared; a real link was materialized
    Approved,

    /// Refused; no link exists for this destination
    Denied,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReviewStatus::Pending => write!(f, "pending"),
            ReviewStatus::Approved => write!(f, "approved"),
            ReviewStatus::Denied => write!(f, "denied"),
        }
    }
}

/// One transition in a pending link's history
#[derive(Clone, Debug)]
pub struct StatusChange {
    /// Status before the transition, `None` for the initial hold
    pub from: Option<ReviewStatus>,

    /// Status after the transition
    pub to: ReviewStatus,

    /// Who made the change
    pub modified_by: String,

    /// When
    pub at: NaiveDateTime,
}

/// A link held for review
///
/// Shaped like a [`Link`](Link) plus the review state; converted into a
/// real link on approval, kept as a tombstone on denial.
#[derive(Clone, Debug)]
pub struct PendingLink {
    /// Pending record ID
    pub id: Uuid,

    /// Title the link was submitted with
    pub title: String,

    /// Destination under review, the dedup key
    pub destination: String,

    /// Who submitted it
    pub owner: Owner,

    /// Expiration time the link was submitted with
    pub expires_at: Option<NaiveDateTime>,

    /// Current disposition
    pub status: ReviewStatus,

    /// Every transition so far, oldest first
    pub status_history: Vec<StatusChange>,

    /// Creation date
    pub created_at: NaiveDateTime,
}

/// Approve a pending link and materialize it
///
/// Only legal from `Pending`. The blocked-domain rules are re-checked on
/// materialization; the reputation oracle is bypassed, that is the point
/// of the approval.
pub async fn promote<S: Storage>(
    storage: &S,
    policy: &DestinationPolicy,
    actor: &str,
    pending_id: &Uuid,
) -> Result<Link> {
    let pending = transition(storage, actor, pending_id, ReviewStatus::Approved).await?;

    let destination = url::Url::parse(&pending.destination)
        .map_err(|err| CoreError::BadDestination(err.to_string()))?;

    let created = links::create_link(
        storage,
        policy,
        &NewLink {
            title: &pending.title,
            destination: &destination,
            owner: &pending.owner,
            expires_at: pending.expires_at,
            bypass_review: true,
        },
    )
    .await?;

    match created {
        CreatedLink::Live(link) => Ok(link),
        // bypass_review means creation can not be intercepted again
        CreatedLink::HeldForReview(_) => Err(CoreError::PendingOrRejected),
    }
}

/// Deny a pending link
///
/// Only legal from `Pending`. The record stays around so the destination
/// keeps failing creation with `PendingOrRejected`.
pub async fn reject<S: Storage>(storage: &S, actor: &str, pending_id: &Uuid) -> Result<PendingLink> {
    transition(storage, actor, pending_id, ReviewStatus::Denied).await
}

/// Reopen a settled record
///
/// Administrative override: moves `Approved` or `Denied` back to
/// `Pending`. Already-pending records can not be reconsidered.
pub async fn reconsider<S: Storage>(
    storage: &S,
    actor: &str,
    pending_id: &Uuid,
) -> Result<PendingLink> {
    transition(storage, actor, pending_id, ReviewStatus::Pending).await
}

/// Apply a transition, enforcing the state machine
async fn transition<S: Storage>(
    storage: &S,
    actor: &str,
    pending_id: &Uuid,
    to: ReviewStatus,
) -> Result<PendingLink> {
    let pending = storage
        .find_pending_by_id(pending_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    let legal = match to {
        ReviewStatus::Approved | ReviewStatus::Denied => pending.status == ReviewStatus::Pending,
        ReviewStatus::Pending => pending.status != ReviewStatus::Pending,
    };

    if !legal {
        return Err(CoreError::InvalidStateChange {
            from: pending.status,
            to,
        });
    }

    storage
        .update_pending_status(
            pending_id,
            &StatusChangeValues {
                from: pending.status,
                to,
                modified_by: actor,
            },
        )
        .await
        .map_err(CoreError::from)
}
