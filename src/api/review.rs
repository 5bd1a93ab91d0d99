//! Review queue API endpoints
//!
//! Administrators settle held links here.

use axum::Extension;
use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::links::Owner;
use crate::review;
use crate::review::PendingLink;
use crate::review::ReviewStatus;
use crate::security::DestinationPolicy;
use crate::storage::AuditEntry;
use crate::storage::Storage;

use super::AuditTrail;
use super::CurrentPrincipal;
use super::Error;
use super::PathParameters;
use super::Success;
use super::links::LinkResponse;

/// One recorded transition going to the user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeResponse {
    /// Status before, absent for the initial hold
    pub from: Option<ReviewStatus>,

    /// Status after
    pub to: ReviewStatus,

    /// Who made the change
    pub modified_by: String,

    /// When
    pub at: NaiveDateTime,
}

/// Pending link response going to the user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingResponse {
    /// Pending record ID
    pub id: Uuid,

    /// Title the link was submitted with
    pub title: String,

    /// Destination under review
    pub destination: String,

    /// Who submitted it
    pub owner: Owner,

    /// Current disposition
    pub status: ReviewStatus,

    /// Every transition so far, oldest first
    pub status_history: Vec<StatusChangeResponse>,

    /// Creation date
    pub created_at: NaiveDateTime,
}

impl PendingResponse {
    /// Create a response from a [`PendingLink`](PendingLink)
    pub fn from_pending(pending: PendingLink) -> Self {
        Self {
            id: pending.id,
            title: pending.title,
            destination: pending.destination,
            owner: pending.owner,
            status: pending.status,
            status_history: pending
                .status_history
                .into_iter()
                .map(|change| StatusChangeResponse {
                    from: change.from,
                    to: change.to,
                    modified_by: change.modified_by,
                    at: change.at,
                })
                .collect(),
            created_at: pending.created_at,
        }
    }
}

/// List the whole review queue, pending records first come first
pub async fn list<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
) -> Result<Success<Vec<PendingResponse>>, Error> {
    principal.require_admin(&storage).await?;

    let pending = storage
        .find_all_pending(None)
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::ok(
        pending.into_iter().map(PendingResponse::from_pending).collect(),
    ))
}

/// Approve a pending link and materialize it
pub async fn promote<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    Extension(policy): Extension<DestinationPolicy>,
    principal: CurrentPrincipal,
    PathParameters(pending_id): PathParameters<Uuid>,
) -> Result<Success<LinkResponse>, Error> {
    principal.require_admin(&storage).await?;

    let link = review::promote(&storage, &policy, &principal.username, &pending_id)
        .await
        .map_err(Error::from_core)?;

    if let Some(pending) = storage
        .find_pending_by_id(&pending_id)
        .await
        .map_err(Error::internal_server_error)?
    {
        audit_trail.register(AuditEntry::PromoteReview(&pending)).await;
    }

    Ok(Success::created(LinkResponse::from_link(link)))
}

/// Deny a pending link
pub async fn reject<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(pending_id): PathParameters<Uuid>,
) -> Result<Success<PendingResponse>, Error> {
    principal.require_admin(&storage).await?;

    let pending = review::reject(&storage, &principal.username, &pending_id)
        .await
        .map_err(Error::from_core)?;

    audit_trail.register(AuditEntry::RejectReview(&pending)).await;

    Ok(Success::ok(PendingResponse::from_pending(pending)))
}

/// Reopen a settled record
pub async fn reconsider<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(pending_id): PathParameters<Uuid>,
) -> Result<Success<PendingResponse>, Error> {
    principal.require_admin(&storage).await?;

    let pending = review::reconsider(&storage, &principal.username, &pending_id)
        .await
        .map_err(Error::from_core)?;

    audit_trail
        .register(AuditEntry::ReconsiderReview(&pending))
        .await;

    Ok(Success::ok(PendingResponse::from_pending(pending)))
}
