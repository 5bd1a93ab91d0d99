//! Links API endpoints
//!
//! Everything related to link and alias management

use axum::Extension;
use axum::response::IntoResponse;
use axum::response::Response;
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::access;
use crate::links;
use crate::links::CreatedLink;
use crate::links::DeletedBy;
use crate::links::ExpirationChange;
use crate::links::Link;
use crate::links::NewLink;
use crate::links::Owner;
use crate::links::UpdateLink;
use crate::security::DestinationPolicy;
use crate::storage::AuditEntry;
use crate::storage::Storage;

use super::AuditTrail;
use super::CurrentPrincipal;
use super::Error;
use super::Form;
use super::PathParameters;
use super::Success;
use super::parse_url;
use super::review::PendingResponse;
use super::utils::fetch_link;

/// Alias response going to the user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasResponse {
    /// The short name
    pub alias: String,

    /// Free-form description
    pub description: String,
}

/// Link response going to the user
///
/// Basically filtering which fields are shown to the user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    /// Link ID
    pub id: Uuid,

    /// Human-readable title
    pub title: String,

    /// Where the aliases redirect to
    pub destination: String,

    /// Who owns the link
    pub owner: Owner,

    /// Total recorded visits
    pub visits: u64,

    /// Visits from first-time tracking ids
    pub unique_visits: u64,

    /// Live aliases only
    pub aliases: Vec<AliasResponse>,

    /// Creation date
    pub created_at: NaiveDateTime,

    /// When the link stops resolving, if ever
    pub expires_at: Option<NaiveDateTime>,
}

impl LinkResponse {
    /// Create a response from a [`Link`](Link)
    pub(crate) fn from_link(link: Link) -> Self {
        Self {
            id: link.id,
            title: link.title,
            destination: link.destination,
            owner: link.owner,
            visits: link.visits,
            unique_visits: link.unique_visits,
            aliases: link
                .aliases
                .into_iter()
                .filter(|alias| !alias.is_deleted())
                .map(|alias| AliasResponse {
                    alias: alias.alias,
                    description: alias.description,
                })
                .collect(),
            created_at: link.created_at,
            expires_at: link.expires_at,
        }
    }
}

/// List all links the principal may see
pub async fn list<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
) -> Result<Success<Vec<LinkResponse>>, Error> {
    let links = storage
        .find_all_links()
        .await
        .map_err(Error::internal_server_error)?;

    let mut visible = Vec::new();
    for link in links {
        if access::may_view(&storage, &link, &principal.username)
            .await
            .map_err(Error::internal_server_error)?
        {
            visible.push(LinkResponse::from_link(link));
        }
    }

    Ok(Success::ok(visible))
}

/// Get a single link
pub async fn single<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
) -> Result<Success<LinkResponse>, Error> {
    let link = fetch_link(&storage, &link_id).await?;

    require_view(&storage, &link, &principal).await?;

    Ok(Success::ok(LinkResponse::from_link(link)))
}

/// Create link form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkForm {
    /// Human-readable title
    title: String,

    /// Destination URL
    destination: String,

    /// Optional expiration time
    expires_at: Option<NaiveDateTime>,

    /// Create on behalf of an organization instead of the principal
    organization: Option<String>,

    /// Skip the reputation oracle; administrators only
    bypass_review: Option<bool>,
}

/// Create a link based on the [`CreateLinkForm`](CreateLinkForm) form
///
/// A destination the reputation oracle flags is parked in the review
/// queue and answered with `202 Accepted` instead of `201 Created`.
pub async fn create<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    Extension(policy): Extension<DestinationPolicy>,
    principal: CurrentPrincipal,
    Form(form): Form<CreateLinkForm>,
) -> Result<Response, Error> {
    let destination = parse_url(&form.destination)?;

    let owner = match &form.organization {
        Some(name) => {
            let memberships = storage
                .organizations_of(&principal.username)
                .await
                .map_err(Error::internal_server_error)?;

            if !memberships.iter().any(|membership| membership == name) {
                return Err(Error::forbidden("Not allowed"));
            }

            Owner::Organization(name.clone())
        }
        None => Owner::User(principal.username.clone()),
    };

    let bypass_review = form.bypass_review.unwrap_or(false);
    if bypass_review {
        principal.require_admin(&storage).await?;
    }

    let created = links::create_link(
        &storage,
        &policy,
        &NewLink {
            title: &form.title,
            destination: &destination,
            owner: &owner,
            expires_at: form.expires_at,
            bypass_review,
        },
    )
    .await
    .map_err(Error::from_core)?;

    match created {
        CreatedLink::Live(link) => {
            audit_trail.register(AuditEntry::CreateLink(&link)).await;

            Ok(Success::created(LinkResponse::from_link(link)).into_response())
        }
        CreatedLink::HeldForReview(pending) => {
            audit_trail
                .register(AuditEntry::HoldForReview(&pending))
                .await;

            Ok(Success::accepted(PendingResponse::from_pending(pending)).into_response())
        }
    }
}

/// Update link form
///
/// Fields to update a link with, all fields are optional and are not
/// touched when not provided
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLinkForm {
    /// New title
    title: Option<String>,

    /// New destination, re-screened against the blocked rules
    destination: Option<String>,

    /// New expiration time
    expires_at: Option<NaiveDateTime>,

    /// Drop the expiration time entirely
    clear_expiration: Option<bool>,
}

/// Update a link based on the [`UpdateLinkForm`](UpdateLinkForm) form
pub async fn update<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    Extension(policy): Extension<DestinationPolicy>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
    Form(form): Form<UpdateLinkForm>,
) -> Result<Success<LinkResponse>, Error> {
    let link = fetch_link(&storage, &link_id).await?;

    require_edit(&storage, &link, &principal).await?;

    let destination = match &form.destination {
        Some(destination) => Some(parse_url(destination)?),
        None => None,
    };

    let expiration = if form.clear_expiration.unwrap_or(false) {
        ExpirationChange::Clear
    } else {
        form.expires_at.map_or(ExpirationChange::Keep, ExpirationChange::Set)
    };

    let updated = links::modify_link(
        &storage,
        &policy,
        &link_id,
        &UpdateLink {
            title: form.title.as_deref(),
            destination: destination.as_ref(),
            expiration,
        },
    )
    .await
    .map_err(Error::from_core)?;

    audit_trail.register(AuditEntry::UpdateLink(&updated)).await;

    Ok(Success::ok(LinkResponse::from_link(updated)))
}

/// Soft-delete a link
pub async fn delete<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
) -> Result<Success<&'static str>, Error> {
    let link = fetch_link(&storage, &link_id).await?;

    require_edit(&storage, &link, &principal).await?;

    links::delete_link(
        &storage,
        &link_id,
        &DeletedBy::Person(principal.username.clone()),
    )
    .await
    .map_err(Error::from_core)?;

    audit_trail.register(AuditEntry::DeleteLink(&link)).await;

    Ok(Success::<&'static str>::no_content())
}

/// Create alias form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAliasForm {
    /// The short name; omit to get a generated code
    alias: Option<String>,

    /// Free-form description
    description: Option<String>,
}

/// Attach an alias to a link, or restore a soft-deleted one
pub async fn create_alias<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
    Form(form): Form<CreateAliasForm>,
) -> Result<Success<AliasResponse>, Error> {
    let link = fetch_link(&storage, &link_id).await?;

    require_edit(&storage, &link, &principal).await?;

    let alias = links::create_or_modify_alias(
        &storage,
        &link_id,
        form.alias.as_deref(),
        form.description.as_deref().unwrap_or_default(),
    )
    .await
    .map_err(Error::from_core)?;

    audit_trail
        .register(AuditEntry::CreateAlias(&link, &alias.alias))
        .await;

    Ok(Success::created(AliasResponse {
        alias: alias.alias,
        description: alias.description,
    }))
}

/// Soft-delete an alias
pub async fn delete_alias<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters((link_id, alias)): PathParameters<(Uuid, String)>,
) -> Result<Success<&'static str>, Error> {
    let link = fetch_link(&storage, &link_id).await?;

    require_edit(&storage, &link, &principal).await?;

    links::delete_alias(&storage, &link_id, &alias)
        .await
        .map_err(Error::from_core)?;

    audit_trail
        .register(AuditEntry::DeleteAlias(&link, &alias))
        .await;

    Ok(Success::<&'static str>::no_content())
}

/// Purge the visit log of a link
///
/// The one irreversible operation on this surface.
pub async fn clear_visits<S: Storage>(
    audit_trail: AuditTrail<S>,
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
) -> Result<Success<&'static str>, Error> {
    let link = fetch_link(&storage, &link_id).await?;

    require_edit(&storage, &link, &principal).await?;

    links::clear_visits(&storage, &link_id)
        .await
        .map_err(Error::from_core)?;

    audit_trail.register(AuditEntry::ClearVisits(&link)).await;

    Ok(Success::<&'static str>::no_content())
}

/// Viewing rights, or a generic permission error
pub async fn require_view<S: Storage>(
    storage: &S,
    link: &Link,
    principal: &CurrentPrincipal,
) -> Result<(), Error> {
    let allowed = access::may_view(storage, link, &principal.username)
        .await
        .map_err(Error::internal_server_error)?;

    if allowed {
        Ok(())
    } else {
        Err(Error::forbidden("Not allowed"))
    }
}

/// Editing rights, or a generic permission error
async fn require_edit<S: Storage>(
    storage: &S,
    link: &Link,
    principal: &CurrentPrincipal,
) -> Result<(), Error> {
    let allowed = access::may_edit(storage, link, &principal.username)
        .await
        .map_err(Error::internal_server_error)?;

    if allowed {
        Ok(())
    } else {
        Err(Error::forbidden("Not allowed"))
    }
}
