//! Organizations API endpoints

use axum::Extension;
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde::Serialize;

use crate::organizations::Organization;
use crate::storage::NewMemberValues;
use crate::storage::Storage;

use super::CurrentPrincipal;
use super::Error;
use super::Form;
use super::PathParameters;
use super::Success;

/// Organization member going to the user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    /// Member username
    pub username: String,

    /// May manage the organization
    pub is_admin: bool,

    /// When the membership started
    pub joined_at: NaiveDateTime,
}

/// Organization response going to the user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationResponse {
    /// Unique name
    pub name: String,

    /// All members
    pub members: Vec<MemberResponse>,

    /// Creation date
    pub created_at: NaiveDateTime,
}

impl OrganizationResponse {
    /// Create a response from an [`Organization`](Organization)
    fn from_organization(organization: Organization) -> Self {
        Self {
            name: organization.name,
            members: organization
                .members
                .into_iter()
                .map(|member| MemberResponse {
                    username: member.username,
                    is_admin: member.is_admin,
                    joined_at: member.joined_at,
                })
                .collect(),
            created_at: organization.created_at,
        }
    }
}

/// Create organization form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationForm {
    /// Unique name
    name: String,
}

/// Create an organization
///
/// The creator becomes its first administrator member.
pub async fn create<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    Form(form): Form<CreateOrganizationForm>,
) -> Result<Success<OrganizationResponse>, Error> {
    if form.name.trim().is_empty() {
        return Err(Error::bad_request("Organization name can not be empty"));
    }

    storage
        .create_organization(&form.name)
        .await
        .map_err(Error::internal_server_error)?;

    storage
        .add_organization_member(
            &form.name,
            &NewMemberValues {
                username: &principal.username,
                is_admin: true,
            },
        )
        .await
        .map_err(Error::internal_server_error)?;

    let organization = fetch_organization(&storage, &form.name).await?;

    Ok(Success::created(OrganizationResponse::from_organization(
        organization,
    )))
}

/// Get a single organization
pub async fn single<S: Storage>(
    Extension(storage): Extension<S>,
    _principal: CurrentPrincipal,
    PathParameters(name): PathParameters<String>,
) -> Result<Success<OrganizationResponse>, Error> {
    let organization = fetch_organization(&storage, &name).await?;

    Ok(Success::ok(OrganizationResponse::from_organization(
        organization,
    )))
}

/// Add member form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberForm {
    /// Member username
    username: String,

    /// May manage the organization
    is_admin: Option<bool>,
}

/// Add a member to an organization
///
/// Organization administrators (and site administrators) only.
pub async fn add_member<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(name): PathParameters<String>,
    Form(form): Form<AddMemberForm>,
) -> Result<Success<OrganizationResponse>, Error> {
    let organization = fetch_organization(&storage, &name).await?;

    if !organization.has_admin(&principal.username) {
        principal.require_admin(&storage).await?;
    }

    storage
        .add_organization_member(
            &name,
            &NewMemberValues {
                username: &form.username,
                is_admin: form.is_admin.unwrap_or(false),
            },
        )
        .await
        .map_err(Error::internal_server_error)?;

    let organization = fetch_organization(&storage, &name).await?;

    Ok(Success::ok(OrganizationResponse::from_organization(
        organization,
    )))
}

/// Fetch an organization from storage
async fn fetch_organization<S: Storage>(
    storage: &S,
    name: &str,
) -> Result<Organization, Error> {
    storage
        .find_organization(name)
        .await
        .map_err(Error::internal_server_error)?
        .map_or_else(|| Err(Error::not_found("Organization not found")), Ok)
}
