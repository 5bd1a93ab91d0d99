//! Analytics API endpoints
//!
//! Read-only rollups over the visit log; viewing rights on the link are
//! enough for all of them.

use axum::Extension;
use axum::extract::Query;
use serde::Deserialize;
use uuid::Uuid;

use crate::analytics;
use crate::analytics::CategoryCount;
use crate::analytics::DailyVisits;
use crate::analytics::GeoIpStats;
use crate::analytics::MonthlyVisits;
use crate::analytics::OverallVisits;
use crate::storage::Storage;

use super::CurrentPrincipal;
use super::Error;
use super::PathParameters;
use super::Success;
use super::links::require_view;
use super::utils::fetch_link;

/// Optional alias scope for every stats endpoint
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Limit the rollup to visits through one alias
    alias: Option<String>,
}

/// Overall visit counts
pub async fn overall<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Success<OverallVisits>, Error> {
    let link = fetch_link(&storage, &link_id).await?;
    require_view(&storage, &link, &principal).await?;

    analytics::overall_visits(&storage, &link_id, query.alias.as_deref())
        .await
        .map(Success::ok)
        .map_err(Error::from_core)
}

/// First-time versus total visits, per calendar day
pub async fn daily<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Success<Vec<DailyVisits>>, Error> {
    let link = fetch_link(&storage, &link_id).await?;
    require_view(&storage, &link, &principal).await?;

    analytics::daily_visits(&storage, &link_id, query.alias.as_deref())
        .await
        .map(Success::ok)
        .map_err(Error::from_core)
}

/// First-time versus total visits, per calendar month
pub async fn monthly<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Success<Vec<MonthlyVisits>>, Error> {
    let link = fetch_link(&storage, &link_id).await?;
    require_view(&storage, &link, &principal).await?;

    analytics::monthly_visits(&storage, &link_id, query.alias.as_deref())
        .await
        .map(Success::ok)
        .map_err(Error::from_core)
}

/// Geographic rollups for one link
pub async fn geoip<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Success<GeoIpStats>, Error> {
    let link = fetch_link(&storage, &link_id).await?;
    require_view(&storage, &link, &principal).await?;

    analytics::geoip_stats(&storage, Some(&link_id), query.alias.as_deref())
        .await
        .map(Success::ok)
        .map_err(Error::from_core)
}

/// Site-wide geographic rollups, administrators only
pub async fn geoip_site_wide<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
) -> Result<Success<GeoIpStats>, Error> {
    principal.require_admin(&storage).await?;

    analytics::geoip_stats(&storage, None, None)
        .await
        .map(Success::ok)
        .map_err(Error::from_core)
}

/// Visits per browser family
pub async fn browsers<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Success<Vec<CategoryCount>>, Error> {
    let link = fetch_link(&storage, &link_id).await?;
    require_view(&storage, &link, &principal).await?;

    analytics::browser_stats(&storage, &link_id, query.alias.as_deref())
        .await
        .map(Success::ok)
        .map_err(Error::from_core)
}

/// Visits per referring site
pub async fn referers<S: Storage>(
    Extension(storage): Extension<S>,
    principal: CurrentPrincipal,
    PathParameters(link_id): PathParameters<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Success<Vec<CategoryCount>>, Error> {
    let link = fetch_link(&storage, &link_id).await?;
    require_view(&storage, &link, &principal).await?;

    analytics::referer_stats(&storage, &link_id, query.alias.as_deref())
        .await
        .map(Success::ok)
        .map_err(Error::from_core)
}
