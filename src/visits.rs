//! Visit recording
//!
//! The redirect-time hot path: resolve an alias, append to the visit log,
//! bump the denormalized counters and hand the caller a destination plus a
//! tracking id to set as a cookie.

use std::net::IpAddr;
use std::net::Ipv4Addr;

use chrono::naive::NaiveDateTime;
use uuid::Uuid;

use crate::aliases;
use crate::errors::Result;
use crate::geo;
use crate::geo::GeoLocator;
use crate::links;
use crate::storage::CreateVisitValues;
use crate::storage::Storage;

/// One recorded visit, append-only
#[derive(Clone, Debug)]
pub struct Visit {
    /// Visit ID
    pub id: Uuid,

    /// The link that was visited
    pub link_id: Uuid,

    /// The alias it came in through
    pub alias: String,

    /// Opaque per-visitor token
    pub tracking_id: Uuid,

    /// Source address, when the transport knew one
    pub source_ip: Option<IpAddr>,

    /// When
    pub time: NaiveDateTime,

    /// Raw user agent header
    pub user_agent: Option<String>,

    /// Raw referer header
    pub referer: Option<String>,

    /// ISO country code derived from the source address
    pub country_code: Option<String>,

    /// Subdivision code derived from the source address
    pub subdivision_code: Option<String>,
}

/// Tracking identity, one per distinct source address
#[derive(Clone, Debug)]
pub struct Visitor {
    /// The opaque id handed out as tracking token
    pub id: Uuid,

    /// Source address the id was minted for
    pub ip: IpAddr,

    /// When the address was first seen
    pub created_at: NaiveDateTime,
}

/// An incoming redirect request
pub struct VisitRequest<'a> {
    /// Alias as received, canonicalized here
    pub alias: &'a str,

    /// Tracking token from the visitor's cookie, if any
    pub tracking_id: Option<Uuid>,

    /// Client address
    pub source_ip: Option<IpAddr>,

    /// Raw user agent header
    pub user_agent: Option<&'a str>,

    /// Raw referer header
    pub referer: Option<&'a str>,
}

/// What the redirect handler needs back
pub struct VisitOutcome {
    /// Where to send the visitor
    pub destination: String,

    /// Token for the tracking cookie
    pub tracking_id: Uuid,
}

/// Resolve an alias and record the visit
///
/// Returns `None` (and records nothing) when the alias is unknown, the
/// link or alias is soft-deleted, or the link has expired.
///
/// The unique-visit check is read-then-write on purpose: two simultaneous
/// first visits from one tracking id may both count as unique. Accepted
/// approximation, do not "fix" it with a transaction.
pub async fn record_visit<S: Storage>(
    storage: &S,
    locator: &dyn GeoLocator,
    request: &VisitRequest<'_>,
) -> Result<Option<VisitOutcome>> {
    let alias = aliases::canonicalize(request.alias);

    let Some((link, alias_entry)) = storage.find_link_by_alias(&alias).await? else {
        return Ok(None);
    };

    if link.is_deleted() || alias_entry.is_deleted() || link.is_expired(links::now()) {
        return Ok(None);
    }

    let tracking_id = match request.tracking_id {
        Some(tracking_id) => tracking_id,
        None => mint_tracking_id(storage, request.source_ip).await?,
    };

    let first_time = !storage.visit_exists(&link.id, &tracking_id).await?;

    storage.increment_visit_counters(&link.id, first_time).await?;

    let location = match request.source_ip {
        Some(ip) => geo::resolve(locator, ip).await,
        None => geo::Location::default(),
    };

    storage
        .insert_visit(&CreateVisitValues {
            link_id: &link.id,
            alias: &alias,
            tracking_id: &tracking_id,
            source_ip: request.source_ip.as_ref(),
            user_agent: request.user_agent,
            referer: request.referer,
            country_code: location.country_code.as_deref(),
            subdivision_code: location.subdivision_code.as_deref(),
        })
        .await?;

    Ok(Some(VisitOutcome {
        destination: link.destination,
        tracking_id,
    }))
}

/// Mint (or re-use) a tracking id for a source address
///
/// The visitor registry is insert-if-absent keyed by address; concurrent
/// mints for the same address settle on whichever insert landed first.
async fn mint_tracking_id<S: Storage>(storage: &S, source_ip: Option<IpAddr>) -> Result<Uuid> {
    let ip = source_ip.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let visitor = storage.find_or_create_visitor(&ip).await?;

    Ok(visitor.id)
}
