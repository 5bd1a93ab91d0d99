//! Visit rollups
//!
//! All aggregation runs over the raw visit log; the only shortcut is the
//! whole-link overall query, which reads the denormalized counters
//! maintained by the visit recorder.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use chrono::Datelike;
use serde::Serialize;
use uuid::Uuid;

use crate::browsers;
use crate::errors::CoreError;
use crate::errors::Result;
use crate::storage::Storage;
use crate::visits::Visit;

/// Total and deduplicated visit counts
#[derive(Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallVisits {
    /// Every recorded visit
    pub total_visits: u64,

    /// Visits from distinct tracking ids
    pub unique_visits: u64,
}

/// One calendar day of visits
#[derive(Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyVisits {
    /// Calendar year
    pub year: i32,

    /// Calendar month, 1-based
    pub month: u32,

    /// Day of month, 1-based
    pub day: u32,

    /// Visits from tracking ids making their very first visit that day
    pub first_time_visits: u64,

    /// All visits that day
    pub all_visits: u64,
}

/// One calendar month of visits
#[derive(Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyVisits {
    /// Calendar year
    pub year: i32,

    /// Calendar month, 1-based
    pub month: u32,

    /// Visits from tracking ids making their very first visit that month
    pub first_time_visits: u64,

    /// All visits that month
    pub all_visits: u64,
}

/// Visit count for one region code
#[derive(Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCount {
    /// Country or subdivision code
    pub code: String,

    /// Visits from it
    pub count: u64,
}

/// The two geographic rollups
#[derive(Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoIpStats {
    /// United States visits by subdivision
    pub us: Vec<RegionCount>,

    /// Worldwide visits by country
    pub world: Vec<RegionCount>,
}

/// Visit count for one category (browser family, referring site)
#[derive(Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    /// The category
    pub category: String,

    /// Visits from it
    pub count: u64,
}

/// Overall visit counts for a link, optionally scoped to one alias
///
/// The whole-link query reads the denormalized counters; the alias scope
/// has no counters and is computed from the log by tracking id.
pub async fn overall_visits<S: Storage>(
    storage: &S,
    link_id: &Uuid,
    alias: Option<&str>,
) -> Result<OverallVisits> {
    let link = storage
        .find_link_by_id(link_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    let Some(alias) = alias else {
        return Ok(OverallVisits {
            total_visits: link.visits,
            unique_visits: link.unique_visits,
        });
    };

    let visits = storage.find_visits(Some(link_id), Some(alias)).await?;

    let tracking_ids: HashSet<Uuid> = visits.iter().map(|visit| visit.tracking_id).collect();

    Ok(OverallVisits {
        total_visits: visits.len() as u64,
        unique_visits: tracking_ids.len() as u64,
    })
}

/// Per-day rollup of first-time versus total visits
///
/// A visit is first-time when its tracking id had never visited this link
/// before, so for any period `sum(first_time_visits)` equals the number of
/// distinct tracking ids seen.
pub async fn daily_visits<S: Storage>(
    storage: &S,
    link_id: &Uuid,
    alias: Option<&str>,
) -> Result<Vec<DailyVisits>> {
    let visits = link_visits(storage, link_id, alias).await?;

    let mut buckets: BTreeMap<(i32, u32, u32), (u64, u64)> = BTreeMap::new();

    for (visit, first_time) in tag_first_visits(visits) {
        let date = visit.time.date();
        let bucket = buckets
            .entry((date.year(), date.month(), date.day()))
            .or_default();

        bucket.0 += u64::from(first_time);
        bucket.1 += 1;
    }

    // BTreeMap iteration is already chronological
    Ok(buckets
        .into_iter()
        .map(
            |((year, month, day), (first_time_visits, all_visits))| DailyVisits {
                year,
                month,
                day,
                first_time_visits,
                all_visits,
            },
        )
        .collect())
}

/// Per-month rollup of first-time versus total visits
pub async fn monthly_visits<S: Storage>(
    storage: &S,
    link_id: &Uuid,
    alias: Option<&str>,
) -> Result<Vec<MonthlyVisits>> {
    let visits = link_visits(storage, link_id, alias).await?;

    let mut buckets: BTreeMap<(i32, u32), (u64, u64)> = BTreeMap::new();

    for (visit, first_time) in tag_first_visits(visits) {
        let date = visit.time.date();
        let bucket = buckets.entry((date.year(), date.month())).or_default();

        bucket.0 += u64::from(first_time);
        bucket.1 += 1;
    }

    Ok(buckets
        .into_iter()
        .map(|((year, month), (first_time_visits, all_visits))| MonthlyVisits {
            year,
            month,
            first_time_visits,
            all_visits,
        })
        .collect())
}

/// Geographic rollups, optionally scoped to one link and/or alias
///
/// Visits without a resolved location are excluded from both breakdowns.
pub async fn geoip_stats<S: Storage>(
    storage: &S,
    link_id: Option<&Uuid>,
    alias: Option<&str>,
) -> Result<GeoIpStats> {
    let visits = storage.find_visits(link_id, alias).await?;

    let mut us: HashMap<String, u64> = HashMap::new();
    let mut world: HashMap<String, u64> = HashMap::new();

    for visit in &visits {
        let Some(country) = &visit.country_code else {
            continue;
        };

        *world.entry(country.clone()).or_default() += 1;

        if country == "US" {
            if let Some(subdivision) = &visit.subdivision_code {
                *us.entry(subdivision.clone()).or_default() += 1;
            }
        }
    }

    Ok(GeoIpStats {
        us: sorted_regions(us),
        world: sorted_regions(world),
    })
}

/// Visits per browser family
pub async fn browser_stats<S: Storage>(
    storage: &S,
    link_id: &Uuid,
    alias: Option<&str>,
) -> Result<Vec<CategoryCount>> {
    let visits = link_visits(storage, link_id, alias).await?;

    Ok(sorted_categories(count_by(&visits, |visit| {
        browsers::browser_category(visit.user_agent.as_deref())
    })))
}

/// Visits per referring site
pub async fn referer_stats<S: Storage>(
    storage: &S,
    link_id: &Uuid,
    alias: Option<&str>,
) -> Result<Vec<CategoryCount>> {
    let visits = link_visits(storage, link_id, alias).await?;

    Ok(sorted_categories(count_by(&visits, |visit| {
        browsers::referer_category(visit.referer.as_deref())
    })))
}

/// Read the visit log of a link that must exist
async fn link_visits<S: Storage>(
    storage: &S,
    link_id: &Uuid,
    alias: Option<&str>,
) -> Result<Vec<Visit>> {
    if storage.find_link_by_id(link_id).await?.is_none() {
        return Err(CoreError::NotFound);
    }

    storage
        .find_visits(Some(link_id), alias)
        .await
        .map_err(Into::into)
}

/// Tag the earliest visit of every tracking id
///
/// Groups by tracking id, then scans each group keeping a running
/// `(first, rest)` split: whenever an earlier visit turns up it becomes
/// the new first and the displaced one joins the rest. Output order is
/// arbitrary; the rollups bucket it afterwards.
fn tag_first_visits(visits: Vec<Visit>) -> Vec<(Visit, bool)> {
    let mut groups: HashMap<Uuid, Vec<Visit>> = HashMap::new();

    for visit in visits {
        groups.entry(visit.tracking_id).or_default().push(visit);
    }

    let mut tagged = Vec::new();

    for (_, group) in groups {
        let mut visits = group.into_iter();
        let mut first = visits.next().expect("groups are never empty");
        let mut rest = Vec::new();

        for candidate in visits {
            if candidate.time < first.time {
                rest.push(std::mem::replace(&mut first, candidate));
            } else {
                rest.push(candidate);
            }
        }

        tagged.push((first, true));
        tagged.extend(rest.into_iter().map(|visit| (visit, false)));
    }

    tagged
}

/// Count visits per derived category
fn count_by<F>(visits: &[Visit], category: F) -> HashMap<String, u64>
where
    F: Fn(&Visit) -> String,
{
    let mut counts: HashMap<String, u64> = HashMap::new();

    for visit in visits {
        *counts.entry(category(visit)).or_default() += 1;
    }

    counts
}

/// Busiest region first, code as tie breaker
fn sorted_regions(counts: HashMap<String, u64>) -> Vec<RegionCount> {
    let mut regions: Vec<RegionCount> = counts
        .into_iter()
        .map(|(code, count)| RegionCount { code, count })
        .collect();

    regions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));

    regions
}

/// Busiest category first, name as tie breaker
fn sorted_categories(counts: HashMap<String, u64>) -> Vec<CategoryCount> {
    let mut categories: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(category, count)| CategoryCount { category, count })
        .collect();

    categories.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.category.cmp(&b.category))
    });

    categories
}
