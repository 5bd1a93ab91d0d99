//! Rollup tests, driven at the service level for precise control over
//! tracking ids and source addresses

use std::collections::HashMap;
use std::net::IpAddr;
use std::net::Ipv4Addr;

use uuid::Uuid;

use crate::analytics;
use crate::geo::Location;
use crate::geo::UnknownLocator;
use crate::links;
use crate::links::CreatedLink;
use crate::links::NewLink;
use crate::links::Owner;
use crate::storage::Memory;
use crate::tests::helper;
use crate::tests::helper::MapLocator;
use crate::visits;
use crate::visits::VisitRequest;

/// Create a live link with one alias, through the lifecycle layer
async fn live_link(storage: &Memory, destination: &str, alias: &str) -> Uuid {
    let owner = Owner::User(helper::OWNER.to_string());

    let created = links::create_link(
        storage,
        &helper::test_policy(),
        &NewLink {
            title: "Test",
            destination: &url::Url::parse(destination).unwrap(),
            owner: &owner,
            expires_at: None,
            bypass_review: false,
        },
    )
    .await
    .unwrap();

    let CreatedLink::Live(link) = created else {
        panic!("clean destinations go live");
    };

    links::create_or_modify_alias(storage, &link.id, Some(alias), "")
        .await
        .unwrap();

    link.id
}

/// Record one visit through an alias
async fn one_visit(storage: &Memory, alias: &str, tracking_id: Uuid) {
    one_visit_full(storage, alias, tracking_id, None, None, None).await;
}

/// Record one visit with all the trimmings
async fn one_visit_full(
    storage: &Memory,
    alias: &str,
    tracking_id: Uuid,
    source_ip: Option<IpAddr>,
    user_agent: Option<&str>,
    referer: Option<&str>,
) {
    let outcome = visits::record_visit(
        storage,
        &UnknownLocator,
        &VisitRequest {
            alias,
            tracking_id: Some(tracking_id),
            source_ip,
            user_agent,
            referer,
        },
    )
    .await
    .unwrap();

    assert!(outcome.is_some(), "visit through {alias} should resolve");
}

#[tokio::test]
async fn test_overall_daily_and_monthly_scenario() {
    let storage = Memory::new();
    let link_id = live_link(&storage, "https://example.com/", "scenario").await;

    let t1 = Uuid::new_v4();
    let t2 = Uuid::new_v4();

    // three visits, two distinct visitors
    one_visit(&storage, "scenario", t1).await;
    one_visit(&storage, "scenario", t1).await;
    one_visit(&storage, "scenario", t2).await;

    let overall = analytics::overall_visits(&storage, &link_id, None)
        .await
        .unwrap();
    assert_eq!(3, overall.total_visits);
    assert_eq!(2, overall.unique_visits);

    let daily = analytics::daily_visits(&storage, &link_id, None)
        .await
        .unwrap();
    assert_eq!(1, daily.len());
    assert_eq!(2, daily[0].first_time_visits);
    assert_eq!(3, daily[0].all_visits);

    let monthly = analytics::monthly_visits(&storage, &link_id, None)
        .await
        .unwrap();
    assert_eq!(1, monthly.len());
    assert_eq!(2, monthly[0].first_time_visits);
    assert_eq!(3, monthly[0].all_visits);
}

#[tokio::test]
async fn test_first_time_visit_conservation() {
    let storage = Memory::new();
    let link_id = live_link(&storage, "https://example.com/", "conserved").await;

    // 17 visits from 5 distinct tracking ids
    let visitors: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    let mut total: u64 = 0;
    for (index, tracking_id) in visitors.iter().enumerate() {
        for _ in 0..=index {
            one_visit(&storage, "conserved", *tracking_id).await;
            total += 1;
        }
    }
    // a couple of repeats from the first visitor
    one_visit(&storage, "conserved", visitors[0]).await;
    one_visit(&storage, "conserved", visitors[0]).await;
    total += 2;

    let daily = analytics::daily_visits(&storage, &link_id, None)
        .await
        .unwrap();

    let first_time: u64 = daily.iter().map(|day| day.first_time_visits).sum();
    let all: u64 = daily.iter().map(|day| day.all_visits).sum();

    assert_eq!(visitors.len() as u64, first_time);
    assert_eq!(total, all);

    let overall = analytics::overall_visits(&storage, &link_id, None)
        .await
        .unwrap();
    assert_eq!(visitors.len() as u64, overall.unique_visits);
    assert_eq!(total, overall.total_visits);
}

#[tokio::test]
async fn test_alias_scoped_overall_visits() {
    let storage = Memory::new();
    let link_id = live_link(&storage, "https://example.com/", "front").await;
    links::create_or_modify_alias(&storage, &link_id, Some("back"), "")
        .await
        .unwrap();

    let t1 = Uuid::new_v4();
    let t2 = Uuid::new_v4();

    one_visit(&storage, "front", t1).await;
    one_visit(&storage, "front", t2).await;
    one_visit(&storage, "back", t1).await;

    // whole link, off the denormalized counters
    let overall = analytics::overall_visits(&storage, &link_id, None)
        .await
        .unwrap();
    assert_eq!(3, overall.total_visits);
    assert_eq!(2, overall.unique_visits);

    // per alias, computed from the log
    let front = analytics::overall_visits(&storage, &link_id, Some("front"))
        .await
        .unwrap();
    assert_eq!(2, front.total_visits);
    assert_eq!(2, front.unique_visits);

    let back = analytics::overall_visits(&storage, &link_id, Some("back"))
        .await
        .unwrap();
    assert_eq!(1, back.total_visits);
    assert_eq!(1, back.unique_visits);
}

#[tokio::test]
async fn test_clear_visits_is_a_full_reset() {
    let storage = Memory::new();
    let link_id = live_link(&storage, "https://example.com/", "wiped").await;

    one_visit(&storage, "wiped", Uuid::new_v4()).await;
    one_visit(&storage, "wiped", Uuid::new_v4()).await;

    let purged = links::clear_visits(&storage, &link_id).await.unwrap();
    assert_eq!(2, purged);

    let overall = analytics::overall_visits(&storage, &link_id, None)
        .await
        .unwrap();
    assert_eq!(0, overall.total_visits);
    assert_eq!(0, overall.unique_visits);

    assert!(
        analytics::daily_visits(&storage, &link_id, None)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_geoip_stats() {
    let storage = Memory::new();
    let link_id = live_link(&storage, "https://example.com/", "places").await;

    let newark = IpAddr::V4(Ipv4Addr::new(128, 6, 4, 2));
    let fresno = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));
    let berlin = IpAddr::V4(Ipv4Addr::new(88, 66, 44, 22));
    let nowhere = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9));

    let locator = MapLocator {
        locations: HashMap::from([
            (
                newark,
                Location {
                    country_code: Some("US".to_string()),
                    subdivision_code: Some("NJ".to_string()),
                },
            ),
            (
                fresno,
                Location {
                    country_code: Some("US".to_string()),
                    subdivision_code: Some("CA".to_string()),
                },
            ),
            (
                berlin,
                Location {
                    country_code: Some("DE".to_string()),
                    subdivision_code: None,
                },
            ),
        ]),
    };

    for ip in [newark, newark, fresno, berlin, nowhere] {
        let outcome = visits::record_visit(
            &storage,
            &locator,
            &VisitRequest {
                alias: "places",
                tracking_id: Some(Uuid::new_v4()),
                source_ip: Some(ip),
                user_agent: None,
                referer: None,
            },
        )
        .await
        .unwrap();

        assert!(outcome.is_some());
    }

    let stats = analytics::geoip_stats(&storage, Some(&link_id), None)
        .await
        .unwrap();

    // worldwide by country, the unknown address excluded
    assert_eq!(2, stats.world.len());
    assert_eq!("US", stats.world[0].code);
    assert_eq!(3, stats.world[0].count);
    assert_eq!("DE", stats.world[1].code);
    assert_eq!(1, stats.world[1].count);

    // United States by subdivision
    assert_eq!(2, stats.us.len());
    assert_eq!("NJ", stats.us[0].code);
    assert_eq!(2, stats.us[0].count);
    assert_eq!("CA", stats.us[1].code);
    assert_eq!(1, stats.us[1].count);
}

#[tokio::test]
async fn test_browser_and_referer_stats() {
    let storage = Memory::new();
    let link_id = live_link(&storage, "https://example.com/", "agents").await;

    let chrome = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    let firefox = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    let search = "https://search.example/results?q=trimly";
    let social = "https://www.social.example/feed";

    one_visit_full(&storage, "agents", Uuid::new_v4(), None, Some(chrome), Some(search)).await;
    one_visit_full(&storage, "agents", Uuid::new_v4(), None, Some(chrome), Some(social)).await;
    one_visit_full(&storage, "agents", Uuid::new_v4(), None, Some(firefox), Some(search)).await;
    one_visit_full(&storage, "agents", Uuid::new_v4(), None, None, None).await;

    let browsers = analytics::browser_stats(&storage, &link_id, None)
        .await
        .unwrap();

    let counts: Vec<(&str, u64)> = browsers
        .iter()
        .map(|entry| (entry.category.as_str(), entry.count))
        .collect();
    assert_eq!(vec![("Chrome", 2), ("Firefox", 1), ("Unknown", 1)], counts);

    let referers = analytics::referer_stats(&storage, &link_id, None)
        .await
        .unwrap();

    let counts: Vec<(&str, u64)> = referers
        .iter()
        .map(|entry| (entry.category.as_str(), entry.count))
        .collect();
    assert_eq!(
        vec![("search.example", 2), ("Unknown", 1), ("social.example", 1)],
        counts
    );
}
