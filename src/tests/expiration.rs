use axum::http::Method;
use axum::http::StatusCode;
use chrono::Duration;
use chrono::Utc;
use serde_json::json;

use crate::tests::helper;

#[tokio::test]
async fn test_expired_links_do_not_resolve() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let past = (Utc::now() - Duration::hours(1)).naive_utc();

    let (status_code, body) = helper::send(
        &mut app,
        Method::POST,
        "/api/links",
        Some(helper::OWNER),
        Some(json!({
            "title": "Short lived",
            "destination": "https://www.example.com/",
            "expiresAt": past,
        })),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status_code);
    let link_id = helper::data_id(&body);

    helper::create_alias(&mut app, helper::OWNER, &link_id, Some("bygone")).await;

    // already past its expiration time
    let (status_code, location, _) = helper::visit(&mut app, "bygone").await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);
    assert_eq!(None, location);

    // clearing the expiration makes it resolvable again
    let (status_code, _) = helper::send(
        &mut app,
        Method::PATCH,
        &format!("/api/links/{link_id}"),
        Some(helper::OWNER),
        Some(json!({ "clearExpiration": true })),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);

    let (status_code, location, _) = helper::visit(&mut app, "bygone").await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, status_code);
    assert_eq!(Some("https://www.example.com/".to_string()), location);
}

#[tokio::test]
async fn test_future_expiration_still_resolves() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let future = (Utc::now() + Duration::days(30)).naive_utc();

    let (_, body) = helper::send(
        &mut app,
        Method::POST,
        "/api/links",
        Some(helper::OWNER),
        Some(json!({
            "title": "Still alive",
            "destination": "https://www.example.com/",
            "expiresAt": future,
        })),
    )
    .await;
    let link_id = helper::data_id(&body);

    helper::create_alias(&mut app, helper::OWNER, &link_id, Some("current")).await;

    let (status_code, _, _) = helper::visit(&mut app, "current").await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, status_code);

    // no visit is recorded for an expired link either way
    let (status_code, _) = helper::send(
        &mut app,
        Method::PATCH,
        &format!("/api/links/{link_id}"),
        Some(helper::OWNER),
        Some(json!({ "expiresAt": (Utc::now() - Duration::minutes(5)).naive_utc() })),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);

    let (status_code, _, _) = helper::visit(&mut app, "current").await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);

    let (_, stats) = helper::send(
        &mut app,
        Method::GET,
        &format!("/api/links/{link_id}/stats"),
        Some(helper::OWNER),
        None,
    )
    .await;
    assert_eq!(1, stats["data"]["totalVisits"].as_u64().unwrap());
}
