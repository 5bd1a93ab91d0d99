//! Redirect handler tests: cookies, query forwarding, 404 behavior

use axum::http::StatusCode;

use crate::root::TRACKING_COOKIE;
use crate::storage::Storage;
use crate::tests::helper;

#[tokio::test]
async fn test_tracking_cookie_deduplicates_visitors() {
    let (mut app, storage) = helper::setup_test_app().await;

    let (_, body) =
        helper::create_link(&mut app, helper::OWNER, "Test", "https://www.example.com/").await;
    let link_id = helper::data_id(&body);
    helper::create_alias(&mut app, helper::OWNER, &link_id, Some("tracked")).await;

    // first visit mints a tracking cookie
    let (status_code, _, set_cookie) = helper::visit(&mut app, "tracked").await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, status_code);
    let set_cookie = set_cookie.expect("redirects carry the tracking cookie");
    assert!(set_cookie.starts_with(TRACKING_COOKIE));

    // replaying it keeps the visit non-unique
    let cookie = helper::cookie_from_set_cookie(&set_cookie);
    let (status_code, _, _) =
        helper::visit_with(&mut app, "tracked", Some(&cookie), None, None).await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, status_code);

    let link = storage.find_link_by_id(&link_id).await.unwrap().unwrap();
    assert_eq!(2, link.visits);
    assert_eq!(1, link.unique_visits);
}

#[tokio::test]
async fn test_query_string_forwarding() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let (_, body) =
        helper::create_link(&mut app, helper::OWNER, "Plain", "https://www.example.com/page").await;
    let plain = helper::data_id(&body);
    helper::create_alias(&mut app, helper::OWNER, &plain, Some("plain")).await;

    let (_, body) = helper::create_link(
        &mut app,
        helper::OWNER,
        "Query",
        "https://www.example.com/page?fixed=1",
    )
    .await;
    let with_query = helper::data_id(&body);
    helper::create_alias(&mut app, helper::OWNER, &with_query, Some("query")).await;

    // no query on the request: destination untouched
    let (_, location, _) = helper::visit(&mut app, "plain").await;
    assert_eq!(Some("https://www.example.com/page".to_string()), location);

    // query appended with `?` when the destination has none
    let (_, location, _) = helper::visit(&mut app, "plain?a=1&b=2").await;
    assert_eq!(
        Some("https://www.example.com/page?a=1&b=2".to_string()),
        location
    );

    // and with `&` when it already carries one
    let (_, location, _) = helper::visit(&mut app, "query?a=1").await;
    assert_eq!(
        Some("https://www.example.com/page?fixed=1&a=1".to_string()),
        location
    );
}

#[tokio::test]
async fn test_unknown_aliases_record_nothing() {
    let (mut app, storage) = helper::setup_test_app().await;

    let (status_code, location, set_cookie) = helper::visit(&mut app, "never-created").await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);
    assert_eq!(None, location);
    assert_eq!(None, set_cookie);

    assert!(
        storage
            .find_visits(None, None)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_deleted_alias_records_nothing() {
    let (mut app, storage) = helper::setup_test_app().await;

    let (_, body) =
        helper::create_link(&mut app, helper::OWNER, "Test", "https://www.example.com/").await;
    let link_id = helper::data_id(&body);
    helper::create_alias(&mut app, helper::OWNER, &link_id, Some("gone")).await;

    // one real visit
    helper::visit(&mut app, "gone").await;

    helper::send(
        &mut app,
        axum::http::Method::DELETE,
        &format!("/api/links/{link_id}/aliases/gone"),
        Some(helper::OWNER),
        None,
    )
    .await;

    let (status_code, _, _) = helper::visit(&mut app, "gone").await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);

    // the not-found attempt did not append to the log
    assert_eq!(1, storage.find_visits(Some(&link_id), None).await.unwrap().len());

    let link = storage.find_link_by_id(&link_id).await.unwrap().unwrap();
    assert_eq!(1, link.visits);
}
