use axum::http::Method;
use axum::http::StatusCode;

use crate::tests::helper;

#[tokio::test]
async fn test_link_crud_and_redirect() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let url = "https://www.example.com/";

    // create a link, no aliases yet
    let (status_code, body) =
        helper::create_link(&mut app, helper::OWNER, "Example", url).await;
    assert_eq!(StatusCode::CREATED, status_code);
    let link_id = helper::data_id(&body);

    // attach an alias
    let (status_code, body) =
        helper::create_alias(&mut app, helper::OWNER, &link_id, Some("docs")).await;
    assert_eq!(StatusCode::CREATED, status_code);
    assert_eq!("docs", helper::data_alias(&body));

    // alias round-trip
    let (status_code, location, _) = helper::visit(&mut app, "docs").await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, status_code);
    assert_eq!(Some(url.to_string()), location);

    // owner sees the link, a stranger gets a generic permission failure
    let uri = format!("/api/links/{link_id}");
    let (status_code, _) =
        helper::send(&mut app, Method::GET, &uri, Some(helper::OWNER), None).await;
    assert_eq!(StatusCode::OK, status_code);

    let (status_code, _) =
        helper::send(&mut app, Method::GET, &uri, Some(helper::OTHER), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);

    // no principal header at all
    let (status_code, _) = helper::send(&mut app, Method::GET, &uri, None, None).await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);

    // soft-delete, the alias stops resolving
    let (status_code, _) =
        helper::send(&mut app, Method::DELETE, &uri, Some(helper::OWNER), None).await;
    assert_eq!(StatusCode::NO_CONTENT, status_code);

    let (status_code, location, _) = helper::visit(&mut app, "docs").await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);
    assert_eq!(None, location);

    // deleting again is not a thing
    let (status_code, _) =
        helper::send(&mut app, Method::DELETE, &uri, Some(helper::OWNER), None).await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);
}

#[tokio::test]
async fn test_duplicate_alias_fails_and_leaves_store_unchanged() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let (_, body) =
        helper::create_link(&mut app, helper::OWNER, "One", "https://one.example/").await;
    let first = helper::data_id(&body);

    let (_, body) =
        helper::create_link(&mut app, helper::OTHER, "Two", "https://two.example/").await;
    let second = helper::data_id(&body);

    let (status_code, _) =
        helper::create_alias(&mut app, helper::OWNER, &first, Some("shared")).await;
    assert_eq!(StatusCode::CREATED, status_code);

    // same name on another link, case-insensitively
    let (status_code, body) =
        helper::create_alias(&mut app, helper::OTHER, &second, Some("SHARED")).await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid alias", helper::error_message(&body));

    // the original still resolves to the first link
    let (status_code, location, _) = helper::visit(&mut app, "shared").await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, status_code);
    assert_eq!(Some("https://one.example/".to_string()), location);
}

#[tokio::test]
async fn test_blocked_destinations_are_rejected() {
    let (mut app, storage) = helper::setup_test_app().await;

    // the regex blacklist
    let (status_code, body) =
        helper::create_link(&mut app, helper::OWNER, "Nope", "https://evil.test/page").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid destination", helper::error_message(&body));

    // the known-phishing table, subdomains included
    use crate::storage::Storage;
    let (status_code, _) = helper::send(
        &mut app,
        Method::PUT,
        "/api/banned-domains/phish.test",
        Some(helper::ADMIN),
        None,
    )
    .await;
    assert_eq!(StatusCode::NO_CONTENT, status_code);

    let (status_code, body) =
        helper::create_link(&mut app, helper::OWNER, "Nope", "https://www.phish.test/login").await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid destination", helper::error_message(&body));

    // nothing was persisted, not even a review record
    assert!(storage.find_all_links().await.unwrap().is_empty());
    assert!(storage.find_all_pending(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_link() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let (_, body) =
        helper::create_link(&mut app, helper::OWNER, "Old", "https://old.example/").await;
    let link_id = helper::data_id(&body);

    helper::create_alias(&mut app, helper::OWNER, &link_id, Some("moving")).await;

    // retarget the destination
    let (status_code, _) = helper::send(
        &mut app,
        Method::PATCH,
        &format!("/api/links/{link_id}"),
        Some(helper::OWNER),
        Some(serde_json::json!({ "destination": "https://new.example/" })),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);

    let (_, location, _) = helper::visit(&mut app, "moving").await;
    assert_eq!(Some("https://new.example/".to_string()), location);

    // a blocked destination is rejected on update too
    let (status_code, body) = helper::send(
        &mut app,
        Method::PATCH,
        &format!("/api/links/{link_id}"),
        Some(helper::OWNER),
        Some(serde_json::json!({ "destination": "https://evil.test/again" })),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid destination", helper::error_message(&body));

    // the failed update did not stick
    let (_, location, _) = helper::visit(&mut app, "moving").await;
    assert_eq!(Some("https://new.example/".to_string()), location);

    // strangers can not edit
    let (status_code, _) = helper::send(
        &mut app,
        Method::PATCH,
        &format!("/api/links/{link_id}"),
        Some(helper::OTHER),
        Some(serde_json::json!({ "title": "Hijacked" })),
    )
    .await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);
}
