use axum::http::StatusCode;

use crate::tests::helper;

#[tokio::test]
async fn test_alias_validation() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let (_, body) =
        helper::create_link(&mut app, helper::OWNER, "Test", "https://www.example.com/").await;
    let link_id = helper::data_id(&body);

    for bad in ["with space", "with/slash", "ab", "api", "robots.txt"] {
        let (status_code, body) =
            helper::create_alias(&mut app, helper::OWNER, &link_id, Some(bad)).await;
        assert_eq!(StatusCode::BAD_REQUEST, status_code, "alias {bad:?}");
        assert_eq!("Invalid alias", helper::error_message(&body));
    }
}

#[tokio::test]
async fn test_alias_is_canonicalized_and_matched_case_insensitively() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let (_, body) =
        helper::create_link(&mut app, helper::OWNER, "Test", "https://www.example.com/").await;
    let link_id = helper::data_id(&body);

    let (status_code, body) =
        helper::create_alias(&mut app, helper::OWNER, &link_id, Some("MyDocs")).await;
    assert_eq!(StatusCode::CREATED, status_code);
    // created in lower-case form only
    assert_eq!("mydocs", helper::data_alias(&body));

    // resolution is case-insensitive
    for spelling in ["mydocs", "MyDocs", "MYDOCS"] {
        let (status_code, location, _) = helper::visit(&mut app, spelling).await;
        assert_eq!(StatusCode::TEMPORARY_REDIRECT, status_code, "alias {spelling:?}");
        assert_eq!(Some("https://www.example.com/".to_string()), location);
    }
}

#[tokio::test]
async fn test_deleted_alias_can_be_restored_on_the_same_link() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let (_, body) =
        helper::create_link(&mut app, helper::OWNER, "Test", "https://www.example.com/").await;
    let link_id = helper::data_id(&body);

    helper::create_alias(&mut app, helper::OWNER, &link_id, Some("comeback")).await;

    let (status_code, _) = helper::send(
        &mut app,
        axum::http::Method::DELETE,
        &format!("/api/links/{link_id}/aliases/comeback"),
        Some(helper::OWNER),
        None,
    )
    .await;
    assert_eq!(StatusCode::NO_CONTENT, status_code);

    let (status_code, _, _) = helper::visit(&mut app, "comeback").await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);

    // re-creating the same alias on the same link un-deletes it
    let (status_code, body) =
        helper::create_alias(&mut app, helper::OWNER, &link_id, Some("comeback")).await;
    assert_eq!(StatusCode::CREATED, status_code);
    assert_eq!("comeback", helper::data_alias(&body));

    let (status_code, _, _) = helper::visit(&mut app, "comeback").await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, status_code);
}

#[tokio::test]
async fn test_deleted_alias_name_is_free_for_other_links() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let (_, body) =
        helper::create_link(&mut app, helper::OWNER, "First", "https://one.example/").await;
    let first = helper::data_id(&body);

    let (_, body) =
        helper::create_link(&mut app, helper::OTHER, "Second", "https://two.example/").await;
    let second = helper::data_id(&body);

    helper::create_alias(&mut app, helper::OWNER, &first, Some("recycled")).await;

    helper::send(
        &mut app,
        axum::http::Method::DELETE,
        &format!("/api/links/{first}/aliases/recycled"),
        Some(helper::OWNER),
        None,
    )
    .await;

    // only live aliases occupy the namespace
    let (status_code, _) =
        helper::create_alias(&mut app, helper::OTHER, &second, Some("recycled")).await;
    assert_eq!(StatusCode::CREATED, status_code);

    let (_, location, _) = helper::visit(&mut app, "recycled").await;
    assert_eq!(Some("https://two.example/".to_string()), location);

    // and the restore path on the first link now collides
    let (status_code, body) =
        helper::create_alias(&mut app, helper::OWNER, &first, Some("recycled")).await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid alias", helper::error_message(&body));
}

#[tokio::test]
async fn test_generated_aliases_have_the_right_shape() {
    let (mut app, _storage) = helper::setup_test_app().await;

    let (_, body) =
        helper::create_link(&mut app, helper::OWNER, "Test", "https://www.example.com/").await;
    let link_id = helper::data_id(&body);

    let (status_code, body) = helper::create_alias(&mut app, helper::OWNER, &link_id, None).await;
    assert_eq!(StatusCode::CREATED, status_code);

    let alias = helper::data_alias(&body);
    assert!((4..=8).contains(&alias.len()), "unexpected length for {alias}");
    assert!(
        alias
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
    );

    // and it resolves
    let (status_code, location, _) = helper::visit(&mut app, &alias).await;
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, status_code);
    assert_eq!(Some("https://www.example.com/".to_string()), location);
}
