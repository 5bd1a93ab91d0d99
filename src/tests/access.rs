//! Access resolver tests

use crate::access;
use crate::links;
use crate::links::CreatedLink;
use crate::links::NewLink;
use crate::links::Owner;
use crate::roles;
use crate::storage::Memory;
use crate::storage::NewMemberValues;
use crate::storage::Storage;
use crate::tests::helper;

/// Create a live link for an owner
async fn owned_link(storage: &Memory, owner: Owner) -> links::Link {
    let created = links::create_link(
        storage,
        &helper::test_policy(),
        &NewLink {
            title: "Access test",
            destination: &url::Url::parse("https://www.example.com/").unwrap(),
            owner: &owner,
            expires_at: None,
            bypass_review: false,
        },
    )
    .await
    .unwrap();

    match created {
        CreatedLink::Live(link) => link,
        CreatedLink::HeldForReview(_) => panic!("clean destinations go live"),
    }
}

/// Put a member in an organization, creating it on the fly
async fn enroll(storage: &Memory, organization: &str, username: &str, is_admin: bool) {
    storage.create_organization(organization).await.unwrap();
    storage
        .add_organization_member(organization, &NewMemberValues { username, is_admin })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_owner_may_view_and_edit() {
    let storage = Memory::new();
    let link = owned_link(&storage, Owner::User(helper::OWNER.to_string())).await;

    assert!(access::is_owner(&link, helper::OWNER));
    assert!(access::may_view(&storage, &link, helper::OWNER).await.unwrap());
    assert!(access::may_edit(&storage, &link, helper::OWNER).await.unwrap());

    assert!(!access::is_owner(&link, helper::OTHER));
    assert!(!access::may_view(&storage, &link, helper::OTHER).await.unwrap());
    assert!(!access::may_edit(&storage, &link, helper::OTHER).await.unwrap());
}

#[tokio::test]
async fn test_shared_organization_grants_viewing_only() {
    let storage = Memory::new();
    let link = owned_link(&storage, Owner::User(helper::OWNER.to_string())).await;

    // owner and principal share one organization of several
    enroll(&storage, "writers", helper::OWNER, false).await;
    enroll(&storage, "editors", helper::OWNER, false).await;
    enroll(&storage, "editors", helper::OTHER, false).await;
    enroll(&storage, "readers", helper::OTHER, false).await;

    assert!(access::may_view(&storage, &link, helper::OTHER).await.unwrap());
    assert!(!access::may_edit(&storage, &link, helper::OTHER).await.unwrap());

    // symmetric: the owner may see links of the co-member too
    let other_link = owned_link(&storage, Owner::User(helper::OTHER.to_string())).await;
    assert!(
        access::may_view(&storage, &other_link, helper::OWNER)
            .await
            .unwrap()
    );

    // no shared organization, no access
    let stranger_link = owned_link(&storage, Owner::User("stranger".to_string())).await;
    assert!(
        !access::may_view(&storage, &stranger_link, helper::OTHER)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_organization_owned_links() {
    let storage = Memory::new();
    let link = owned_link(&storage, Owner::Organization("marketing".to_string())).await;

    enroll(&storage, "marketing", helper::OWNER, true).await;
    enroll(&storage, "marketing", helper::OTHER, false).await;

    // nobody is "the owner" of an organization-owned link
    assert!(!access::is_owner(&link, helper::OWNER));

    // members view; organization admins edit
    assert!(access::may_view(&storage, &link, helper::OWNER).await.unwrap());
    assert!(access::may_view(&storage, &link, helper::OTHER).await.unwrap());
    assert!(access::may_edit(&storage, &link, helper::OWNER).await.unwrap());
    assert!(!access::may_edit(&storage, &link, helper::OTHER).await.unwrap());

    // non-members see nothing
    assert!(
        !access::may_view(&storage, &link, "stranger").await.unwrap()
    );
}

#[tokio::test]
async fn test_site_admins_may_do_everything() {
    let storage = Memory::new();
    let link = owned_link(&storage, Owner::User(helper::OWNER.to_string())).await;

    storage
        .grant_role(roles::ADMIN, helper::ADMIN, "test-setup")
        .await
        .unwrap();

    assert!(access::may_view(&storage, &link, helper::ADMIN).await.unwrap());
    assert!(access::may_edit(&storage, &link, helper::ADMIN).await.unwrap());
}
