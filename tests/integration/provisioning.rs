//! Agent authentication and auto-provisioning tests
//!
//! These cover the provisioning contract end to end against in-memory
//! storage: single record creation, idempotent repeats, identifier
//! boundaries, privilege-scoped group resolution and abuse mitigation.

use assert_matches::assert_matches;
use fleet_monitoring::auth::AuthError;
use fleet_monitoring::storage::Storage;
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_first_contact_creates_exactly_one_record() {
    let hub = test_hub().await;

    let id = hub
        .gateway
        .authenticate(&agent_ctx(USER_SECRET, "abc-123"))
        .await
        .unwrap();
    assert!(id > 0);

    let hosts = hub.storage.load_hosts().await.unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].uuid, "abc-123");
    assert_eq!(hosts[0].user_id, 42);

    // the record is live in the inventory as well
    assert_eq!(hub.inventory.len().await, 1);
}

#[tokio::test]
async fn test_repeat_authentication_is_idempotent() {
    let hub = test_hub().await;

    let first = hub
        .gateway
        .authenticate(&agent_ctx(USER_SECRET, "abc-123"))
        .await
        .unwrap();
    let second = hub
        .gateway
        .authenticate(&agent_ctx(USER_SECRET, "abc-123"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(hub.storage.load_hosts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_secret_blocks_address() {
    let hub = test_hub().await;

    let err = hub
        .gateway
        .authenticate(&agent_ctx("wrong", "abc-123"))
        .await
        .unwrap_err();
    assert_matches!(err, AuthError::Unauthenticated(_));

    assert!(hub.storage.is_blocked(PEER_ADDR).await);
    assert!(hub.storage.load_hosts().await.unwrap().is_empty());

    // a later valid call from the same address unblocks it
    hub.gateway
        .authenticate(&agent_ctx(USER_SECRET, "abc-123"))
        .await
        .unwrap();
    assert!(!hub.storage.is_blocked(PEER_ADDR).await);
}

#[tokio::test]
async fn test_missing_secret_is_rejected() {
    let hub = test_hub().await;

    let err = hub
        .gateway
        .authenticate(&agent_ctx("", "abc-123"))
        .await
        .unwrap_err();
    assert_matches!(err, AuthError::Unauthenticated(_));
}

#[tokio::test]
async fn test_uuid_length_boundaries() {
    let hub = test_hub().await;

    // 0 and 65 are rejected
    let err = hub
        .gateway
        .authenticate(&agent_ctx(USER_SECRET, ""))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "client identifier invalid, must be 1-64 characters");

    let err = hub
        .gateway
        .authenticate(&agent_ctx(USER_SECRET, &"x".repeat(65)))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "client identifier invalid, must be 1-64 characters");

    assert!(hub.storage.load_hosts().await.unwrap().is_empty());

    // 1 and 64 are accepted
    hub.gateway
        .authenticate(&agent_ctx(USER_SECRET, "x"))
        .await
        .unwrap();
    hub.gateway
        .authenticate(&agent_ctx(USER_SECRET, &"y".repeat(64)))
        .await
        .unwrap();

    assert_eq!(hub.storage.load_hosts().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_supplied_name_is_kept_and_missing_name_synthesized() {
    let hub = test_hub().await;

    hub.gateway
        .authenticate(&agent_ctx_full(USER_SECRET, "named", Some("web-01"), None))
        .await
        .unwrap();
    hub.gateway
        .authenticate(&agent_ctx(USER_SECRET, "anonymous"))
        .await
        .unwrap();

    let hosts = hub.storage.load_hosts().await.unwrap();
    let named = hosts.iter().find(|h| h.uuid == "named").unwrap();
    assert_eq!(named.name, "web-01");

    let anonymous = hosts.iter().find(|h| h.uuid == "anonymous").unwrap();
    // synthesized two-word name
    assert!(anonymous.name.contains('-'), "got '{}'", anonymous.name);
}

#[tokio::test]
async fn test_group_membership_created_in_scope() {
    let hub = test_hub().await;
    hub.storage.add_group(5, "prod", 42).await;

    hub.gateway
        .authenticate(&agent_ctx_full(USER_SECRET, "grouped", None, Some("prod")))
        .await
        .unwrap();

    let memberships = hub.storage.memberships().await;
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].0, 5);
}

#[tokio::test]
async fn test_ordinary_account_cannot_use_foreign_group() {
    let hub = test_hub().await;
    // group owned by the administrator account, not by 42
    hub.storage.add_group(5, "core", 7).await;

    let err = hub
        .gateway
        .authenticate(&agent_ctx_full(USER_SECRET, "sneaky", None, Some("core")))
        .await
        .unwrap_err();
    assert_eq!(
        err.reason(),
        "specified host group does not exist or is not accessible"
    );

    // nothing was provisioned
    assert!(hub.storage.load_hosts().await.unwrap().is_empty());
    assert!(hub.storage.memberships().await.is_empty());
}

#[tokio::test]
async fn test_admin_resolves_foreign_group() {
    let hub = test_hub().await;
    // group owned by ordinary account 42
    hub.storage.add_group(9, "edge", 42).await;

    hub.gateway
        .authenticate(&agent_ctx_full(ADMIN_SECRET, "admin-box", None, Some("edge")))
        .await
        .unwrap();

    let memberships = hub.storage.memberships().await;
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].0, 9);
}

#[tokio::test]
async fn test_admin_unknown_group_still_fails() {
    let hub = test_hub().await;

    let err = hub
        .gateway
        .authenticate(&agent_ctx_full(ADMIN_SECRET, "admin-box", None, Some("ghost")))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "specified host group does not exist");
}

#[tokio::test]
async fn test_own_group_preferred_over_same_named_foreign_one() {
    let hub = test_hub().await;
    hub.storage.add_group(1, "prod", 7).await;
    hub.storage.add_group(2, "prod", 42).await;

    hub.gateway
        .authenticate(&agent_ctx_full(USER_SECRET, "mine", None, Some("prod")))
        .await
        .unwrap();

    let memberships = hub.storage.memberships().await;
    assert_eq!(memberships[0].0, 2);
}

#[tokio::test]
async fn test_concurrent_first_contact_creates_one_record() {
    let hub = test_hub().await;

    let mut tasks = vec![];
    for _ in 0..8 {
        let gateway = hub.gateway.clone();
        tasks.push(tokio::spawn(async move {
            gateway
                .authenticate(&agent_ctx(USER_SECRET, "racy-uuid"))
                .await
        }));
    }

    let mut ids = vec![];
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }

    // every concurrent caller observed the same final identity
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(hub.storage.load_hosts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_provisioned_host_is_enriched_lazily() {
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::time::Duration;

    use fleet_monitoring::auth::{CallContext, META_CLIENT_SECRET, META_CLIENT_UUID};

    let hub = test_hub_with_geo().await;

    // peer address resolvable through the bundled offline database
    let ctx = CallContext::new(
        HashMap::from([
            (META_CLIENT_SECRET.to_string(), USER_SECRET.to_string()),
            (META_CLIENT_UUID.to_string(), "enriched".to_string()),
        ]),
        Some("8.8.8.8".parse::<IpAddr>().unwrap()),
    );

    hub.gateway.authenticate(&ctx).await.unwrap();

    // enrichment runs in the background; authentication never waits on it
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !hub.inventory.has_geo("enriched").await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "host was never enriched"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let view = hub.inventory.sorted_view(true).await;
    let geo = view[0].geo.as_ref().unwrap();
    assert_eq!(geo.country_code, "us");
    assert_eq!(geo.organization, "Google LLC");
    assert_eq!(geo.addrs.join(), "8.8.8.8");
}

#[tokio::test]
async fn test_fast_path_refreshes_liveness() {
    let hub = test_hub().await;

    hub.gateway
        .authenticate(&agent_ctx(USER_SECRET, "abc-123"))
        .await
        .unwrap();

    hub.gateway
        .authenticate(&agent_ctx(USER_SECRET, "abc-123"))
        .await
        .unwrap();

    let view = hub.inventory.sorted_view(true).await;
    assert!(view[0].last_active.is_some());
}
