//! Geo/ASN enrichment tests against a mocked external lookup service

use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use fleet_monitoring::geo::{GeoError, GeoResolver};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn success_body(country: &str, autonomous_system: &str) -> serde_json::Value {
    json!({
        "status": "success",
        "countryCode": country,
        "as": autonomous_system,
        "org": "",
        "query": "198.51.100.7"
    })
}

fn resolver(base: &str, ttl: Duration, interval: Duration) -> GeoResolver {
    GeoResolver::new(base, ttl, interval)
}

#[tokio::test]
async fn test_fallback_resolves_and_caches() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/198.51.100.7"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(success_body("DE", "AS24940 Hetzner Online GmbH")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let resolver = resolver(
        &mock_server.uri(),
        Duration::from_secs(60),
        Duration::from_millis(1),
    );

    let first = resolver.resolve("198.51.100.7".parse().unwrap()).await.unwrap();
    assert_eq!(first.country_code, "de");
    assert_eq!(first.organization, "Hetzner Online GmbH");

    // second lookup is served from the cache; the mock's expect(1)
    // verifies no second call went out
    let second = resolver.resolve("198.51.100.7".parse().unwrap()).await.unwrap();
    assert_eq!(second, first);

    assert_eq!(resolver.cache_stats().await.total, 1);
}

#[tokio::test]
async fn test_offline_primary_skips_network() {
    let mock_server = MockServer::start().await;
    // no mounted mocks: any request would 404 and fail the lookup

    let resolver = resolver(
        &mock_server.uri(),
        Duration::from_secs(60),
        Duration::from_millis(1),
    );

    let resolution = resolver.resolve("8.8.8.8".parse().unwrap()).await.unwrap();
    assert_eq!(resolution.country_code, "us");
    assert_eq!(resolution.organization, "Google LLC");

    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rate_limit_spaces_outbound_calls() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(success_body("FR", "AS12876 Scaleway")),
        )
        .mount(&mock_server)
        .await;

    let interval = Duration::from_millis(300);
    let resolver = resolver(&mock_server.uri(), Duration::from_secs(60), interval);

    let started = Instant::now();
    resolver.resolve("198.51.100.1".parse().unwrap()).await.unwrap();
    resolver.resolve("198.51.100.2".parse().unwrap()).await.unwrap();

    // the second outbound call waited out the remainder of the interval
    assert!(
        started.elapsed() >= interval,
        "calls were {}ms apart",
        started.elapsed().as_millis()
    );
}

#[tokio::test]
async fn test_http_error_is_not_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let resolver = resolver(
        &mock_server.uri(),
        Duration::from_secs(60),
        Duration::from_millis(1),
    );

    let err = resolver
        .resolve("198.51.100.7".parse().unwrap())
        .await
        .unwrap_err();
    assert_matches!(err, GeoError::Status(503));

    assert_eq!(resolver.cache_stats().await.total, 0);
}

#[tokio::test]
async fn test_service_level_failure_is_not_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "fail",
            "query": "198.51.100.7"
        })))
        .mount(&mock_server)
        .await;

    let resolver = resolver(
        &mock_server.uri(),
        Duration::from_secs(60),
        Duration::from_millis(1),
    );

    let err = resolver
        .resolve("198.51.100.7".parse().unwrap())
        .await
        .unwrap_err();
    assert_matches!(err, GeoError::Lookup(_));

    assert_eq!(resolver.cache_stats().await.total, 0);
}

#[tokio::test]
async fn test_expired_entry_triggers_refresh() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/198.51.100.7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(success_body("DE", "AS24940 Hetzner")),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let resolver = resolver(
        &mock_server.uri(),
        Duration::from_millis(80),
        Duration::from_millis(1),
    );

    resolver.resolve("198.51.100.7".parse().unwrap()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    // past the TTL the entry is treated as absent and refreshed
    resolver.resolve("198.51.100.7".parse().unwrap()).await.unwrap();
}

#[tokio::test]
async fn test_organization_falls_back_to_org_field() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "countryCode": "NL",
            "as": "",
            "org": "SURFnet bv",
            "query": "198.51.100.7"
        })))
        .mount(&mock_server)
        .await;

    let resolver = resolver(
        &mock_server.uri(),
        Duration::from_secs(60),
        Duration::from_millis(1),
    );

    let resolution = resolver
        .resolve("198.51.100.7".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(resolution.organization, "SURFnet bv");
}
