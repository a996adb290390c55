//! Gateways assembled from configuration.

use http::{header, StatusCode};
use janus::config::{IntrospectionConfig, JanusConfig, TimerConfig};
use janus::core::fixtures::{self, ECHO_REQUEST_ID_HEADER};
use janus::{Gateway, REQUEST_ID_HEADER};

fn unreachable_introspection() -> IntrospectionConfig {
    IntrospectionConfig {
        enabled: true,
        // Discard port: nothing listens there.
        endpoint: Some("http://127.0.0.1:9/oauth2/introspect".to_string()),
        client_id: "gateway".to_string(),
        client_secret: "s3cret".to_string(),
        required_scopes: vec!["orders:read".to_string()],
        realm: "edge".to_string(),
        cache_max_timeout: None,
    }
}

#[tokio::test]
async fn bearer_filter_challenges_requests_without_token() {
    let config = JanusConfig::builder()
        .introspection(unreachable_introspection())
        .build();
    let gateway = Gateway::from_config(&config, fixtures::echo_handler()).unwrap();
    assert_eq!(gateway.stage_names(), ["bearer_token"]);

    let response = gateway.handle(fixtures::get("/orders")).value().await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
    assert!(challenge.starts_with("Bearer"));
    assert!(challenge.contains(r#"realm="edge""#));
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    assert!(!response.headers().contains_key(ECHO_REQUEST_ID_HEADER));
}

#[tokio::test]
async fn unreachable_authorization_server_is_a_bad_gateway() {
    let config = JanusConfig::builder()
        .introspection(unreachable_introspection())
        .build();
    let gateway = Gateway::from_config(&config, fixtures::echo_handler()).unwrap();

    let request = fixtures::get_with_header("/orders", "authorization", "Bearer abc123");
    let response = gateway.handle(request).value().await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    // failures are never cached
    assert_eq!(gateway.token_cache().map(|cache| cache.size()), Some(0));
    gateway.shutdown();
}

#[tokio::test]
async fn timed_gateway_still_answers() {
    let config = JanusConfig::builder()
        .timer(TimerConfig {
            enabled: true,
            name: "edge".to_string(),
        })
        .build();
    let gateway = Gateway::from_config(&config, fixtures::echo_handler()).unwrap();

    let response = gateway.handle(fixtures::get("/health")).value().await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[REQUEST_ID_HEADER],
        response.headers()[ECHO_REQUEST_ID_HEADER]
    );
}
