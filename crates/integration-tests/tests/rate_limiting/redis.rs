//! These tests need a running Redis. Point `GATEKEEPER_TEST_REDIS_URL` at it
//! and run with `--ignored`.

use indoc::formatdoc;
use integration_tests::{TestServer, unique_prefix};

fn redis_url() -> String {
    std::env::var("GATEKEEPER_TEST_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn config(prefix: &str, capacity: u32) -> String {
    formatdoc! {r#"
        [rate_limits]
        key_prefix = "{prefix}"

        [rate_limits.storage]
        type = "redis"
        url = "{url}"

        [identity]
        chain = ["session"]

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = {capacity}
        window = "10s"
    "#, prefix = prefix, url = redis_url(), capacity = capacity}
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn redis_throttles_after_capacity() {
    let server = TestServer::start(&config(&unique_prefix(), 3)).await;

    for _ in 0..3 {
        assert_eq!(server.client.get_with_session("/whoami", "alice").await.status(), 200);
    }

    let response = server.client.get_with_session("/whoami", "alice").await;
    assert_eq!(response.status(), 429);
    assert_eq!(response.headers().get("retry-after").unwrap(), "10");
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn instances_share_counters_through_redis() {
    let config = config(&unique_prefix(), 2);

    let first = TestServer::start(&config).await;
    let second = TestServer::start(&config).await;

    assert_eq!(first.client.get_with_session("/whoami", "alice").await.status(), 200);
    assert_eq!(second.client.get_with_session("/whoami", "alice").await.status(), 200);
    assert_eq!(first.client.get_with_session("/whoami", "alice").await.status(), 429);
    assert_eq!(second.client.get_with_session("/whoami", "alice").await.status(), 429);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn distinct_prefixes_do_not_collide() {
    let first = TestServer::start(&config(&unique_prefix(), 1)).await;
    let second = TestServer::start(&config(&unique_prefix(), 1)).await;

    assert_eq!(first.client.get_with_session("/whoami", "alice").await.status(), 200);
    assert_eq!(second.client.get_with_session("/whoami", "alice").await.status(), 200);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn stacked_rules_with_the_default_key_keep_their_own_budgets() {
    let config = formatdoc! {r#"
        [rate_limits]
        key_prefix = "{prefix}"

        [rate_limits.storage]
        type = "redis"
        url = "{url}"

        [identity]
        chain = ["session"]

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = 3
        window = "10s"

        [[routes.limits]]
        capacity = 100
        window = "1h"
    "#, prefix = unique_prefix(), url = redis_url()};

    let server = TestServer::start(&config).await;

    for _ in 0..3 {
        assert_eq!(server.client.get_with_session("/whoami", "alice").await.status(), 200);
    }

    assert_eq!(server.client.get_with_session("/whoami", "alice").await.status(), 429);
}
