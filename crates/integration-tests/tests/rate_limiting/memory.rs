use indoc::indoc;
use integration_tests::TestServer;
use serde_json::json;

#[tokio::test]
async fn fourth_request_in_window_is_throttled() {
    let config = indoc! {r#"
        [identity]
        chain = ["session"]

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = 3
        window = "10s"
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..3 {
        let response = server.client.get_with_session("/whoami", "alice").await;
        assert_eq!(response.status(), 200);
    }

    let response = server.client.get_with_session("/whoami", "alice").await;
    assert_eq!(response.status(), 429);

    let retry_after = response.headers().get("retry-after").unwrap().to_str().unwrap().to_string();
    assert_eq!(retry_after, "10");

    let body: serde_json::Value = response.json().await.unwrap();
    insta::assert_json_snapshot!(body, @r#"
    {
      "error": "too_many_requests",
      "error_description": "Rate limit exceeded, retry in 10 seconds"
    }
    "#);
}

#[tokio::test]
async fn identities_have_separate_budgets() {
    let config = indoc! {r#"
        [identity]
        chain = ["session"]

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = 2
        window = "60s"
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..2 {
        assert_eq!(server.client.get_with_session("/whoami", "alice").await.status(), 200);
    }

    assert_eq!(server.client.get_with_session("/whoami", "alice").await.status(), 429);
    assert_eq!(server.client.get_with_session("/whoami", "bob").await.status(), 200);
}

#[tokio::test]
async fn method_filtered_rule_only_counts_matching_methods() {
    let config = indoc! {r#"
        [identity]
        chain = ["session"]

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = 1
        window = "60s"
        methods = ["post"]
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..3 {
        assert_eq!(server.client.get_with_session("/whoami", "alice").await.status(), 200);
    }
}

#[tokio::test]
async fn scoped_rules_pick_the_tighter_budget_for_anonymous_callers() {
    let config = indoc! {r#"
        [identity]
        chain = ["token", "session"]

        [token]
        algorithm = "HS256"
        secret = "integration-test-secret"

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = 1
        window = "60s"
        key = "anonymous"
        scopes = ["anonymous"]

        [[routes.limits]]
        capacity = 5
        window = "60s"
        key = "members"
        scopes = ["member"]
    "#};

    let server = TestServer::start(config).await;

    assert_eq!(server.client.get_with_session("/whoami", "guest").await.status(), 200);
    assert_eq!(server.client.get_with_session("/whoami", "guest").await.status(), 429);

    let token = server.mint_token(json!({"sub": "u1", "scope": "member"}));

    for _ in 0..5 {
        assert_eq!(server.client.get_with_token("/whoami", &token).await.status(), 200);
    }

    assert_eq!(server.client.get_with_token("/whoami", &token).await.status(), 429);
}

#[tokio::test]
async fn retry_after_reports_the_longest_denied_window() {
    let config = indoc! {r#"
        [identity]
        chain = ["session"]

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = 1
        window = "5s"
        key = "burst"

        [[routes.limits]]
        capacity = 1
        window = "1m"
        key = "sustained"
    "#};

    let server = TestServer::start(config).await;

    assert_eq!(server.client.get_with_session("/whoami", "alice").await.status(), 200);

    let response = server.client.get_with_session("/whoami", "alice").await;
    assert_eq!(response.status(), 429);
    assert_eq!(response.headers().get("retry-after").unwrap(), "60");
}

#[tokio::test]
async fn disabled_rate_limiting_still_resolves_identity() {
    let config = indoc! {r#"
        [rate_limits]
        enabled = false

        [identity]
        chain = ["session"]

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = 1
        window = "60s"
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..3 {
        let response = server.client.get_with_session("/whoami", "alice").await;
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["identifier"], "anon:alice");
    }
}

#[tokio::test]
async fn stacked_rules_with_the_default_key_keep_their_own_budgets() {
    let config = indoc! {r#"
        [identity]
        chain = ["session"]

        [[routes]]
        path = "/whoami"
        operation = "gatekeeper::whoami"

        [[routes.limits]]
        capacity = 3
        window = "10s"

        [[routes.limits]]
        capacity = 100
        window = "1h"
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..3 {
        assert_eq!(server.client.get_with_session("/whoami", "alice").await.status(), 200);
    }

    let response = server.client.get_with_session("/whoami", "alice").await;
    assert_eq!(response.status(), 429);
    assert_eq!(response.headers().get("retry-after").unwrap(), "10");
}
