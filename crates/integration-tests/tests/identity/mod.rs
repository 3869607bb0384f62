use indoc::indoc;
use integration_tests::TestServer;
use serde_json::json;

const SESSION_CONFIG: &str = indoc! {r#"
    [identity]
    chain = ["session"]

    [[routes]]
    path = "/whoami"

    [[routes.limits]]
    capacity = 100
    window = "60s"
"#};

const TOKEN_CONFIG: &str = indoc! {r#"
    [identity]
    chain = ["token", "session"]

    [token]
    algorithm = "HS256"
    secret = "integration-test-secret"

    [[routes]]
    path = "/whoami"

    [[routes.limits]]
    capacity = 100
    window = "60s"
"#};

#[tokio::test]
async fn missing_session_is_issued_with_redirect() {
    let server = TestServer::start(SESSION_CONFIG).await;

    let response = server.client.get("/whoami?x=1").await;
    assert_eq!(response.status(), 307);

    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert_eq!(location, "/whoami?x=1");

    let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
    assert!(cookie.starts_with("th-session="), "unexpected cookie: {cookie}");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
}

#[tokio::test]
async fn issued_session_identifies_the_follow_up_request() {
    let server = TestServer::start(SESSION_CONFIG).await;

    let response = server.client.get("/whoami").await;
    let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
    let session = cookie.split(';').next().unwrap().trim_start_matches("th-session=").to_string();

    let response = server.client.get_with_session("/whoami", &session).await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["identifier"], format!("anon:{session}"));
    assert_eq!(body["scopes"], json!(["anonymous"]));
}

#[tokio::test]
async fn ip_backend_identifies_by_peer_address() {
    let config = indoc! {r#"
        [identity]
        chain = ["ip"]

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = 100
        window = "60s"
    "#};

    let server = TestServer::start(config).await;

    let response = server.client.get("/whoami").await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    insta::assert_json_snapshot!(body, @r#"
    {
      "identifier": "anon:127.0.0.1",
      "scopes": [
        "anonymous"
      ],
      "identity": {
        "kind": "anonymous",
        "id": "127.0.0.1"
      }
    }
    "#);
}

#[tokio::test]
async fn forwarded_address_is_ignored_unless_trusted() {
    let config = indoc! {r#"
        [identity]
        chain = ["ip"]

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = 100
        window = "60s"
    "#};

    let server = TestServer::start(config).await;

    let response = server
        .client
        .request(reqwest::Method::GET, "/whoami")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["identifier"], "anon:127.0.0.1");
}

#[tokio::test]
async fn trusted_forwarded_address_wins() {
    let config = indoc! {r#"
        [identity]
        chain = ["ip"]
        trust_forwarded_headers = true

        [[routes]]
        path = "/whoami"

        [[routes.limits]]
        capacity = 100
        window = "60s"
    "#};

    let server = TestServer::start(config).await;

    let response = server
        .client
        .request(reqwest::Method::GET, "/whoami")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["identifier"], "anon:203.0.113.7");
}

#[tokio::test]
async fn valid_token_identifies_the_user() {
    let server = TestServer::start(TOKEN_CONFIG).await;
    let token = server.mint_token(json!({"sub": "u1", "scope": ["read", "write"]}));

    let response = server.client.get_with_token("/whoami", &token).await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["identifier"], "user:u1");
    assert_eq!(body["scopes"], json!(["read", "write"]));
    assert_eq!(body["identity"]["kind"], "authenticated");
    assert_eq!(body["identity"]["claims"]["sub"], "u1");
}

#[tokio::test]
async fn garbage_token_falls_through_to_session_issuance() {
    let server = TestServer::start(TOKEN_CONFIG).await;

    let response = server.client.get_with_token("/whoami", "not-a-token").await;
    assert_eq!(response.status(), 307);
    assert!(response.headers().contains_key("set-cookie"));
}

#[tokio::test]
async fn expired_token_falls_through_to_session() {
    let server = TestServer::start(TOKEN_CONFIG).await;
    let token = server.mint_token(json!({"sub": "u1", "exp": 1_000_000_000}));

    let response = server
        .client
        .request(reqwest::Method::GET, "/whoami")
        .bearer_auth(&token)
        .header("cookie", "th-session=fallback")
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["identifier"], "anon:fallback");
}
