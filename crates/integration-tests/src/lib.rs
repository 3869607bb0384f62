use std::net::SocketAddr;
use std::time::Duration;

use config::Config;
use reqwest::{Method, RequestBuilder, redirect::Policy};
use server::ServeConfig;
use tokio::net::TcpListener;
use tokio::time::timeout;

/// Test client for making HTTP requests to the test server.
///
/// Redirects are not followed and cookies are not stored, so each test sees
/// exactly what the gate answers.
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    /// Create a new test client for the given base URL
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .expect("Failed to create client");

        Self { base_url, client }
    }

    /// Start building a request to the given path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    /// Send a GET request to the given path
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.request(Method::GET, path).send().await.unwrap()
    }

    /// Send a GET request carrying a session cookie
    pub async fn get_with_session(&self, path: &str, session: &str) -> reqwest::Response {
        self.request(Method::GET, path)
            .header("cookie", format!("th-session={session}"))
            .send()
            .await
            .unwrap()
    }

    /// Send a GET request carrying a bearer token
    pub async fn get_with_token(&self, path: &str, token: &str) -> reqwest::Response {
        self.request(Method::GET, path).bearer_auth(token).send().await.unwrap()
    }
}

/// Test server that manages the lifecycle of a server instance
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    pub config: Config,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server with the given TOML configuration
    pub async fn start(config_toml: &str) -> Self {
        let config: Config = toml::from_str(config_toml).unwrap();
        config.validate().unwrap();

        // Find an available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let serve_config = ServeConfig {
            listen_address: address,
            config: config.clone(),
        };

        let (tx, mut rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            // Drop the listener so the server can bind to the address
            drop(listener);

            let _ = tx.send(server::serve(serve_config).await);
        });

        let client = TestClient::new(format!("http://{address}"));

        // Wait until the server answers or fails
        let mut retries = 20;

        while retries > 0 {
            if let Ok(Err(e)) = rx.try_recv() {
                eprintln!("Server failed to start: {e}");
                std::process::exit(1);
            }

            let probe = client.request(Method::GET, "/health").send();

            if let Ok(Ok(_)) = timeout(Duration::from_millis(100), probe).await {
                break;
            }

            retries -= 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestServer {
            client,
            address,
            config,
            _handle: handle,
        }
    }

    /// Mint a token with the server's `[token]` configuration
    pub fn mint_token(&self, claims: serde_json::Value) -> String {
        let token_config = self.config.token.as_ref().expect("no [token] section");
        let codec = server::TokenCodec::new(token_config).unwrap();
        let claims = claims.as_object().cloned().expect("claims must be a JSON object");

        codec.encode(&claims, codec.ttl()).unwrap()
    }
}

/// A key prefix unique to one test, so tests sharing a Redis do not collide.
pub fn unique_prefix() -> String {
    format!("gatekeeper:test:{}:", uuid::Uuid::new_v4().simple())
}
