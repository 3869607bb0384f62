//! Pooled multiplexed Redis connections.

use std::{
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use deadpool::managed::{self, Metrics, PoolConfig};
use redis::{Client, ClientTlsConfig, ErrorKind, RedisError, RedisResult, TlsCertificates, aio::MultiplexedConnection};

use config::{RedisConfig, RedisTlsConfig};

pub(super) type Pool = managed::Pool<Manager>;

/// Creates and health-checks connections for the pool.
#[derive(Debug)]
pub(super) struct Manager {
    client: Client,
    ping_number: AtomicUsize,
}

impl Manager {
    fn new(config: &RedisConfig) -> RedisResult<Self> {
        let client = match &config.tls {
            Some(tls) => Client::build_with_tls(config.url.as_str(), load_certificates(tls)?)?,
            None => Client::open(config.url.as_str())?,
        };

        Ok(Self {
            client,
            ping_number: AtomicUsize::new(0),
        })
    }
}

impl managed::Manager for Manager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, Self::Error> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(&self, conn: &mut MultiplexedConnection, _: &Metrics) -> managed::RecycleResult<Self::Error> {
        let ping_number = self.ping_number.fetch_add(1, Ordering::Relaxed).to_string();

        let (pong,) = redis::Pipeline::with_capacity(2)
            .cmd("UNWATCH")
            .ignore()
            .cmd("PING")
            .arg(&ping_number)
            .query_async::<(String,)>(conn)
            .await?;

        if pong == ping_number {
            Ok(())
        } else {
            Err(managed::RecycleError::message("Invalid PING response"))
        }
    }
}

fn read_file(path: &Path, what: &'static str) -> RedisResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| RedisError::from((ErrorKind::IoError, what, format!("{}: {e}", path.display()))))
}

/// Certificates for `rediss://` URLs. With `insecure`, only a CA bundle is
/// loaded (when one is given) so self-signed servers can be reached.
fn load_certificates(config: &RedisTlsConfig) -> RedisResult<TlsCertificates> {
    let root_cert = match &config.ca_cert {
        Some(path) => Some(read_file(path, "Failed to read CA certificate")?),
        None => None,
    };

    if config.insecure {
        return Ok(TlsCertificates {
            client_tls: None,
            root_cert,
        });
    }

    let client_tls = match (&config.client_cert, &config.client_key) {
        (Some(cert), Some(key)) => Some(ClientTlsConfig {
            client_cert: read_file(cert, "Failed to read client certificate")?,
            client_key: read_file(key, "Failed to read client key")?,
        }),
        (None, None) => None,
        _ => {
            return Err(RedisError::from((
                ErrorKind::InvalidClientConfig,
                "Mutual TLS needs both client_cert and client_key",
            )));
        }
    };

    Ok(TlsCertificates { client_tls, root_cert })
}

/// Create a Redis connection pool from configuration.
pub(super) fn create_pool(config: &RedisConfig) -> RedisResult<Pool> {
    let mut pool_config = PoolConfig::new(config.pool.max_connections);

    pool_config.timeouts.create = Some(config.pool.connect_timeout);
    pool_config.timeouts.wait = Some(config.pool.wait_timeout);
    pool_config.timeouts.recycle = Some(config.pool.recycle_timeout);

    Pool::builder(Manager::new(config)?)
        .config(pool_config)
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| RedisError::from((ErrorKind::IoError, "Failed to create pool", e.to_string())))
}
