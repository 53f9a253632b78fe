//! Test server harness for end-to-end testing.
//!
//! Provides `TestHubServer` for spawning a real hub behind a real HTTP
//! listener, so tests can connect actual WebSocket clients.

use hub_service::actors::{ConnectionSettings, HubHandle, HubSettings};
use hub_service::config::Config;
use hub_service::identity::{HeaderIdentityResolver, IdentityResolver};
use hub_service::observability::HealthState;
use hub_service::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::mock_membership::MockMembershipStore;

/// Header the harness trusts for connection identity.
pub const TEST_IDENTITY_HEADER: &str = "x-user-id";

/// Running hub server bound to a random local port.
///
/// # Example
/// ```rust,ignore
/// let store = MockMembershipStore::new().with_room("g1", &["alice"]);
/// let server = TestHubServer::spawn(store).await?;
///
/// let mut request = server.ws_url().into_client_request()?;
/// request.headers_mut().insert("x-user-id", "alice".parse()?);
/// let (socket, _) = tokio_tungstenite::connect_async(request).await?;
/// ```
pub struct TestHubServer {
    addr: SocketAddr,
    hub: HubHandle,
    health: Arc<HealthState>,
    cancel_token: CancellationToken,
    _server: JoinHandle<()>,
}

impl TestHubServer {
    /// Spawn with keepalive disabled and default buffers.
    pub async fn spawn(store: MockMembershipStore) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(store, HashMap::new()).await
    }

    /// Spawn with extra `HUB_*` configuration variables.
    pub async fn spawn_with_vars(
        store: MockMembershipStore,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            (
                "POSTGRES_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("HUB_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("HUB_PING_INTERVAL_SECONDS".to_string(), "0".to_string()),
            ("HUB_IDLE_TIMEOUT_SECONDS".to_string(), "0".to_string()),
            (
                "HUB_IDENTITY_HEADER".to_string(),
                TEST_IDENTITY_HEADER.to_string(),
            ),
        ]);
        vars.extend(overrides);

        let config =
            Config::from_vars(&vars).map_err(|e| anyhow::anyhow!("Failed to create config: {e}"))?;

        let identity: Arc<dyn IdentityResolver> = Arc::new(
            HeaderIdentityResolver::new(&config.identity_header)
                .map_err(|e| anyhow::anyhow!("Invalid identity header: {e}"))?,
        );

        Self::spawn_with_identity(store, &config, identity).await
    }

    /// Spawn with a custom identity resolver.
    pub async fn spawn_with_identity(
        store: MockMembershipStore,
        config: &Config,
        identity: Arc<dyn IdentityResolver>,
    ) -> Result<Self, anyhow::Error> {
        let cancel_token = CancellationToken::new();

        let (hub, _hub_task) = HubHandle::spawn(
            HubSettings {
                command_buffer: config.command_buffer,
                membership_timeout: config.membership_timeout(),
            },
            store.shared(),
            cancel_token.child_token(),
        );

        let state = Arc::new(AppState {
            hub: hub.clone(),
            identity,
            connection_settings: ConnectionSettings {
                outbound_buffer: config.outbound_buffer,
                ping_interval: config.ping_interval(),
                idle_timeout: config.idle_timeout(),
                write_timeout: config.write_timeout(),
            },
            max_message_bytes: config.max_message_bytes,
        });

        // A recorder per server; not installed globally so servers can coexist
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let health = Arc::new(HealthState::new(hub.clone()));
        health.set_ready();

        let app = routes::build_routes(state, Arc::clone(&health), metrics_handle);

        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {e}"))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {e}"))?;

        let server_token = cancel_token.child_token();
        let server = tokio::spawn(async move {
            let shutdown = async move { server_token.cancelled().await };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                eprintln!("Test server error: {e}");
            }
        });

        Ok(Self {
            addr,
            hub,
            health,
            cancel_token,
            _server: server,
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base HTTP URL, e.g. `http://127.0.0.1:54321`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket acceptor URL.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Handle to the server's hub, for in-process producers and status.
    #[must_use]
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    #[must_use]
    pub fn health(&self) -> &HealthState {
        &self.health
    }

    /// Wait until the hub reports `count` live connections.
    pub async fn wait_for_connections(&self, count: usize) -> Result<(), anyhow::Error> {
        for _ in 0..200 {
            if self.hub.live_connections().await?.len() == count {
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        Err(anyhow::anyhow!("hub never reached {count} connections"))
    }

    /// Stop the hub and the HTTP server.
    pub fn shutdown(&self) {
        self.health.set_not_ready();
        self.cancel_token.cancel();
    }
}

impl Drop for TestHubServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
