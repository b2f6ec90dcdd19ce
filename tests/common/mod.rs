//! Shared harness for integration tests.
//!
//! Boots a full server on an ephemeral port with a platform operator, one
//! tenant (`acme`) and an admin plus an agent inside it.

#![allow(dead_code)]

use crm_sdk::CrmClient;
use crm_server::config::{shared, BootstrapConfig, CrmConfig};
use crm_server::lifecycle::build_crm;
use crm_server::{Crm, HttpServer, Shutdown};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const OPERATOR_EMAIL: &str = "ops@platform.test";
pub const PASSWORD: &str = "correct-horse-battery";
pub const ADMIN_KEY: &str = "test-admin-key";

pub struct TestServer {
    pub base_url: String,
    pub ws_url: String,
    pub crm: Crm,
    pub shutdown: Shutdown,
    _dir: TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn test_config(dir: &TempDir) -> CrmConfig {
    let mut config = CrmConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.rate_limit.enabled = false;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.into();
    config.storage.attachments_dir = dir.path().join("attachments").display().to_string();
    config.storage.snapshot_path = Some(dir.path().join("crm.json").display().to_string());
    config.auth.bootstrap = Some(BootstrapConfig {
        email: OPERATOR_EMAIL.into(),
        password: PASSWORD.into(),
        name: "Operator".into(),
    });
    config
}

pub async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

/// Start a server after letting the caller tweak the config.
pub async fn start_server_with(tweak: impl FnOnce(&mut CrmConfig)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    tweak(&mut config);

    let crm = build_crm(shared(config)).unwrap();
    let shutdown = Shutdown::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(crm.clone(), shutdown.clone());
    let (_, updates) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        server.run(listener, updates).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/api/v1/ws"),
        crm,
        shutdown,
        _dir: dir,
    }
}

impl TestServer {
    pub fn client(&self) -> CrmClient {
        CrmClient::new(&self.base_url)
    }

    pub async fn login(&self, tenant: &str, email: &str) -> CrmClient {
        let mut client = self.client();
        client.login(tenant, email, PASSWORD).await.unwrap();
        client
    }

    pub async fn operator(&self) -> CrmClient {
        self.login("platform", OPERATOR_EMAIL).await
    }

    /// Create a tenant through the API and return its admin's client.
    pub async fn tenant(&self, slug: &str) -> CrmClient {
        let operator = self.operator().await;
        let admin_email = format!("admin@{slug}.test");
        operator
            .create_tenant(&json!({
                "name": slug.to_uppercase(),
                "slug": slug,
                "admin": { "email": admin_email, "name": "Admin", "password": PASSWORD },
            }))
            .await
            .unwrap();
        self.login(slug, &admin_email).await
    }

    /// Create a user in `admin`'s tenant and log them in.
    pub async fn user(&self, admin: &CrmClient, slug: &str, name: &str, role: &str) -> (CrmClient, Value) {
        let email = format!("{name}@{slug}.test");
        let user = admin
            .create_user(&json!({
                "email": email,
                "name": name,
                "role": role,
                "password": PASSWORD,
            }))
            .await
            .unwrap();
        (self.login(slug, &email).await, user)
    }
}
