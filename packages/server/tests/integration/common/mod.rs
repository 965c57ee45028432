use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use common::config::{LocalStorageConfig, StorageAppConfig};
use common::storage::local::LocalStorage;
use reqwest::Client;
use serde_json::Value;
use tempfile::TempDir;

use server::config::{
    AppConfig, AuthConfig, CacheConfig, CorsConfig, DatabaseConfig, QuotaConfig, ServerConfig,
};
use server::services::cache::LruResourceCache;
use server::services::quota::StaticQuota;
use server::state::AppState;

const JWT_SECRET: &str = "test-secret-for-integration-tests";

pub mod routes {
    pub const RESOURCES: &str = "/api/v1/resources";
    pub const TOKEN: &str = "/api/v1/resources/token";
    pub const UPLOAD: &str = "/api/v1/resources/upload";
    pub const FINALIZE: &str = "/api/v1/resources/finalize";
    pub const USAGE: &str = "/api/v1/resources/usage";
    pub const REFERENCES: &str = "/api/v1/resources/references";
    pub const RENDER: &str = "/api/v1/resources/render";
    pub const HEALTH: &str = "/health";

    pub fn resource(id: &str) -> String {
        format!("/api/v1/resources/{id}")
    }
}

/// A running test server backed by in-memory SQLite and a temporary directory.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    _files: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_capacity(1024 * 1024).await
    }

    /// Spawn with every user's plan capped at `capacity` bytes.
    pub async fn spawn_with_capacity(capacity: i64) -> Self {
        let files = TempDir::new().expect("Failed to create temp dir");
        let db_url = "sqlite::memory:".to_string();
        let db = server::database::init_db(&db_url)
            .await
            .expect("Failed to initialize test database");

        let storage_config = StorageAppConfig {
            max_upload_size: 64 * 1024,
            local: LocalStorageConfig {
                root: files.path().to_path_buf(),
                public_url: "/files".into(),
            },
            ..Default::default()
        };
        let storage = LocalStorage::new(
            storage_config.local.root.clone(),
            storage_config.local.public_url.clone(),
            storage_config.max_upload_size,
            storage_config.upload_token_ttl_secs,
        )
        .await
        .expect("Failed to create local storage");

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
            },
            database: DatabaseConfig { url: db_url },
            auth: AuthConfig {
                jwt_secret: JWT_SECRET.to_string(),
            },
            storage: storage_config,
            quota: QuotaConfig {
                default_capacity: capacity,
                overrides: HashMap::new(),
            },
            cache: CacheConfig { capacity: 64 },
        };

        let state = AppState::new(
            app_config,
            db,
            Arc::new(storage),
            Arc::new(LruResourceCache::new(64)),
            Arc::new(StaticQuota::new(capacity, HashMap::new())),
        );
        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            _files: files,
        }
    }

    /// A bearer token for `user_id`.
    pub fn token_for(&self, user_id: i32) -> String {
        self.token_named(user_id, &format!("user{user_id}"))
    }

    /// A bearer token for `user_id` carrying `username` as its subject.
    pub fn token_named(&self, user_id: i32, username: &str) -> String {
        server::utils::jwt::sign(JWT_SECRET, user_id, username).expect("Failed to sign token")
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn put_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PUT request");

        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    pub async fn upload_with_token(
        &self,
        session: &str,
        file_bytes: Vec<u8>,
        token: &str,
    ) -> TestResponse {
        let part = reqwest::multipart::Part::bytes(file_bytes).file_name("upload.bin");
        let form = reqwest::multipart::Form::new()
            .text("session", session.to_string())
            .part("file", part);
        self.upload_form(form, token).await
    }

    pub async fn upload_form(&self, form: reqwest::multipart::Form, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(routes::UPLOAD))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// Request a token for `file_name` and upload `bytes`, returning the resource id.
    pub async fn upload_file(&self, file_name: &str, bytes: &[u8], token: &str) -> String {
        let res = self
            .post_with_token(
                routes::TOKEN,
                &serde_json::json!({ "file_name": file_name }),
                token,
            )
            .await;
        assert_eq!(res.status, 200, "request token failed: {}", res.text);
        let session = res.body["session"]
            .as_str()
            .expect("local token should carry a session")
            .to_string();

        let res = self.upload_with_token(&session, bytes.to_vec(), token).await;
        assert_eq!(res.status, 201, "upload failed: {}", res.text);
        res.id()
    }

    /// Apply a memory edit to the reference sets.
    pub async fn reconcile(
        &self,
        memory_id: &str,
        old_content: &str,
        new_content: &str,
        token: &str,
    ) -> TestResponse {
        self.put_with_token(
            routes::REFERENCES,
            &serde_json::json!({
                "memory_id": memory_id,
                "old_content": old_content,
                "new_content": new_content,
            }),
            token,
        )
        .await
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    pub fn id(&self) -> String {
        self.body["id"]
            .as_str()
            .expect("response body should contain 'id'")
            .to_string()
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}
