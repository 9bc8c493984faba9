#![allow(dead_code)]

use platform_service::config::{
    Environment, PlatformConfig, RateLimitConfig, SecurityConfig, StorageBackend, StorageConfig,
};
use platform_service::services::init_metrics;
use platform_service::Application;
use serde_json::{json, Value};

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
}

pub fn test_config() -> PlatformConfig {
    PlatformConfig {
        common: service_core::config::Config { port: 0 }, // Random port
        environment: Environment::Dev,
        service_name: "platform-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            mongodb: None,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: PlatformConfig) -> Self {
        init_metrics();

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build HTTP client");

        // Wait for the server by polling the health endpoint
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn apply_url(&self) -> String {
        self.url("/api/v1/apply/")
    }

    pub async fn create_application(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(self.apply_url())
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Submit a valid application and return its JSON representation.
    pub async fn submit(&self, full_name: &str, email: &str) -> Value {
        let response = self
            .create_application(&json!({ "full_name": full_name, "email": email }))
            .await;
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.expect("Failed to parse JSON")
    }
}
