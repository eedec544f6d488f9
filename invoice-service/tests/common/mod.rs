//! Test helper module for invoice-service integration tests.
//!
//! Provides common setup utilities for PostgreSQL-based tests. Each test runs
//! against its own schema for isolation. When `TEST_DATABASE_URL` is not set
//! the integration tests skip themselves.

#![allow(dead_code)]

use invoice_service::config::{DatabaseConfig, InvoiceConfig};
use invoice_service::services::init_metrics;
use invoice_service::startup::Application;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use std::sync::atomic::{AtomicU32, Ordering};

// Counter for unique schema names
static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Database URL for testing, when one is configured.
pub fn get_test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok().filter(|v| !v.is_empty())
}

/// Generate a unique schema name for test isolation.
fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_invoices_{}_{}", std::process::id(), counter)
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
    base_url: String,
    schema_name: String,
}

impl TestApp {
    /// Spawn a new test application on a random port, or `None` when no test
    /// database is configured (the caller should skip the test).
    pub async fn spawn() -> Option<Self> {
        let base_url = get_test_database_url()?;

        init_metrics();

        let schema_name = unique_schema_name();

        // Create schema for test isolation
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&base_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
            .execute(&pool)
            .await
            .ok();
        sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
            .execute(&pool)
            .await
            .expect("Failed to create test schema");

        pool.close().await;

        // Point the application at the fresh schema.
        // Use ? or & depending on whether URL already has query parameters
        let separator = if base_url.contains('?') { "&" } else { "?" };
        let db_url_with_schema = format!(
            "{}{}options=-c search_path%3D{}",
            base_url, separator, schema_name
        );

        let config = InvoiceConfig {
            common: CoreConfig { port: 0 }, // Random port
            service_name: "invoice-service-test".to_string(),
            service_version: "0.1.0".to_string(),
            log_level: "warn".to_string(),
            database: DatabaseConfig {
                url: db_url_with_schema,
                max_connections: 5,
                min_connections: 1,
            },
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the HTTP server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("http://127.0.0.1:{}/health", port);
        for _ in 0..50 {
            if let Ok(resp) = client.get(&health_url).send().await {
                if resp.status().is_success() {
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        Some(Self {
            address: format!("http://127.0.0.1:{}", port),
            port,
            client,
            base_url,
            schema_name,
        })
    }

    /// Drop the schema created for this test.
    pub async fn cleanup(&self) {
        if let Ok(pool) = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.base_url)
            .await
        {
            sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema_name))
                .execute(&pool)
                .await
                .ok();
            pool.close().await;
        }
    }

    /// POST an invoice payload, returning the raw response.
    pub async fn post_invoice(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}/invoices", self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to send create invoice request")
    }

    /// Create an invoice and return its parsed response body.
    pub async fn create_invoice(&self, body: &Value) -> Value {
        let resp = self.post_invoice(body).await;
        assert_eq!(resp.status().as_u16(), 201, "invoice create should succeed");
        resp.json().await.expect("Invalid invoice response body")
    }

    pub async fn get_json(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to send GET request");
        let status = resp.status().as_u16();
        let body = resp.json().await.unwrap_or(Value::Null);
        (status, body)
    }
}

/// A well-formed invoice payload with one "Widget" line.
pub fn widget_invoice(invoice_number: &str) -> Value {
    json!({
        "invoice_number": invoice_number,
        "client_name": "Acme",
        "client_email": "a@acme.com",
        "due_date": "2025-01-01",
        "details": [
            {"description": "Widget", "quantity": 2, "unit_price": "10.00"}
        ]
    })
}
