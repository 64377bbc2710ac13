//! Shared harness for router-level tests: the full router over an in-memory
//! store, a scripted upstream and a manual clock.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use poshan_api::{create_router, issue_token, ApiConfig, AppState, AuthConfig, JwtSecret};
use poshan_core::{Identity, InMemoryProductStore};
use poshan_test_utils::{ManualClock, ScriptedProductSource};
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "poshan-router-tests-secret-0123456789";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryProductStore>,
    pub source: Arc<ScriptedProductSource>,
    pub clock: Arc<ManualClock>,
    pub auth_config: AuthConfig,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub fn test_app(api_config: ApiConfig, source: ScriptedProductSource) -> Result<TestApp, String> {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(InMemoryProductStore::new());
    let source = Arc::new(source);
    let auth_config = AuthConfig {
        jwt_secret: JwtSecret::new(TEST_SECRET.to_string()).map_err(|e| e.to_string())?,
        ..AuthConfig::default()
    }
    .with_clock(clock.clone());

    let state = AppState::new(
        api_config,
        auth_config.clone(),
        store.clone(),
        source.clone(),
        clock.clone(),
    )
    .map_err(|e| e.to_string())?;
    let router = create_router(state).map_err(|e| e.to_string())?;

    Ok(TestApp {
        router,
        store,
        source,
        clock,
        auth_config,
    })
}

/// Config with throttling off, for tests about resolution only.
pub fn unthrottled() -> ApiConfig {
    ApiConfig {
        throttle_enabled: false,
        ..ApiConfig::default()
    }
}

impl TestApp {
    pub fn bearer(&self, subject: &str) -> Result<String, String> {
        let identity = Identity::new(subject, format!("{}@example.in", subject))
            .ok_or_else(|| "blank identity".to_string())?;
        let token = issue_token(&self.auth_config, &identity).map_err(|e| e.to_string())?;
        Ok(format!("Bearer {}", token))
    }

    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Result<TestResponse, String> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).map_err(|e| e.to_string())?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .map_err(|e| e.to_string())?;
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(TestResponse {
            status,
            headers,
            body,
        })
    }
}
