use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use userauth::{build_router, AppConfig, AppState, InMemoryUsersRepository};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub repository: Arc<InMemoryUsersRepository>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}

impl TestApp {
    pub fn new() -> Self {
        let vars: HashMap<String, String> = [
            ("APP_NAME", "userauth-it"),
            ("APP_VERSION", "9.9.9"),
            ("JWT_SECRET_KEY", "integration-secret"),
            ("JWT_ADMIN_KEY", "integration-admin-key"),
            ("BCRYPT_COST", "4"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = AppConfig::from_vars(vars).expect("test config should be valid");
        let repository = Arc::new(InMemoryUsersRepository::new());
        let state = AppState::new(Arc::new(config), repository.clone());

        Self {
            router: build_router(state),
            repository,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        TestResponse { status, body }
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, None, Some(body)).await
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, bearer, None).await
    }

    /// Signs up a customer and returns the passport payload
    pub async fn signup(&self, email: &str, username: &str, password: &str) -> Value {
        let response = self
            .post(
                "/users/signup",
                serde_json::json!({
                    "email": email,
                    "username": username,
                    "password": password,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.data().clone()
    }

    pub async fn signup_admin(&self, email: &str, username: &str, password: &str) -> Value {
        let response = self
            .post(
                "/users/signup-admin",
                serde_json::json!({
                    "email": email,
                    "username": username,
                    "password": password,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.data().clone()
    }
}

pub fn field<'a>(passport: &'a Value, path: &[&str]) -> &'a str {
    let mut value = passport;
    for key in path {
        value = &value[*key];
    }
    value.as_str().unwrap_or_default()
}
