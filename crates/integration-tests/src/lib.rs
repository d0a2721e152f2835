//! End-to-end tests for the CraveCart API.
//!
//! The full router runs in-process on top of the in-memory store, so the
//! tests need no database or network. The payment gateway is replaced by a
//! [`ScriptedGateway`] whose answers the test controls.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cravecart-integration-tests
//! ```

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

use cravecart_core::{Email, Role};
use cravecart_server::config::{ServerConfig, StorageConfig};
use cravecart_server::db::{MemoryStore, UserRepository};
use cravecart_server::models::NewUser;
use cravecart_server::services::auth::hash_password;
use cravecart_server::services::payment::{
    CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway,
};
use cravecart_server::state::AppState;

/// Payment gateway double.
///
/// Records every checkout request and answers with a fake hosted page, or
/// with a rejection while [`ScriptedGateway::fail_next`] is set. Sessions
/// count as paid only after [`ScriptedGateway::complete_payment`].
#[derive(Default)]
pub struct ScriptedGateway {
    failing: AtomicBool,
    requests: Mutex<Vec<CheckoutRequest>>,
    paid: Mutex<HashSet<String>>,
}

impl ScriptedGateway {
    /// Make calls fail until [`ScriptedGateway::recover`].
    pub fn fail_next(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    /// Mark the order's checkout session as paid, as if the customer
    /// finished the hosted page.
    pub fn complete_payment(&self, order_id: i64) {
        if let Ok(mut paid) = self.paid.lock() {
            paid.insert(format!("cs_test_{order_id}"));
        }
    }

    /// Checkout requests seen so far.
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Rejected {
                status: 503,
                message: "gateway unavailable".to_string(),
            });
        }
        Ok(CheckoutSession {
            id: format!("cs_test_{}", request.order_id),
            url: format!("https://checkout.test/pay/{}", request.order_id),
        })
    }

    async fn session_paid(&self, session_id: &str) -> Result<bool, PaymentError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Rejected {
                status: 503,
                message: "gateway unavailable".to_string(),
            });
        }
        Ok(self
            .paid
            .lock()
            .map(|paid| paid.contains(session_id))
            .unwrap_or(false))
    }
}

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    /// The envelope's `data` field.
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    /// The error envelope's `code` field.
    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}

/// The API wired to an in-memory store.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<ScriptedGateway>,
}

/// Configuration for tests: in-memory storage, no rate limits, no Sentry.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        storage: StorageConfig::Memory,
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 0,
        client_url: Url::parse("http://localhost:5173").expect("valid client url"),
        jwt_secret: SecretString::from("t9$Kq2!vLm#8Zr@4Xw^6Jp&1Nc*5Hb(7"),
        jwt_ttl: Duration::from_secs(3600),
        payment: None,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

impl TestApp {
    /// App with card payments going to a [`ScriptedGateway`].
    pub fn new() -> Self {
        let gateway = Arc::new(ScriptedGateway::default());
        Self::build(Some(gateway.clone()), gateway)
    }

    /// App with card payments disabled.
    pub fn without_payments() -> Self {
        Self::build(None, Arc::new(ScriptedGateway::default()))
    }

    fn build(payments: Option<Arc<ScriptedGateway>>, gateway: Arc<ScriptedGateway>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(
            test_config(),
            store.clone(),
            payments.map(|g| g as Arc<dyn PaymentGateway>),
        );
        let router = cravecart_server::app(state.clone(), false);
        Self {
            router,
            state,
            store,
            gateway,
        }
    }

    /// Send a request and decode the JSON body (`Null` when empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Register a customer and return their token.
    pub async fn customer(&self, email: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/user/register",
                None,
                Some(json!({
                    "email": email,
                    "name": "Test Customer",
                    "password": "Hungry123",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.data()["token"]
            .as_str()
            .expect("token in registration response")
            .to_string()
    }

    /// Create an admin directly in the store and return their token.
    pub async fn admin(&self) -> String {
        let user = self
            .store
            .create_user(&NewUser {
                email: Email::parse("admin@cravecart.test").expect("valid email"),
                name: "Admin".to_string(),
                role: Role::Admin,
                password_hash: hash_password("Admin1234").expect("hash"),
            })
            .await
            .expect("Failed to create admin");
        self.state.tokens().issue(&user).expect("Failed to issue token")
    }

    /// Add a dish as `admin` and return its id.
    pub async fn food(&self, admin: &str, name: &str, price: &str) -> i64 {
        let response = self
            .post(
                "/api/food",
                admin,
                json!({
                    "name": name,
                    "description": format!("{name} from the test kitchen"),
                    "price": price,
                    "category": "Mains",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.data()["id"].as_i64().expect("food id")
    }

    /// Create a promo code as `admin`.
    pub async fn promo(&self, admin: &str, definition: Value) -> Value {
        let response = self.post("/api/promo", admin, definition).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.data().clone()
    }

    pub async fn add_to_cart(&self, token: &str, food_id: i64, quantity: i64) -> TestResponse {
        self.post(
            "/api/cart/add",
            token,
            json!({ "foodId": food_id, "quantity": quantity }),
        )
        .await
    }

    /// Place an order from the stored cart.
    pub async fn place(
        &self,
        token: &str,
        payment_method: &str,
        promo_code: Option<&str>,
    ) -> TestResponse {
        let mut body = json!({
            "address": address(),
            "paymentMethod": payment_method,
        });
        if let Some(code) = promo_code {
            body["promoCode"] = json!(code);
        }
        self.post("/api/order/place", token, body).await
    }

    /// Admin status change.
    pub async fn set_status(&self, admin: &str, order_id: i64, status: &str) -> TestResponse {
        self.put(
            &format!("/api/order/{order_id}/status"),
            admin,
            json!({ "status": status }),
        )
        .await
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// A complete delivery address.
pub fn address() -> Value {
    json!({
        "firstName": "Asha",
        "lastName": "Rao",
        "street": "12 MG Road",
        "city": "Bengaluru",
        "state": "KA",
        "zipCode": "560001",
        "country": "India",
        "phone": "+91 98450 00000",
    })
}

/// Read a money amount (serialized as a decimal string).
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a money value: {other}"),
    }
}

/// Shorthand for a decimal literal.
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("decimal literal")
}
