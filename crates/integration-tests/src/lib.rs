//! Integration test harness for the Spoke Cycles storefront.
//!
//! Each test starts two servers on ephemeral ports:
//!
//! - a [`FakeBackend`] answering the REST backend endpoints with canned
//!   replies and recording what it was sent
//! - the real storefront application, configured to talk to the fake
//!
//! and drives the storefront over HTTP with a cookie-keeping `reqwest`
//! client, so session state carries across requests like in a browser.
//!
//! # Example
//!
//! ```rust,ignore
//! let app = TestApp::spawn(FakeBackend::default()).await;
//! let resp = app.get("/health").await;
//! assert_eq!(resp.status(), 200);
//! ```

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde_json::{Value, json};
use spoke_core::Clock;
use spoke_storefront::config::{BackendConfig, CheckoutConfig, MiniGameConfig, StorefrontConfig};
use spoke_storefront::state::AppState;
use url::Url;

/// A canned backend reply.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    #[must_use]
    pub const fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    #[must_use]
    pub fn status(status: u16, message: &str) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            body: json!({ "message": message }),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// In-process stand-in for the REST backend.
pub struct FakeBackend {
    pub discount: Mutex<Reply>,
    /// Per-email discount replies, sent after the given delay.
    pub discount_for: Mutex<HashMap<String, (Duration, Reply)>>,
    pub shipping: Mutex<Reply>,
    pub shipping_delay: Mutex<Duration>,
    pub wheel: Mutex<Value>,
    /// Spin replies, served in order; a 500 once exhausted.
    pub spins: Mutex<VecDeque<Reply>>,
    pub discount_queries: Mutex<Vec<HashMap<String, String>>>,
    pub shipping_requests: Mutex<Vec<Value>>,
    pub orders: Mutex<Vec<Value>>,
    pub wheel_calls: AtomicUsize,
    pub spin_calls: AtomicUsize,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            discount: Mutex::new(Reply::status(404, "Customer not found")),
            discount_for: Mutex::new(HashMap::new()),
            shipping: Mutex::new(Reply::ok(shipping_quote("free_delivery", 0))),
            shipping_delay: Mutex::new(Duration::ZERO),
            wheel: Mutex::new(wheel_config()),
            spins: Mutex::new(VecDeque::new()),
            discount_queries: Mutex::new(Vec::new()),
            shipping_requests: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            wheel_calls: AtomicUsize::new(0),
            spin_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeBackend {
    #[must_use]
    pub fn with_discount(self, reply: Reply) -> Self {
        *self.discount.lock().unwrap() = reply;
        self
    }

    /// Answer lookups for `email` with `reply`, `delay` after they arrive.
    #[must_use]
    pub fn with_discount_for(self, email: &str, delay: Duration, reply: Reply) -> Self {
        self.discount_for
            .lock()
            .unwrap()
            .insert(email.to_string(), (delay, reply));
        self
    }

    #[must_use]
    pub fn with_shipping_delay(self, delay: Duration) -> Self {
        *self.shipping_delay.lock().unwrap() = delay;
        self
    }

    #[must_use]
    pub fn with_shipping(self, reply: Reply) -> Self {
        *self.shipping.lock().unwrap() = reply;
        self
    }

    #[must_use]
    pub fn with_spins(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.spins.lock().unwrap().extend(replies);
        self
    }

    fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/api/customers/checkDiscount", get(check_discount))
            .route("/api/shipping/calculate", post(calculate_shipping))
            .route("/api/orders", post(create_order))
            .route("/api/miniGame/wheelConfig", get(wheel_config_handler))
            .route("/api/miniGame/spinWheel", post(spin_wheel))
            .with_state(self)
    }
}

async fn check_discount(
    State(backend): State<Arc<FakeBackend>>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    let scripted = query
        .get("email")
        .and_then(|email| backend.discount_for.lock().unwrap().get(email).cloned());
    backend.discount_queries.lock().unwrap().push(query);

    if let Some((delay, reply)) = scripted {
        tokio::time::sleep(delay).await;
        return reply;
    }
    backend.discount.lock().unwrap().clone()
}

async fn calculate_shipping(
    State(backend): State<Arc<FakeBackend>>,
    Json(body): Json<Value>,
) -> Reply {
    backend.shipping_requests.lock().unwrap().push(body);
    let delay = *backend.shipping_delay.lock().unwrap();
    tokio::time::sleep(delay).await;
    backend.shipping.lock().unwrap().clone()
}

async fn create_order(State(backend): State<Arc<FakeBackend>>, Json(body): Json<Value>) -> Reply {
    let mut orders = backend.orders.lock().unwrap();
    orders.push(body);
    Reply::ok(json!({
        "orderNumber": format!("SC-{:04}", orders.len()),
        "_id": format!("ord-{}", orders.len()),
    }))
}

async fn wheel_config_handler(State(backend): State<Arc<FakeBackend>>) -> Reply {
    backend.wheel_calls.fetch_add(1, Ordering::SeqCst);
    Reply::ok(backend.wheel.lock().unwrap().clone())
}

async fn spin_wheel(State(backend): State<Arc<FakeBackend>>) -> Reply {
    backend.spin_calls.fetch_add(1, Ordering::SeqCst);
    backend
        .spins
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Reply::status(500, "no spin scripted"))
}

/// Backend shipping estimate body.
#[must_use]
pub fn shipping_quote(method: &str, fee: i64) -> Value {
    json!({
        "distanceKm": 18.5,
        "fee": fee,
        "method": method,
        "description": "Estimated from postal code",
    })
}

/// Backend loyalty discount body.
#[must_use]
pub fn loyalty_discount(percent: u32) -> Value {
    json!({
        "isNewCustomer": false,
        "discount": percent,
        "tier": "gold",
        "tierName": "Gold rider",
        "message": "Thanks for riding with us",
    })
}

/// Four-segment wheel used by default.
#[must_use]
pub fn wheel_config() -> Value {
    json!({
        "prizes": [
            { "id": "p-10", "name": "10% off", "nameVi": "Giảm 10%", "type": "discount", "discount": 10 },
            { "id": "p-ship", "name": "Free shipping", "nameVi": "Miễn phí vận chuyển", "type": "freeship" },
            { "id": "p-gift", "name": "Bottle cage", "nameVi": "Giá để bình", "type": "gift" },
            { "id": "p-none", "name": "Better luck tomorrow", "nameVi": "Chúc may mắn lần sau", "type": "none" },
        ]
    })
}

/// Backend spin result body; the coupon is attached whatever the prize type.
#[must_use]
pub fn spin_result(prize_id: &str, prize_type: &str) -> Value {
    json!({
        "prize": { "id": prize_id, "name": prize_id, "type": prize_type },
        "coupon": {
            "code": "SPIN-7Q2X",
            "validUntil": "2026-10-24T00:00:00Z",
            "description": "Valid for one week",
        },
        "message": "The wheel has spoken",
    })
}

/// A clock the test can move forward.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<NaiveDate>>);

impl ManualClock {
    #[must_use]
    pub fn new(today: NaiveDate) -> Self {
        Self(Arc::new(Mutex::new(today)))
    }

    pub fn set(&self, today: NaiveDate) {
        *self.0.lock().unwrap() = today;
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.0.lock().unwrap()
    }
}

/// Settings for one storefront instance.
pub struct TestOptions {
    pub clock: Arc<dyn Clock>,
    pub reveal_delay: Duration,
    pub loyalty_debounce: Duration,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(ManualClock::new(
                NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            )),
            reveal_delay: Duration::from_millis(20),
            loyalty_debounce: Duration::from_millis(50),
        }
    }
}

/// A running storefront wired to a [`FakeBackend`].
pub struct TestApp {
    pub url: String,
    pub backend_url: String,
    pub client: reqwest::Client,
    pub backend: Arc<FakeBackend>,
}

impl TestApp {
    /// Start with default options.
    pub async fn spawn(backend: FakeBackend) -> Self {
        Self::spawn_with(backend, TestOptions::default()).await
    }

    /// Start with custom options.
    pub async fn spawn_with(backend: FakeBackend, options: TestOptions) -> Self {
        let backend = Arc::new(backend);
        let backend_addr = serve(Arc::clone(&backend).router()).await;
        let backend_url = format!("http://{backend_addr}/api/");

        let config = StorefrontConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            base_url: "http://127.0.0.1".to_string(),
            backend: BackendConfig {
                base_url: Url::parse(&backend_url).unwrap(),
                api_key: None,
                timeout: Duration::from_secs(5),
            },
            checkout: CheckoutConfig {
                loyalty_debounce: options.loyalty_debounce,
            },
            mini_game: MiniGameConfig {
                reveal_delay: options.reveal_delay,
                ..MiniGameConfig::default()
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 0.0,
            sentry_traces_sample_rate: 0.0,
        };

        let state = AppState::new(config, options.clock).unwrap();
        let app_addr = serve(spoke_storefront::app(state)).await;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            url: format!("http://{app_addr}"),
            backend_url,
            client,
            backend,
        }
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.url))
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.url))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .put(format!("{}{path}", self.url))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// `GET /api/checkout` as JSON.
    pub async fn checkout_view(&self) -> Value {
        let resp = self.get("/api/checkout").await;
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}
