//! FareInn API Gateway
//!
//! The HTTP surface for accounts, listings, bookings, reviews and the
//! support chat.
//! Handles:
//! - Session resolution
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    handler::Handler,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use fareinn_common::{
    auth::SessionResolver,
    config::{AppConfig, ObservabilityConfig, StoreBackend},
    db::{DataStore, DbPool, MemoryStore, Repository},
    metrics::{self, LATENCY_BUCKETS},
    Services,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use middleware::rate_limit::{create_rate_limiter, rate_limit_middleware, GlobalRateLimiter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Services,
    pub sessions: SessionResolver,
    pub chat_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, services: Services) -> Self {
        let sessions = SessionResolver::new(
            services.identity.clone(),
            config.identity.jwt_secret.as_deref(),
        );
        let chat_limiter = config.rate_limit.enabled.then(|| {
            create_rate_limiter(config.rate_limit.requests_per_second, config.rate_limit.burst)
        });

        Self {
            config,
            services,
            sessions,
            chat_limiter,
        }
    }
}

impl FromRef<AppState> for SessionResolver {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    init_logging(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting FareInn API Gateway v{}",
        fareinn_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        init_metrics_exporter(SocketAddr::from((
            [0, 0, 0, 0],
            config.observability.metrics_port,
        )))?;
    }
    metrics::register_metrics();

    let store = build_store(&config).await?;
    let services = Services::from_config(&config, store)?;

    let config = Arc::new(config);
    let state = AppState::new(config.clone(), services);

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_logging(config: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

/// Starts the Prometheus exporter's own HTTP listener
fn init_metrics_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(LATENCY_BUCKETS)?
        .install()?;

    info!(metrics_addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DataStore>> {
    match config.database.backend {
        StoreBackend::Postgres => {
            info!("Connecting to database...");
            let pool = DbPool::new(&config.database).await?;
            if config.database.run_migrations {
                pool.migrate().await?;
            }
            Ok(Arc::new(Repository::new(pool)))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory data store, nothing will be persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Chat is the only route that costs money upstream
    let chat_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware));

    // Listing images are the only large uploads
    let upload_limit = DefaultBodyLimit::max(state.config.server.max_upload_bytes);

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Account endpoints
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))

        // Property endpoints
        .route(
            "/properties",
            get(handlers::properties::list_properties)
                .post(handlers::properties::create_listing.layer(upload_limit)),
        )
        .route("/properties/{id}", get(handlers::properties::get_property))
        .route("/properties/{id}/quote", get(handlers::properties::quote))
        .route(
            "/properties/{id}/reviews",
            get(handlers::reviews::list_reviews).post(handlers::reviews::create_review),
        )

        // Booking endpoints
        .route(
            "/bookings",
            get(handlers::bookings::my_bookings).post(handlers::bookings::create_booking),
        )
        .route("/bookings/{id}", get(handlers::bookings::get_confirmation))
        .route("/payment-methods", get(handlers::payment_methods::list_payment_methods))

        .route("/dashboard", get(handlers::dashboard::dashboard))
        .merge(chat_routes);

    // Compose the app
    Router::new()
        .nest("/api/v1", api_routes)
        .layer(from_fn(middleware::metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    /// Router over in-memory backends, plus the store for failure injection
    pub fn app() -> (Router, Arc<MemoryStore>) {
        app_with(AppConfig::in_memory())
    }

    pub fn app_with(config: AppConfig) -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let services = Services::from_config(&config, store.clone()).expect("in-memory services");
        let state = AppState::new(Arc::new(config), services);
        (create_router(state), store)
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (content_type, bytes) = match body {
            Some(json) => (Some("application/json".to_string()), json.to_string().into_bytes()),
            None => (None, Vec::new()),
        };
        send_bytes(app, method, uri, token, content_type, bytes).await
    }

    pub async fn send_bytes(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        content_type: Option<String>,
        body: Vec<u8>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        let request = request.body(Body::from(body)).unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    const BOUNDARY: &str = "fareinn-test-boundary";

    /// Encode text fields and an optional `image` file as multipart/form-data
    pub fn multipart(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> (String, Vec<u8>) {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                    BOUNDARY, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        (format!("multipart/form-data; boundary={}", BOUNDARY), body)
    }

    /// Publish a listing at `address` as the given tenant and return its id
    pub async fn listed(app: &Router, token: &str, address: &str, price: &str) -> i64 {
        let (content_type, body) = multipart(
            &[
                ("address", address),
                ("bedrooms", "2"),
                ("bathrooms", "1"),
                ("area_sqft", "850"),
                ("price_per_night", price),
            ],
            Some(("front.png", &b"png-bytes"[..])),
        );
        let (status, json) =
            send_bytes(app, "POST", "/api/v1/properties", Some(token), Some(content_type), body)
                .await;
        assert_eq!(status, StatusCode::CREATED, "{}", json);
        json["property"]["id"].as_i64().unwrap()
    }

    /// Sign up a tenant and return its access token
    pub async fn signed_up(app: &Router, n: u32) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/auth/signup",
            None,
            Some(serde_json::json!({
                "name": format!("Tenant {}", n),
                "email": format!("tenant{}@example.com", n),
                "phone": format!("555-02{:02}", n),
                "address": format!("{} Test Lane", n),
                "date_of_birth": "1990-01-01",
                "verification_id": format!("ID-{}", n),
                "password": "secret1",
                "confirm_password": "secret1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["access_token"].as_str().unwrap().to_string()
    }
}
