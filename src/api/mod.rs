use crate::{
    auth::{AuthConfig, AuthService, CredentialStore, OAuthProvider, TokenCodec},
    cli::telemetry,
    email::EmailSender,
    store::PgStore,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;

pub mod handlers;

use handlers::{AuthState, activation, auth, google, health, password_reset};

/// Auth routes with their shared state attached.
#[must_use]
pub fn router(auth_state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/google/authorize", get(google::authorize))
        .route("/auth/google/callback", get(google::callback))
        .route("/auth/activation", post(activation::send))
        .route("/auth/activation/confirm", post(activation::confirm))
        .route("/auth/password-reset", post(password_reset::request))
        .route("/auth/password-reset/verify", post(password_reset::verify))
        .route("/auth/password-reset/confirm", post(password_reset::confirm))
        .layer(Extension(auth_state))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
#[allow(clippy::too_many_arguments)]
pub async fn new(
    port: u16,
    dsn: String,
    frontend_origin: &str,
    auth_config: AuthConfig,
    codec: TokenCodec,
    credentials: CredentialStore,
    mailer: Arc<dyn EmailSender>,
    provider: Arc<dyn OAuthProvider>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let service = AuthService::new(
        auth_config,
        codec,
        credentials,
        store,
        mailer,
        provider,
    );

    let origin = normalize_origin(frontend_origin)?;
    let auth_state = Arc::new(AuthState::new(
        service,
        origin.to_str().context("Invalid frontend origin")?.to_string(),
    ));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    let app = router(auth_state)
        .route("/health", get(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    telemetry::shutdown_tracer();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// Reduce a frontend URL to its `scheme://host[:port]` origin.
fn normalize_origin(frontend_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_url)
        .with_context(|| format!("Invalid frontend origin: {frontend_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Frontend origin must include a valid host: {frontend_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
