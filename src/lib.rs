//! ftpadmin is a provisioning backend for SQL-backed FTP daemons.

#[forbid(unsafe_code)]
#[deny(missing_docs, unused_mut)]
mod membership;
mod router;
mod validate;

pub mod config;
pub mod credential;
pub mod database;
pub mod error;
pub mod group;
pub mod provision;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, header};
use axum::routing::{get, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use crate::database::Database;
use crate::provision::ProvisioningService;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: Database,
    pub provisioner: ProvisioningService,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    DefaultOnResponse::new()
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
        // Set a timeout.
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
        ]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers(Any),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route(
            "/users",
            get(router::users::list).post(router::users::create),
        )
        .route("/users/defaults", get(router::users::defaults))
        // GET takes the login, PATCH/DELETE the row id.
        .route(
            "/users/{id}",
            get(router::users::get)
                .patch(router::users::update)
                .delete(router::users::remove),
        )
        .route(
            "/groups",
            get(router::groups::list).post(router::groups::create),
        )
        .route(
            "/groups/{gid}",
            get(router::groups::get)
                .patch(router::groups::renumber)
                .delete(router::groups::remove),
        )
        .route(
            "/groups/{gid}/members/{login}",
            put(router::groups::add_member)
                .delete(router::groups::remove_member),
        )
        .with_state(state)
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let config = config::Configuration::default().read()?;

    let db = match config.postgres {
        Some(ref postgres) => {
            Database::new(
                &postgres.address,
                &postgres
                    .username
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &postgres
                    .password
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &postgres
                    .database
                    .clone()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME.into()),
                postgres.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
                config.schema.clone(),
                postgres
                    .statement_timeout_secs
                    .unwrap_or(database::DEFAULT_STATEMENT_TIMEOUT_SECS),
            )
            .await?
        },
        None => {
            tracing::error!("missing `postgres` entry on `config.yaml` file");
            std::process::exit(0);
        },
    };

    // the bundled migration creates the default daemon schema; mapped
    // pre-existing schemas skip it.
    if config.postgres.as_ref().is_some_and(|postgres| postgres.migrate) {
        sqlx::migrate!().run(&db.postgres).await?;
    }

    let provisioner =
        ProvisioningService::new(Arc::clone(&config), db.clone())?;

    Ok(AppState {
        config,
        db,
        provisioner,
    })
}
