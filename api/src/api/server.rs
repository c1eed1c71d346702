use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{middleware, routing::get, Router};
use dotenv::dotenv;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::{handlers, rate_limit, rate_limit::RateLimiter, ApiContext};
use crate::chain::StakeAndLockClient;
use crate::config::Config;

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,tower=warn")),
        )
        .init();
}

pub fn create_app(ctx: ApiContext) -> Router {
    let v1 = Router::new()
        .route("/v1/time", get(handlers::server_time))
        .route("/v1/task/completion", get(handlers::task::completion))
        // rate limiting runs before the gate, which runs inside the handlers'
        // extractor chain
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            rate_limit::rate_limit,
        ));

    Router::new()
        .merge(v1)
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let config = Arc::new(Config::from_env()?);
    let stake_verifier = Arc::new(StakeAndLockClient::new(
        &config.metis_rpc,
        config.contract_address,
    )?);
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max_requests,
        Duration::from_millis(config.rate_limit_window_ms),
    ));

    let addr = format!("{}:{}", config.host, config.port);
    let ctx = ApiContext {
        config,
        stake_verifier,
        rate_limiter,
    };

    let app = create_app(ctx);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("campaign api listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")
}
