#![allow(dead_code)]

mod assistant;
mod email;
mod error;
mod rate_limiters;
mod request_tracing;
mod routes;
mod server_config;
#[cfg(test)]
mod testing;

use std::{env, net::SocketAddr, time::Duration};

use axum::extract::FromRef;
use mimalloc::MiMalloc;
use rate_limiters::RateLimiters;
use routes::AppRouter;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

/// Timeout imposed on every remote call; the core itself models none.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, FromRef)]
struct ServerState {
    http_client: HttpClient,
    rate_limiters: RateLimiters,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let http_client = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let state = ServerState {
        http_client,
        rate_limiters: RateLimiters::from_config(),
    };

    let router = AppRouter::create(state);

    // check config
    println!("{}", *server_config::cfg);

    let port = env::var("PORT").unwrap_or("5006".to_string());
    let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>()?));
    tracing::info!("Inboxpilot server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Shutting down");
        },
        _ = terminate => {
            tracing::info!("Shutting down");
        },
    }
}
