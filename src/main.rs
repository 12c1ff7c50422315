mod adapter;
mod auth;
mod config;
mod constants;
mod error;
mod routes;
mod schema;
mod transforms;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::ServiceExt;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use reqwest::Client;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::normalize_path::NormalizePath;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth::{CredentialStore, OAuthManager};
use config::{Config, CorsMode};
use upstream::UpstreamClient;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");

/// Upstream request timeout. Long SSE streams are bounded by write
/// behavior on the serving side, not a per-request deadline.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct AppState {
    pub upstream: UpstreamClient,
}

#[derive(Parser)]
#[command(name = "claude-relay")]
#[command(about = "OpenAI-compatible proxy for the Anthropic API")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "CLAUDE_RELAY_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "CLAUDE_RELAY_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the proxy server (default)
    Serve,
    /// Manage upstream credentials
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Run the OAuth login flow
    Login,
    /// Remove stored credentials
    Logout,
    /// Show whether credentials are configured
    Status,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    match args.command {
        Some(Command::Auth { action }) => run_auth(&config, action).await,
        Some(Command::Serve) | None => run_serve(args, config).await,
    }
}

async fn run_auth(config: &Config, action: AuthAction) {
    let store = Arc::new(CredentialStore::open(config.credentials_path()).await);
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client");
    let oauth = OAuthManager::new(client, store);

    match action {
        AuthAction::Login => {
            let url = oauth.start_flow().await;
            println!("Open the following URL in your browser:\n\n  {url}\n");
            println!("After authorizing, paste the code here (format: code#state):");

            let mut code = String::new();
            std::io::stdin()
                .read_line(&mut code)
                .expect("Failed to read authorization code");

            match oauth.exchange_code(code.trim()).await {
                Ok(()) => println!("Login successful, credentials saved."),
                Err(e) => {
                    eprintln!("Login failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        AuthAction::Logout => match oauth.logout().await {
            Ok(()) => println!("Credentials removed."),
            Err(e) => {
                eprintln!("Logout failed: {e}");
                std::process::exit(1);
            }
        },
        AuthAction::Status => {
            if oauth.is_authenticated().await {
                println!("Authenticated.");
            } else {
                println!("Not authenticated. Run `claude-relay auth login`.");
            }
        }
    }
}

async fn run_serve(args: Args, config: Config) {
    let host = args.host.unwrap_or_else(|| config.host.clone());
    let port = args.port.unwrap_or(config.port);

    let store = Arc::new(CredentialStore::open(config.credentials_path()).await);
    if !store.is_configured().await {
        warn!("No credentials configured; run `claude-relay auth login` before sending requests");
    }

    // Shared HTTP client with connection pooling
    let http_client = Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to create HTTP client");

    let oauth = Arc::new(OAuthManager::new(http_client.clone(), store));
    let upstream = UpstreamClient::new(http_client, constants::ANTHROPIC_BASE_URL, oauth);
    let state = AppState { upstream };

    let cors = cors_layer(config.cors_mode.clone());
    match &config.cors_mode {
        CorsMode::AllowAll => info!("CORS: Allowing all origins"),
        CorsMode::LocalhostOnly => info!("CORS: Localhost only"),
        CorsMode::AllowList(list) => info!("CORS: Allowing origins: {:?}", list),
    }

    let api_routes = Router::new()
        .route("/chat/completions", post(routes::openai::chat_completions))
        .route("/models", get(routes::openai::list_models));

    let app = NormalizePath::trim_trailing_slash(
        Router::new()
            .route("/health", get(routes::health::health))
            .route("/version", get(routes::health::version))
            .nest("/v1", api_routes)
            .layer(DefaultBodyLimit::max(config.max_body_bytes))
            .layer(cors)
            // Outermost: a panicking handler becomes a plain 500
            .layer(CatchPanicLayer::new())
            .with_state(state),
    );

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid address");
    info!(
        "Starting claude-relay v{}-{} (built {})",
        VERSION, GIT_HASH, BUILD_TIME
    );
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .unwrap();

    info!("Stopped gracefully");
}

fn cors_layer(mode: CorsMode) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let Ok(origin_str) = origin.to_str() else {
                return false;
            };

            match &mode {
                CorsMode::AllowAll => true,
                CorsMode::LocalhostOnly => {
                    let Ok(url) = url::Url::parse(origin_str) else {
                        return false;
                    };
                    matches!(
                        url.host_str(),
                        Some("localhost") | Some("127.0.0.1") | Some("::1")
                    )
                }
                CorsMode::AllowList(allowed) => allowed.iter().any(|a| a == origin_str),
            }
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
