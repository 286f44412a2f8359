use axum::Router;
use pastejet::config::{self, Config};
use pastejet::docs::ApiDoc;
use pastejet::routes::api::create_api_routes;
use pastejet::services::{exec_service, profile_service};
use pastejet::{db, AppState};
use std::panic;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "pastejet=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    config::init_config(config);
    let config = config::get_config();

    // Initialize database connection if URL is provided
    if let Some(db_url) = &config.db_url {
        match db::init_db(db_url).await {
            Ok(_) => info!("Database initialized successfully"),
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Pastes, clipboards and rooms will not be available");
            }
        }
    } else {
        warn!("No database URL configured - pastes, clipboards and rooms will not be available");
    }

    // Initialize the execution-service client if configured
    if let Some(exec_url) = &config.exec_service_url {
        match exec_service::init_exec_client(
            exec_url.clone(),
            Duration::from_secs(config.exec_timeout_secs),
        ) {
            Ok(_) => info!("Execution client initialized ({})", exec_url),
            Err(e) => error!("Failed to initialize execution client: {}", e),
        }
    } else {
        warn!("No execution service configured - code runs will be rejected");
    }

    // Caches
    profile_service::init_display_name_cache();

    // Shared state: the live-channel hub
    let state = AppState::new();

    // Create API routes
    let api_routes = create_api_routes(state);

    // Combine all routes
    let app_routes = Router::new()
        // Mount API routes
        .nest("/api", api_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http());

    // Start the HTTP/API server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!(
        "📡 Room live channels at ws://{}/api/v1/rooms/{{room_id}}/ws",
        config.server_address()
    );
    info!(
        "📚 Swagger UI available at http://{}/swagger",
        config.server_address()
    );

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
