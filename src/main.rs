use actix_web::{web, App, HttpServer, HttpResponse, middleware, error, http::StatusCode};
use lume_relay::config::{Settings, StoreBackend, TransportKind};
use lume_relay::core::{DialogueRouter, SessionStore};
use lume_relay::routes::{self, events::AppState};
use lume_relay::services::{
    ConversationStore, LogTransport, MemoryConversationStore, MemoryProfileStore, PostgresClient,
    ProfileStore, TelegramClient, Transport,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, error, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

fn io_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

/// LOG_LEVEL / LOG_FORMAT win over the [logging] section
fn init_logging(settings: &Settings) {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| settings.logging.level.clone());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| settings.logging.format.clone());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Load configuration before logging so [logging] applies
    let settings = Settings::load().map_err(|e| io_error("Configuration error", e))?;

    init_logging(&settings);

    info!("Starting Lume Relay...");

    // Initialize stores
    let (profiles, conversations): (Arc<dyn ProfileStore>, Arc<dyn ConversationStore>) =
        match settings.store.backend {
            StoreBackend::Postgres => {
                let postgres = Arc::new(
                    PostgresClient::from_settings(
                        &settings.database.url,
                        settings.database.max_connections,
                        settings.database.min_connections,
                        settings.database.acquire_timeout_secs,
                        settings.database.idle_timeout_secs,
                        settings.matching.candidate_limit,
                    )
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {}", e);
                        io_error("PostgreSQL connection error", e)
                    })?,
                );

                info!(
                    "PostgreSQL store initialized (max: {} connections)",
                    settings.database.max_connections.unwrap_or(10)
                );
                (postgres.clone() as Arc<dyn ProfileStore>, postgres as Arc<dyn ConversationStore>)
            }
            StoreBackend::Memory => {
                warn!("Using in-memory store; profiles and pairings are lost on restart");
                (
                    Arc::new(MemoryProfileStore::new()) as Arc<dyn ProfileStore>,
                    Arc::new(MemoryConversationStore::new()) as Arc<dyn ConversationStore>,
                )
            }
        };

    // Initialize transport
    let transport: Arc<dyn Transport> = match settings.transport.kind {
        TransportKind::Telegram => Arc::new(
            TelegramClient::new(
                &settings.transport.api_base,
                &settings.transport.bot_token,
                Duration::from_secs(settings.transport.request_timeout_secs),
            )
            .map_err(|e| {
                error!("Failed to initialize Telegram client: {}", e);
                io_error("Transport error", e)
            })?,
        ),
        TransportKind::Log => Arc::new(LogTransport),
    };

    info!("Transport initialized: {:?}", settings.transport.kind);

    let sessions = SessionStore::new(
        settings.session.max_sessions,
        Duration::from_secs(settings.session.idle_ttl_secs),
    );

    let router = DialogueRouter::assemble(
        profiles.clone(),
        conversations,
        sessions,
        settings.matching.proximity_radius_m,
    );

    info!(
        "Dialogue router initialized (proximity radius: {} m)",
        settings.matching.proximity_radius_m
    );

    if settings.transport.kind == TransportKind::Telegram && settings.transport.webhook_secret.is_none() {
        warn!("No webhook secret configured; webhook calls are not authenticated");
    }

    // Build application state
    let app_state = AppState {
        router,
        transport,
        profiles,
        webhook_secret: settings.transport.webhook_secret.clone(),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
