use std::sync::Arc;

use actix_web::HttpServer;
use anyhow::Context;
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use booktracker_service::app_config::{build_app, AppState};
use booktracker_service::attachments::{
    AttachmentStore, FilesystemAttachmentStore, InMemoryAttachmentStore, UploadLimit,
};
use booktracker_service::auth::TokenKeys;
use booktracker_service::books_repository::{
    BooksRepository, InMemoryBooksRepository, PostgresBooksRepository,
    PostgresBooksRepositoryConfig,
};
use booktracker_service::settings::Settings;
use booktracker_service::users_repository::{
    InMemoryUsersRepository, PostgresUsersRepository, PostgresUsersRepositoryConfig,
    UsersRepository,
};

// Jaeger export plus bunyan json logs on stdout, level tunable via RUST_LOG
fn init_telemetry() -> anyhow::Result<()> {
    let app_name = "booktracker_service";

    global::set_text_map_propagator(TraceContextPropagator::new());
    #[allow(deprecated)]
    let tracer = opentelemetry_jaeger::new_agent_pipeline()
        .with_service_name(app_name)
        .install_batch(TokioCurrentThread)
        .context("Failed to install OpenTelemetry tracer")?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info"));
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
    let formatting_layer = BunyanFormattingLayer::new(app_name.into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(telemetry)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")
}

async fn init_state(settings: &Settings) -> anyhow::Result<AppState> {
    let token_keys = Arc::new(TokenKeys::new(settings.token_secret()?.as_bytes()));
    let upload_limit = UploadLimit {
        bytes: settings.upload_limit_bytes,
    };

    if settings.use_in_memory_db {
        tracing::info!("Using in-memory storage");
        return Ok(AppState {
            books: Arc::new(InMemoryBooksRepository::default()),
            users: Arc::new(InMemoryUsersRepository::default()),
            attachments: Arc::new(InMemoryAttachmentStore::default()),
            token_keys,
            upload_limit,
        });
    }

    let books: Arc<dyn BooksRepository + Send + Sync> = Arc::new(
        PostgresBooksRepository::init(PostgresBooksRepositoryConfig {
            hostname: settings.db_host.clone(),
            username: settings.db_username.clone(),
            password: settings.db_password.clone(),
        })
        .await?,
    );
    let users: Arc<dyn UsersRepository + Send + Sync> = Arc::new(
        PostgresUsersRepository::init(PostgresUsersRepositoryConfig {
            hostname: settings.db_host.clone(),
            username: settings.db_username.clone(),
            password: settings.db_password.clone(),
        })
        .await?,
    );
    let attachments: Arc<dyn AttachmentStore + Send + Sync> =
        Arc::new(FilesystemAttachmentStore::init(&settings.uploads_dir).await?);

    Ok(AppState {
        books,
        users,
        attachments,
        token_keys,
        upload_limit,
    })
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry()?;
    let settings = Settings::load()?;
    let state = init_state(&settings).await?;

    tracing::info!("Starting HTTP server on port {}", settings.port);
    HttpServer::new(move || build_app(&state))
        .bind(("0.0.0.0", settings.port))?
        .run()
        .await
        .context("HTTP server failed")
}
