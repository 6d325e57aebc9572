use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use soprano_llm::{LlamaCppProvider, TextGenerator};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handlers;
use crate::state::{AppState, ModelHandle};

/// Malformed JSON bodies get the same error shape as every other 400.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| AppError::InvalidRequest(err.to_string()).into())
}

pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/", web::get().to(handlers::root::handler))
        .route("/health", web::get().to(handlers::health::handler))
        .route("/generate", web::post().to(handlers::generate::handler))
        .route("/generate/stream", web::post().to(handlers::stream::handler));
}

/// Bring the model up in the background so `/health` can answer while it loads.
pub fn spawn_model_init(
    model: Arc<ModelHandle>,
    generator: Arc<dyn TextGenerator>,
    config: &ServerConfig,
) -> JoinHandle<()> {
    let timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.health_poll_interval_ms);

    tokio::spawn(async move {
        if let Err(e) = model.initialize(generator, timeout, poll_interval).await {
            log::error!("Model initialisation gave up: {}", e);
        }
    })
}

pub async fn run_server(config: ServerConfig) -> io::Result<()> {
    let generator: Arc<dyn TextGenerator> = Arc::new(
        LlamaCppProvider::new(config.backend_url.clone()).with_model(config.model_name.clone()),
    );
    run_server_with_generator(config, generator).await
}

pub async fn run_server_with_generator(
    config: ServerConfig,
    generator: Arc<dyn TextGenerator>,
) -> io::Result<()> {
    log::info!(
        "Starting Soprano server on {}:{} (backend {}, model {})",
        config.host,
        config.port,
        config.backend_url,
        config.model_name
    );

    let state = AppState::new(config.clone());
    let init = spawn_model_init(state.model.clone(), generator, &config);
    let data = web::Data::new(state.clone());

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Cors::permissive())
            .wrap(Logger::new("%r %s %Dms"))
            .configure(app_config)
    })
    .keep_alive(Duration::from_secs(config.keep_alive_secs))
    .bind((config.host.as_str(), config.port))?
    .run();

    let result = server.await;

    init.abort();
    state.model.teardown().await;
    log::info!("Server stopped");
    result
}
