use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::approval::token::TokenRegistry;
use crate::config::AppConfig;
use crate::generator::gemini::GeminiClient;
use crate::generator::uploadthing::UploadThingClient;
use crate::generator::{GeminiGenerator, ImageGenerator};
use crate::notify::slack::SlackNotifier;
use crate::notify::Notifier;
use crate::queue::gate::AdmissionGate;
use crate::store::RunStore;

pub struct AppState {
    pub config: AppConfig,
    pub generator: Arc<dyn ImageGenerator>,
    pub notifier: Arc<dyn Notifier>,
    pub tokens: TokenRegistry,
    pub runs: RunStore,
    pub gate: AdmissionGate,
}

impl AppState {
    pub async fn new(config: AppConfig) -> crate::error::Result<Self> {
        config.validate()?;

        let store = Arc::new(UploadThingClient::new(&config.uploadthing)?);
        let generator = Arc::new(GeminiGenerator::new(GeminiClient::new(&config.gemini)?, store));
        let notifier = Arc::new(SlackNotifier::new(&config)?);

        Self::with_components(config, generator, notifier).await
    }

    /// Build state around explicit collaborators.
    pub async fn with_components(
        config: AppConfig,
        generator: Arc<dyn ImageGenerator>,
        notifier: Arc<dyn Notifier>,
    ) -> crate::error::Result<Self> {
        let runs = RunStore::open(&config.workflow.state_dir).await?;

        Ok(Self {
            config,
            generator,
            notifier,
            tokens: TokenRegistry::new(),
            runs,
            gate: AdmissionGate::new(),
        })
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/generate-meme", post(crate::api::submit_run))
        .route("/api/generate-meme/result/:run_id", get(crate::api::run_status))
        .route(
            "/endpoints/:token_id",
            get(crate::approval::handler::handle_approval_link),
        )
        .route(
            "/slack/actions",
            post(crate::approval::handler::handle_slack_action),
        )
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
