//! HTTP surface: AI relay, fare model training and queries, static files.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::estimate::{relay_estimate, EstimateResponse};
use crate::llm::{ChatClient, Collaborator};
use crate::model::FareModel;
use crate::normalize::LineAliases;
use crate::store::FareModelStore;
use crate::training::FareTrainer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FareModelStore>,
    pub trainer: Arc<FareTrainer>,
    pub collaborator: Arc<dyn Collaborator>,
}

impl AppState {
    pub fn new(
        store: Arc<FareModelStore>,
        collaborator: Arc<dyn Collaborator>,
        aliases: LineAliases,
        config: &Config,
    ) -> Self {
        let trainer = FareTrainer::new(
            store.clone(),
            collaborator.clone(),
            aliases,
            &config.stations_path,
            &config.fares_path,
        );
        Self {
            store,
            trainer: Arc::new(trainer),
            collaborator,
        }
    }

    /// Load persisted state and wire up the real collaborator.
    pub async fn init(config: &Config) -> anyhow::Result<Self> {
        let aliases = match &config.line_aliases_path {
            Some(path) => LineAliases::load_with_overrides(path)
                .await
                .context("failed to load line aliases")?,
            None => LineAliases::default(),
        };
        if config.llm.api_key.is_none() {
            warn!("No LLM API key configured; AI endpoints will fail or fall back");
        }

        let store = Arc::new(FareModelStore::load(&config.fare_model_path).await);
        let collaborator: Arc<dyn Collaborator> = Arc::new(ChatClient::new(config.llm.clone()));
        Ok(Self::new(store, collaborator, aliases, config))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(error)))
}

#[derive(Debug, Serialize)]
struct ModelResponse {
    ok: bool,
    model: Option<FareModel>,
}

#[derive(Debug, Deserialize)]
struct QuoteQuery {
    line: Option<String>,
    km: Option<String>,
}

#[derive(Debug, Serialize)]
struct QuoteResponse {
    ok: bool,
    line: String,
    distance_km: f64,
    fare: f64,
    currency: String,
}

pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ai/estimate", post(estimate))
        .route("/ai/train-fare-model", post(train_fare_model))
        .route("/fare-model", get(get_fare_model))
        .route("/fare-model/quote", get(quote_fare))
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(app: Router, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind listener on {addr}"))?;

    info!("Server is running on http://localhost:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// Any body is accepted; one that is not JSON gets the fallback response.
async fn estimate(State(state): State<AppState>, body: Bytes) -> Json<EstimateResponse> {
    let baseline = match serde_json::from_slice::<Value>(&body) {
        Ok(baseline) => baseline,
        Err(e) => {
            warn!("Estimate request has no usable JSON baseline: {}", e);
            return Json(EstimateResponse::fallback());
        }
    };
    Json(relay_estimate(state.collaborator.as_ref(), &baseline, Local::now()).await)
}

async fn train_fare_model(
    State(state): State<AppState>,
) -> Result<Json<ModelResponse>, ApiError> {
    match state.trainer.train().await {
        Ok(report) => {
            info!(
                "Trained fare model: {} lines from {} samples",
                report.lines_trained, report.samples
            );
            Ok(Json(ModelResponse {
                ok: true,
                model: Some(report.model.as_ref().clone()),
            }))
        }
        Err(e) => {
            error!("Fare model training failed: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn get_fare_model(State(state): State<AppState>) -> Json<ModelResponse> {
    let model = state.store.get();
    Json(ModelResponse {
        ok: model.is_some(),
        model: model.map(|m| m.as_ref().clone()),
    })
}

async fn quote_fare(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let distance_km = query
        .km
        .as_deref()
        .and_then(|km| km.trim().parse::<f64>().ok())
        .filter(|km| km.is_finite() && *km >= 0.0)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "km must be a non-negative number"))?;
    let line = state
        .trainer
        .aliases()
        .normalize_line_id(query.line.as_deref())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "line is required"))?;

    let model = state
        .store
        .get()
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "fare model not trained"))?;
    let fare = model
        .quote(&line, distance_km)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("no fare model for line {line}")))?;

    Ok(Json(QuoteResponse {
        ok: true,
        line,
        distance_km,
        fare,
        currency: model.currency.clone(),
    }))
}
