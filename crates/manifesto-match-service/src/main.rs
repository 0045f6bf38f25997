use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use manifesto_match_api::{AlignRequest, MatchApi};
use manifesto_match_core::{
    AlignmentOptions, AlignmentReport, EngineError, EnrichmentConfig, Manifesto, SurveyItem,
};
use manifesto_match_provider::{build_generator, ProviderConfig, ProviderKind};
use manifesto_match_store::{DataConfig, StoreSnapshot};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone)]
struct ServiceState {
    api: Arc<MatchApi>,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Debug, Parser)]
#[command(name = "manifesto-match-service")]
#[command(about = "HTTP service matching survey answers against analyzed manifestos")]
struct Args {
    #[arg(long, env = "MM_QUIZ_PATH", default_value = "./data/qq.json")]
    quiz: PathBuf,
    #[arg(long, env = "MM_MANIFESTOS_PATH", default_value = "./data/manifestos.json")]
    manifestos: PathBuf,
    #[arg(long, env = "MM_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,
    /// Also report the three least-aligned topics per manifesto by default.
    #[arg(long)]
    include_disagreements: bool,
    /// Rewrite surfaced explanations with a hosted text generator.
    #[arg(long)]
    enrich: bool,
    /// openai, anthropic or google; defaults to the first provider with an API key set.
    #[arg(long, env = "MM_PROVIDER")]
    provider: Option<String>,
    #[arg(long, env = "MM_MODEL")]
    model: Option<String>,
    #[arg(long, default_value_t = 20)]
    enrich_timeout_secs: u64,
    /// Cap on the whole enrichment pass of one request.
    #[arg(long, default_value_t = 60)]
    enrich_budget_secs: u64,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        let status = match err {
            EngineError::NoData(_) => StatusCode::NOT_FOUND,
            EngineError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "request failed");
        }
        ServiceState::error(status, err.to_string())
    }
}

impl ServiceState {
    fn error(status: StatusCode, message: impl Into<String>) -> ServiceError {
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: message.into(),
        }
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/openapi", get(openapi))
        .route("/api/quiz", get(quiz))
        .route("/api/manifestos", get(manifestos))
        .route("/api/align", post(align))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_api(args: &Args) -> Result<MatchApi> {
    let data = DataConfig { quiz_path: args.quiz.clone(), manifestos_path: args.manifestos.clone() };
    let mut api = MatchApi::new(Arc::new(StoreSnapshot::load(&data)))
        .with_options(AlignmentOptions { include_disagreements: args.include_disagreements })
        .with_enrichment(EnrichmentConfig {
            per_topic_timeout: Duration::from_secs(args.enrich_timeout_secs),
            total_budget: Duration::from_secs(args.enrich_budget_secs),
            ..EnrichmentConfig::default()
        });

    if args.enrich {
        let config = match args.provider.as_deref() {
            Some(name) => {
                let kind = ProviderKind::parse(name).with_context(|| format!("unknown provider `{name}`"))?;
                ProviderConfig::from_env_for(kind)?
            }
            None => ProviderConfig::from_env()?,
        };
        let config = match &args.model {
            Some(model) => config.with_model(model.clone()),
            None => config,
        };
        api = api.with_generator(build_generator(config));
    }
    Ok(api)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let state = ServiceState { api: Arc::new(build_api(&args)?) };
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(bind = %args.bind, "manifesto-match service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", message: "API is running" })
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn quiz(State(state): State<ServiceState>) -> Result<Json<Vec<SurveyItem>>, ServiceError> {
    Ok(Json(state.api.quiz()?.to_vec()))
}

async fn manifestos(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<Manifesto>>, ServiceError> {
    Ok(Json(state.api.manifestos()?.to_vec()))
}

async fn align(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<Json<AlignmentReport>, ServiceError> {
    let request: AlignRequest = serde_json::from_slice(&body).map_err(|err| {
        ServiceState::error(StatusCode::BAD_REQUEST, format!("malformed input: {err}"))
    })?;

    let api = Arc::clone(&state.api);
    let report = tokio::task::spawn_blocking(move || api.align(&request))
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "alignment task failed");
            ServiceState::error(StatusCode::INTERNAL_SERVER_ERROR, "alignment task failed")
        })??;
    Ok(Json(report))
}
