use crate::clean::CleanOptions;
use crate::constants;
use crate::error::ScrapError;
use crate::pipeline::ScrapPipeline;
use crate::series::{to_datasets, ChartDataset};
use crate::types::RecordSource;
use axum::{
    extract::Path,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared by every request; each request still builds its own pipeline
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn RecordSource>,
    pub options: CleanOptions,
}

/// Pipeline or fetch failure rendered as `{"error": ...}`
pub struct ApiError(pub ScrapError);

impl From<ScrapError> for ApiError {
    fn from(err: ScrapError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ScrapError::MissingColumn(_) => StatusCode::BAD_REQUEST,
            err if err.is_upstream() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "scrap-series",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Metrics the chart UI offers in its selector
async fn metrics_list() -> impl IntoResponse {
    Json(constants::get_supported_metrics())
}

/// Fetch the current batch and return one chart dataset per pile group
async fn chart_data(
    Extension(state): Extension<AppState>,
    Path(metric): Path<String>,
) -> Result<Json<Vec<ChartDataset>>, ApiError> {
    let records = state.source.fetch_records().await.map_err(|e| {
        warn!("Fetch from {} failed: {}", state.source.source_name(), e);
        e
    })?;

    let mut pipeline = ScrapPipeline::new(metric.as_str()).with_options(state.options.clone());
    let cleaned = pipeline.run(records)?;
    let datasets = to_datasets(cleaned);

    info!(metric = %metric, "Serving {} datasets", datasets.len());
    Ok(Json(datasets))
}

/// Create the HTTP server with all routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/metrics", get(metrics_list))
        .route("/api/data/:metric", get(chart_data))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{port}");
    info!("Health check: http://localhost:{port}/health");
    info!("Chart data:   http://localhost:{port}/api/data/{}", constants::DEFAULT_METRIC);

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
