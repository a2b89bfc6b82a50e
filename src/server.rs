use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::models::SessionRecord;
use crate::pipeline::DocQaService;
use crate::record;

#[derive(Clone)]
struct AppState {
    service: DocQaService,
    qa_log_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
    doc_path: String,
}

pub async fn run_server(
    bind_addr: &str,
    qa_log_dir: PathBuf,
    service: DocQaService,
) -> Result<()> {
    let state = AppState {
        service,
        qa_log_dir,
    };

    let app = Router::new()
        .route("/api/query", post(query_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<SessionRecord>, ApiError> {
    let session = state
        .service
        .answer_question(&request.question, Path::new(&request.doc_path))
        .await
        .map_err(ApiError::from)?;

    if let Err(err) = record::write_record(&state.qa_log_dir, &session).await {
        tracing::warn!("failed to persist qa record: {err:#}");
    }

    Ok(Json(session))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
