use super::types::{ErrorResponse, SaveImageRequest, SaveImageResponse};
use crate::{
    Error,
    pipeline::{GenerationRequest, Pipeline, PipelineOutcome, PipelineStage},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub async fn save_image(
    State(state): State<AppState>,
    Json(request): Json<SaveImageRequest>,
) -> Result<Json<SaveImageResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!(
        "Received image {} for token {}",
        request.filename, request.token
    );

    match state
        .pipeline
        .save_asset(&request.token, &request.filename, &request.image_content)
        .await
    {
        Ok(asset) => Ok(Json(SaveImageResponse {
            image_url: asset.path.to_string_lossy().into_owned(),
        })),
        Err(e) => {
            error!("Failed to save image for token {}: {}", request.token, e);
            let status = match e {
                Error::Decode(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((status, Json(ErrorResponse::new(e.to_string()))))
        }
    }
}

pub async fn train_inference(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Response {
    info!("Received train/inference request for token {}", request.token);

    match state.pipeline.run(&request).await {
        PipelineOutcome::Completed(result) => (StatusCode::OK, Json(result)).into_response(),
        PipelineOutcome::Failed(failure) => {
            let status = match failure.stage {
                PipelineStage::Validate => StatusCode::BAD_REQUEST,
                PipelineStage::Acquire => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(failure)).into_response()
        }
    }
}
