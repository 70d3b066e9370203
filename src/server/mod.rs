mod handlers;
mod types;

pub use handlers::AppState;
pub use types::{ErrorResponse, SaveImageRequest, SaveImageResponse};

use crate::{Result, config::Config, pipeline::Pipeline};
use axum::{Router, routing::post};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/save_image", post(handlers::save_image))
        .route("/train_inference", post(handlers::train_inference))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn run(config: Config) -> Result<()> {
    let pipeline = Pipeline::from_config(&config).await?;
    let app = router(AppState {
        pipeline: Arc::new(pipeline),
    });

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
