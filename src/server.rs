use std::sync::Arc;
use axum::{routing::post, Router, Json};
use axum::extract::Path;
use axum::http::StatusCode;
use tower_http::cors::{CorsLayer, Any};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::envelope::BatchRequest;
use crate::error::SweepError;

pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/v1/actions/:action", post(move |Path(action): Path<String>, Json(request): Json<BatchRequest>| {
            let engine = Arc::clone(&engine);
            async move {
                // The engine is synchronous, so the request runs on a blocking thread.
                let started = std::time::Instant::now();
                let name = action.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    engine.run(&action, &request)
                }).await.map_err(|e| {
                    warn!(error=%e, "Join error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Join error")
                })?;
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                match outcome {
                    Ok(envelope) => {
                        info!(action=%name, ms=elapsed_ms, status=?envelope.status, cancel=envelope.cancel_actions, "batch action complete");
                        let body = serde_json::to_value(&envelope).unwrap_or_default();
                        Ok::<_, (StatusCode, &'static str)>((StatusCode::OK, Json(body)))
                    }
                    Err(e) => {
                        // Hard failures produce no envelope, just an error body.
                        let status = match &e {
                            SweepError::UnknownAction(_) => StatusCode::NOT_FOUND,
                            SweepError::Selection(_) => StatusCode::BAD_REQUEST,
                            _ => StatusCode::INTERNAL_SERVER_ERROR,
                        };
                        let msg = format!("{e}");
                        warn!(action=%name, %msg, code=%status.as_u16(), "batch action failed");
                        Ok((status, Json(serde_json::json!({ "error": msg }))))
                    }
                }
            }
        }))
        .layer(cors)
}
