//! HTTP Surface (C8): JSON endpoints over the pool/evaluator, with bounded
//! retry and output truncation.

mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::admission::AdmissionGate;
use crate::config::Settings;
use crate::engine::EngineClient;
use crate::eval::Evaluator;
use crate::pool::ContainerPool;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub engine: Arc<dyn EngineClient>,
    pub pool: Arc<ContainerPool>,
    pub admission: Arc<AdmissionGate>,
    pub evaluator: Arc<Evaluator>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/languages", get(handlers::languages))
        .route("/containers", get(handlers::containers))
        .route("/eval", post(handlers::eval))
        .route("/cleanup", post(handlers::cleanup))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
