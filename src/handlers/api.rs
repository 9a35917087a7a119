use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde::Serialize;
use serde_json::{Value, json};

use crate::core::synthesis::SUPPORTED_LANGUAGES;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Device token used for inference (`xpu` or `cpu`)
    pub device: &'static str,
    pub accelerator_available: bool,
    pub accelerator_name: Option<String>,
    pub models_cached: u64,
    pub supported_languages: Vec<&'static str>,
    pub version: &'static str,
}

/// Health check with the device decision and cache occupancy
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let selection = state.selection();
    Json(HealthResponse {
        status: "healthy",
        device: selection.kind.token(),
        accelerator_available: selection.is_accelerator(),
        accelerator_name: selection.name.clone(),
        models_cached: state.speech.models_cached().await,
        supported_languages: SUPPORTED_LANGUAGES.to_vec(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Service banner and endpoint directory
pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    let selection = state.selection();
    let accelerator = match (&selection.name, selection.is_accelerator()) {
        (Some(name), true) => name.as_str(),
        _ => "Not used",
    };

    Json(json!({
        "message": "TTS gateway with Intel XPU support",
        "device": selection.kind.token(),
        "accelerator": accelerator,
        "endpoints": {
            "POST /convert/tts": "Convert text to speech",
            "GET /health": "Check API health and accelerator status",
        }
    }))
}
