use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::service::SynthesisParams;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

const PREVIEW_CHARS: usize = 50;

/// Request body for `POST /convert/tts`
///
/// Missing optional fields take the server defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub speaker_id: Option<String>,
}

impl TtsRequest {
    pub fn resolve(self, config: &ServerConfig) -> SynthesisParams {
        SynthesisParams {
            text: self.text,
            speed: self.speed.unwrap_or(config.default_speed),
            language: self
                .language
                .unwrap_or_else(|| config.default_language.clone()),
            speaker_id: self
                .speaker_id
                .unwrap_or_else(|| config.default_speaker_id.clone()),
        }
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Convert text to speech and return a WAV attachment
pub async fn convert_tts(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload.map_err(|rejection| AppError::BadRequest {
        status: rejection.status(),
        message: rejection.body_text(),
    })?;
    let params = request.resolve(&state.config);

    info!(
        text = %preview(&params.text),
        language = %params.language,
        speaker = %params.speaker_id,
        device = %state.selection().kind,
        "Processing TTS request"
    );

    let audio = state.speech.render(&params).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=tts_output.wav",
            ),
        ],
        audio,
    )
        .into_response())
}
