//! REST endpoints: session introspection, one-shot file transcription, health.

use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use wavecast_core::recognizer::{factory, FileTranscribable, RecognizerParams};
use wavecast_core::WavecastError;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /audio/{id}/info` — session snapshot; 404 if unknown.
pub async fn session_info(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| WavecastError::SessionNotFound(session_id.clone()))?;

    let guard = session.lock();
    Ok(Json(json!({
        "session_id": guard.session_id,
        "created_at": guard.created_at,
        "last_activity": guard.last_activity,
        "sample_rate": guard.metadata.sample_rate,
        "channels": guard.metadata.channels,
        "encoding": guard.metadata.encoding,
        "language": guard.metadata.language,
        "transcript": guard.transcript_history(),
        "current_transcript": guard.current_transcript(),
        "packets_received": guard.stats.packets_received,
        "is_active": true,
        "is_processing": guard.is_processing,
        "is_speaking": guard.is_speaking,
        "config": guard.config,
    })))
}

/// `GET /audio/{id}/transcript` — transcript only.
pub async fn session_transcript(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| WavecastError::SessionNotFound(session_id.clone()))?;

    let guard = session.lock();
    Ok(Json(json!({
        "session_id": guard.session_id,
        "transcript_history": guard.transcript_history(),
        "current_transcript": guard.current_transcript(),
    })))
}

#[derive(Serialize)]
struct TranscribeResponse {
    text: String,
    segments: Vec<String>,
    language: String,
    engine: String,
}

/// `POST /transcribe` — one-shot file transcription.
/// Multipart fields: `file`, `language`, `engine`, `model_size`.
pub async fn transcribe_file(
    State(_state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut language = "vi".to_string();
    let mut engine = "whisper".to_string();
    let mut model_size = "small".to_string();

    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name().unwrap_or_default() {
            "file" => match field.bytes().await {
                Ok(bytes) => file_bytes = Some(bytes.to_vec()),
                Err(e) => return Err(WavecastError::InvalidInput(e.to_string()).into()),
            },
            "language" => language = field.text().await.unwrap_or(language),
            "engine" => engine = field.text().await.unwrap_or(engine),
            "model_size" => model_size = field.text().await.unwrap_or(model_size),
            _ => {}
        }
    }

    let audio = file_bytes.ok_or_else(|| WavecastError::InvalidInput("missing `file` field".into()))?;

    let params = RecognizerParams {
        sample_rate: wavecast_core::config::DEFAULT_SAMPLE_RATE,
        language: language.clone(),
        partial_results: false,
        model_size: model_size.clone(),
    };

    if factory::create(&engine, params).is_none() {
        return Err(WavecastError::EngineUnavailable(engine).into());
    }

    // `FileTranscribable` is an additional capability, not every back-end
    // implements it — 501 if the engine lacks file-mode support.
    // The registry only hands back `Box<dyn Recognizer>`, so recover the
    // concrete engine by name rather than downcasting a trait object.
    let transcription = match engine.as_str() {
        "whisper" => {
            let mut whisper = wavecast_core::recognizer::ChunkedBufferedRecognizer::new(
                default_recognizer_params(&language, &model_size),
            );
            whisper.transcribe_file(&audio)
        }
        _ => return Err(WavecastError::NotImplemented { engine }.into()),
    };

    let result = transcription.map_err(|e| WavecastError::Recognizer(e.to_string()))?;
    Ok(Json(TranscribeResponse {
        text: result.text,
        segments: result.segments,
        language: result.language,
        engine,
    }))
}

fn default_recognizer_params(language: &str, model_size: &str) -> RecognizerParams {
    RecognizerParams {
        sample_rate: wavecast_core::config::DEFAULT_SAMPLE_RATE,
        language: language.to_string(),
        partial_results: false,
        model_size: model_size.to_string(),
    }
}

/// `GET /health` — liveness.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().timestamp_millis(),
        "active_connections": state.active_connections(),
        "active_sessions": state.sessions.len(),
        "engines_available": factory::available_engines(),
    }))
}
