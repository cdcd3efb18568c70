//! Recognizer factory: alias normalization, defaults, and registry
//! delegation.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::{info, warn};

use super::registry::{self};
use super::{Recognizer, RecognizerParams};

/// Normalize a caller-supplied engine name to the registry's canonical
/// identifier. `speechrecognition` is a legacy alias for the cloud
/// fallback recognizer; it maps onto `cloud-http` here.
fn normalize_engine_name(engine: &str) -> String {
    let lower = engine.to_lowercase();
    match lower.as_str() {
        "speechrecognition" => "cloud-http".to_string(),
        _ => lower,
    }
}

/// Create a recognizer for `engine`, filling in defaults
/// (`model_size = "small"` when unset).
///
/// Returns `None` if no matching engine is available — callers (session
/// creation, `/transcribe`) must treat this as `EngineUnavailable`, not a
/// hard error: a session with no recognizer still accepts audio.
pub fn create(engine: &str, mut params: RecognizerParams) -> Option<Box<dyn Recognizer>> {
    let engine = normalize_engine_name(engine);
    if params.model_size.is_empty() {
        params.model_size = "small".to_string();
    }

    let recognizer = registry::global().create(&engine, &params);
    if recognizer.is_some() {
        info!(engine = %engine, language = %params.language, "created recognizer via factory");
    } else {
        warn!(engine = %engine, "factory failed to create recognizer");
    }
    recognizer
}

/// Snapshot of `engine_name -> available` across the registry, used by
/// `connection_status` and `/health`.
pub fn available_engines() -> HashMap<String, bool> {
    registry::global().available_engines()
}

/// Optional memoization key for resolving a canonical engine name. Not
/// used by session creation paths — each `Session` owns an exclusive
/// recognizer instance — but kept as a library-level convenience for
/// callers (e.g. a future batch endpoint) that want engine reuse across
/// calls with identical parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    engine: String,
    language: String,
    sample_rate: u32,
    model_size: String,
}

static MEMO_NAMES: OnceLock<Mutex<HashMap<MemoKey, &'static str>>> = OnceLock::new();

/// Returns the canonical engine name that would be selected for the given
/// parameters, caching the resolution so repeated calls with identical
/// parameters skip the registry lookup. Does not retain the constructed
/// `Box<dyn Recognizer>` itself, since instances are not `Clone` and must
/// stay single-owner.
pub fn resolve_cached_engine_name(engine: &str, params: &RecognizerParams) -> Option<&'static str> {
    let key = MemoKey {
        engine: normalize_engine_name(engine),
        language: params.language.clone(),
        sample_rate: params.sample_rate,
        model_size: params.model_size.clone(),
    };

    let cache = MEMO_NAMES.get_or_init(|| Mutex::new(HashMap::new()));
    if let Some(name) = cache.lock().get(&key) {
        return Some(name);
    }

    let resolved = create(&key.engine, params.clone())?.engine_name();
    cache.lock().insert(key, resolved);
    Some(resolved)
}
