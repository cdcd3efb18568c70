//! Process-wide recognizer registry.
//!
//! A map from engine name to a constructor and a cheap, side-effect-free
//! availability probe. Registration happens once at process start via
//! [`register_builtin_engines`].

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{Recognizer, RecognizerParams};

/// Priority order used when the caller asks for `"auto"`.
pub const AUTO_PRIORITY: &[&str] = &["whisper", "kaldi-streaming", "cloud-http"];

type Constructor = Box<dyn Fn(&RecognizerParams) -> Box<dyn Recognizer> + Send + Sync>;
type AvailabilityProbe = Box<dyn Fn() -> bool + Send + Sync>;

struct RegistryEntry {
    constructor: Constructor,
    probe: AvailabilityProbe,
}

#[derive(Default)]
pub struct RecognizerRegistry {
    entries: RwLock<HashMap<&'static str, RegistryEntry>>,
}

static REGISTRY: OnceLock<RecognizerRegistry> = OnceLock::new();

/// Fetch the process-wide registry, initializing it with the three
/// built-in back-ends on first access.
pub fn global() -> &'static RecognizerRegistry {
    REGISTRY.get_or_init(|| {
        let registry = RecognizerRegistry::default();
        register_builtin_engines(&registry);
        registry
    })
}

/// Register the three built-in back-ends. Exposed separately from
/// [`global`] so tests can build an isolated registry with fake engines.
pub fn register_builtin_engines(registry: &RecognizerRegistry) {
    registry.register(
        "kaldi-streaming",
        |params| Box::new(super::StreamingFstRecognizer::new(params.clone())),
        || true,
    );
    registry.register(
        "whisper",
        |params| Box::new(super::ChunkedBufferedRecognizer::new(params.clone())),
        || true,
    );
    registry.register(
        "cloud-http",
        |params| Box::new(super::CloudHttpRecognizer::new(params.clone())),
        || true,
    );
}

impl RecognizerRegistry {
    /// Register a recognizer constructor under `engine_name`, with a cheap
    /// availability probe (env vars, file presence, optional-library
    /// presence — never I/O that could block).
    pub fn register(
        &self,
        engine_name: &'static str,
        constructor: impl Fn(&RecognizerParams) -> Box<dyn Recognizer> + Send + Sync + 'static,
        probe: impl Fn() -> bool + Send + Sync + 'static,
    ) {
        self.entries.write().insert(
            engine_name,
            RegistryEntry {
                constructor: Box::new(constructor),
                probe: Box::new(probe),
            },
        );
        debug!(engine = engine_name, "registered recognizer");
    }

    /// Create a recognizer by explicit name or by `"auto"` priority.
    ///
    /// Returns `None` if the named engine is not registered, its
    /// availability probe returns `false`, or construction produces an
    /// instance whose `is_available()` is `false`.
    pub fn create(&self, engine_name: &str, params: &RecognizerParams) -> Option<Box<dyn Recognizer>> {
        if engine_name.eq_ignore_ascii_case("auto") {
            return self.create_auto(params);
        }

        let entries = self.entries.read();
        let entry = match entries.get(engine_name) {
            Some(e) => e,
            None => {
                warn!(engine = engine_name, "engine not found in registry");
                return None;
            }
        };

        if !(entry.probe)() {
            warn!(engine = engine_name, "engine is not available");
            return None;
        }

        let recognizer = (entry.constructor)(params);
        if recognizer.is_available() {
            info!(engine = engine_name, "created recognizer");
            Some(recognizer)
        } else {
            warn!(engine = engine_name, "constructed recognizer reports unavailable");
            None
        }
    }

    fn create_auto(&self, params: &RecognizerParams) -> Option<Box<dyn Recognizer>> {
        let entries = self.entries.read();
        for engine_name in AUTO_PRIORITY {
            let Some(entry) = entries.get(engine_name) else {
                continue;
            };
            if !(entry.probe)() {
                debug!(engine = engine_name, "not available, trying next");
                continue;
            }
            let recognizer = (entry.constructor)(params);
            if recognizer.is_available() {
                info!(engine = engine_name, "auto-selected recognizer");
                return Some(recognizer);
            }
        }
        warn!("no suitable recognizer found among auto priority list");
        None
    }

    /// Snapshot of `engine_name -> available` for every registered engine,
    /// used by the `/health` and `connection_status` payloads.
    pub fn available_engines(&self) -> HashMap<String, bool> {
        self.entries
            .read()
            .iter()
            .map(|(name, entry)| (name.to_string(), (entry.probe)()))
            .collect()
    }
}
