//! Streaming dispatcher: the per-session transcription loop.
//!
//! One task per session, following a single-producer actor shape (drain →
//! classify → accumulate/flush → emit) over a channel rather than
//! fine-grained locking around a shared ring buffer. Audio chunks and
//! control frames both funnel through the same channel, which gives
//! control-message handling and the dispatch loop serialization for free —
//! they run on the same task, one message at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio;
use crate::config::{DISPATCHER_YIELD_MS, WINDOW_POLL_INTERVAL_MS};
use crate::ipc::{ControlMessage, OutboundMessage};
use crate::recognizer::TranscriptResult;
use crate::session::Session;

/// One message delivered to a session's dispatcher task.
pub enum SessionMsg {
    Audio(Vec<u8>),
    Control(ControlMessage),
}

/// Handle to a running dispatcher task. Dropping `tx` (or calling
/// [`DispatcherHandle::shutdown`]) closes the channel, which the task
/// observes within [`WINDOW_POLL_INTERVAL_MS`] and exits on — cancellation
/// is observable within one loop iteration, ~150ms worst case.
pub struct DispatcherHandle {
    pub tx: mpsc::UnboundedSender<SessionMsg>,
    pub task: tokio::task::JoinHandle<()>,
}

impl DispatcherHandle {
    /// Close the inbound channel and await task exit, bounded by
    /// `grace_period` so a stuck task can't hang server shutdown.
    pub async fn shutdown(self, grace_period: Duration) {
        drop(self.tx);
        let _ = tokio::time::timeout(grace_period, self.task).await;
    }
}

/// Spawn a dispatcher task for `session`. `outbound_tx` carries every
/// frame destined for the client back to the transport adapter.
pub fn spawn(
    session: Arc<Mutex<Session>>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
) -> DispatcherHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(session, rx, outbound_tx));
    DispatcherHandle { tx, task }
}

async fn run(
    session: Arc<Mutex<Session>>,
    mut inbox: mpsc::UnboundedReceiver<SessionMsg>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
) {
    let session_id = session.lock().session_id.clone();
    info!(session_id, "dispatcher started");

    loop {
        tokio::select! {
            biased;
            msg = inbox.recv() => {
                match msg {
                    Some(SessionMsg::Audio(bytes)) => {
                        session.lock().add_chunk(&bytes);
                    }
                    Some(SessionMsg::Control(control)) => {
                        handle_control(&session, &outbound_tx, control);
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(WINDOW_POLL_INTERVAL_MS)) => {}
        }

        if step(&session, &outbound_tx) {
            tokio::time::sleep(Duration::from_millis(DISPATCHER_YIELD_MS)).await;
        }
    }

    session.lock().is_processing = false;
    info!(session_id, "dispatcher stopped");
}

/// One iteration of the dispatcher loop body. Returns `true` if a window
/// was extracted and processed (signalling the caller to take the 50ms
/// yield).
fn step(session: &Arc<Mutex<Session>>, outbound_tx: &mpsc::UnboundedSender<OutboundMessage>) -> bool {
    let window = session.lock().extract_window();
    let Some(window) = window else {
        return false;
    };

    let mut guard = session.lock();

    if guard.config.vad_enabled {
        let (voiced, _rms) = audio::detect_voice_activity(&window, guard.config.vad_threshold);
        let silence_duration = guard.config.silence_duration;
        if update_vad_state(&mut guard, voiced, silence_duration) {
            if let Some(r) = guard.recognizer_mut() {
                r.reset();
            }
        }
    }

    guard.is_processing = true;
    let result = match guard.recognizer_mut() {
        Some(r) => r.process_audio(&window),
        None => Ok(TranscriptResult::empty()),
    };
    guard.is_processing = false;

    match result {
        Ok(result) if !result.is_empty() => {
            guard.add_transcript(&result.text, !result.is_final);
            drop(guard);
            let _ = outbound_tx.send(OutboundMessage::transcript(result.text, result.is_final));
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "recognizer process_audio failed, continuing");
        }
    }

    true
}

/// Advance the `IDLE`/`SPEAKING`/`TRAILING_SILENCE` state machine. Returns
/// `true` exactly on the `TRAILING_SILENCE → IDLE` transition, the
/// caller's cue to call `recognizer.reset()`.
fn update_vad_state(session: &mut Session, voiced: bool, silence_duration: f32) -> bool {
    if session.is_speaking {
        if !voiced {
            session.is_speaking = false;
            session.silence_started_at = Some(Instant::now());
        }
        return false;
    }

    match session.silence_started_at {
        Some(started) => {
            if voiced {
                session.is_speaking = true;
                session.silence_started_at = None;
                false
            } else if started.elapsed().as_secs_f32() > silence_duration {
                session.silence_started_at = None;
                true
            } else {
                false
            }
        }
        None => {
            if voiced {
                session.is_speaking = true;
            }
            false
        }
    }
}

/// Control-message handler. Runs inline on the dispatcher task, so it is
/// trivially serialized against `step` — both execute one message/iteration
/// at a time on the same single-threaded sequence of awaits.
fn handle_control(
    session: &Arc<Mutex<Session>>,
    outbound_tx: &mpsc::UnboundedSender<OutboundMessage>,
    msg: ControlMessage,
) {
    match msg {
        ControlMessage::Ping { timestamp } => {
            let _ = outbound_tx.send(OutboundMessage::pong(timestamp));
        }
        ControlMessage::Metadata { data } => {
            let mut guard = session.lock();
            debug!(session_id = %guard.session_id, "metadata replaced, rebuilding recognizer");
            guard.metadata = data;
            guard.rebuild_recognizer();
            guard.touch();
        }
        ControlMessage::Config { data } => {
            let mut data = data;
            data.normalize();
            let mut guard = session.lock();
            let engine_changed =
                data.engine != guard.config.engine || data.model_size != guard.config.model_size;
            guard.config = data;
            if engine_changed || !guard.has_recognizer() {
                debug!(
                    session_id = %guard.session_id,
                    engine = %guard.config.engine,
                    "config replaced with new engine, rebuilding recognizer"
                );
                guard.rebuild_recognizer();
            }
            guard.touch();
        }
        ControlMessage::Reset => {
            // Handling this inline rather than tearing down and respawning
            // the task reaches the same observable state (cleared buffers,
            // fresh recognizer, fresh VAD state) without the respawn cost.
            let mut guard = session.lock();
            guard.reset_buffers();
            guard.rebuild_recognizer();
            guard.is_speaking = false;
            guard.silence_started_at = None;
            guard.touch();
            drop(guard);
            let _ = outbound_tx.send(OutboundMessage::reset_completed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AudioMetadata, TranscriptionConfig};

    fn new_session() -> Arc<Mutex<Session>> {
        Arc::new(Mutex::new(Session::new(
            "s1".into(),
            AudioMetadata::default(),
            TranscriptionConfig::default(),
        )))
    }

    #[test]
    fn vad_idle_to_speaking_on_voiced() {
        let session = new_session();
        let mut guard = session.lock();
        assert!(!update_vad_state(&mut guard, true, 0.5));
        assert!(guard.is_speaking);
    }

    #[test]
    fn vad_speaking_to_trailing_silence_on_unvoiced() {
        let session = new_session();
        let mut guard = session.lock();
        guard.is_speaking = true;
        assert!(!update_vad_state(&mut guard, false, 0.5));
        assert!(!guard.is_speaking);
        assert!(guard.silence_started_at.is_some());
    }

    #[test]
    fn vad_trailing_silence_cancels_on_voiced_again() {
        let session = new_session();
        let mut guard = session.lock();
        guard.is_speaking = false;
        guard.silence_started_at = Some(Instant::now());
        assert!(!update_vad_state(&mut guard, true, 0.5));
        assert!(guard.is_speaking);
        assert!(guard.silence_started_at.is_none());
    }

    #[test]
    fn vad_trailing_silence_to_idle_after_duration_elapsed() {
        let session = new_session();
        let mut guard = session.lock();
        guard.is_speaking = false;
        guard.silence_started_at = Some(Instant::now() - Duration::from_millis(600));
        assert!(update_vad_state(&mut guard, false, 0.5));
        assert!(guard.silence_started_at.is_none());
    }

    #[test]
    fn vad_trailing_silence_not_yet_idle_within_duration() {
        let session = new_session();
        let mut guard = session.lock();
        guard.is_speaking = false;
        guard.silence_started_at = Some(Instant::now());
        assert!(!update_vad_state(&mut guard, false, 0.5));
    }

    #[tokio::test]
    async fn ping_replies_with_pong() {
        let session = new_session();
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_control(&session, &tx, ControlMessage::Ping { timestamp: 42.0 });
        match rx.try_recv().unwrap() {
            OutboundMessage::Pong { timestamp } => assert_eq!(timestamp, 42.0),
            _ => panic!("expected pong"),
        }
    }

    #[tokio::test]
    async fn reset_clears_buffer_and_emits_status() {
        let session = new_session();
        session.lock().add_chunk(&vec![1u8; 100]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_control(&session, &tx, ControlMessage::Reset);
        assert_eq!(session.lock().buffered_bytes(), 0);
        match rx.try_recv().unwrap() {
            OutboundMessage::Status { status, .. } => assert_eq!(status, "reset_completed"),
            _ => panic!("expected status"),
        }
    }

    #[tokio::test]
    async fn config_switch_to_new_engine_rebuilds_recognizer() {
        let session = Arc::new(Mutex::new(Session::new(
            "s1".into(),
            AudioMetadata::default(),
            TranscriptionConfig {
                engine: "not-a-real-engine".to_string(),
                ..Default::default()
            },
        )));
        assert!(!session.lock().has_recognizer());

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut new_config = TranscriptionConfig {
            engine: "whisper".to_string(),
            ..Default::default()
        };
        new_config.normalize();
        handle_control(&session, &tx, ControlMessage::Config { data: new_config });

        assert!(session.lock().has_recognizer(), "switching to an available engine should rebuild the recognizer");
    }

    #[tokio::test]
    async fn config_switch_with_same_engine_does_not_needlessly_rebuild() {
        let session = new_session();
        assert!(session.lock().has_recognizer());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut new_config = TranscriptionConfig {
            vad_threshold: 0.7,
            ..Default::default()
        };
        new_config.normalize();
        handle_control(&session, &tx, ControlMessage::Config { data: new_config });
        let guard = session.lock();
        assert!(guard.has_recognizer());
        assert_eq!(guard.config.vad_threshold, 0.7);
    }

    #[tokio::test]
    async fn dispatcher_exits_when_channel_closed() {
        let session = new_session();
        let (outbound_tx, _outbound_rx) = mpsc::unbounded_channel();
        let handle = spawn(session.clone(), outbound_tx);
        drop(handle.tx);
        let result = tokio::time::timeout(Duration::from_secs(1), handle.task).await;
        assert!(result.is_ok(), "dispatcher task should exit promptly after channel close");
        assert!(!session.lock().is_processing);
    }
}
