//! # wavecast-core
//!
//! Real-time speech-to-text streaming engine: sessions, voice-activity
//! segmentation, and a pluggable recognizer abstraction.
//!
//! ## Architecture
//!
//! ```text
//! Transport adapter → Session::add_chunk → ring buffer
//!                                               │
//!                                     dispatcher: extract_window
//!                                               │
//!                                         VAD classification
//!                                               │
//!                                    Recognizer::process_audio
//!                                               │
//!                                   OutboundMessage → transport adapter
//! ```
//!
//! Control frames (ping/metadata/config/reset) and audio frames share one
//! channel per session, so both are handled by the same single-threaded
//! task in arrival order — see [`dispatcher`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ipc;
pub mod recognizer;
pub mod session;

pub use dispatcher::{DispatcherHandle, SessionMsg};
pub use error::{Result, WavecastError};
pub use ipc::{ControlMessage, OutboundMessage};
pub use recognizer::{Recognizer, RecognizerParams, TranscriptResult};
pub use session::manager::SessionManager;
pub use session::{AudioMetadata, Session, TranscriptionConfig};
