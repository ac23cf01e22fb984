// Recording lifecycle coordination and asset handoff

pub mod coordinator;
pub mod store;

pub use coordinator::{LifecycleCoordinator, LifecycleEvent};
pub use store::{AssetStore, IngestReceipt, LibraryStore, StoreError};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::capture::{CaptureError, MediaType};
use crate::writer::WriterError;

/// One recording attempt's identity and staging location
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: Uuid,
    /// In-flight container file; deleted only after the asset store
    /// confirms ingestion.
    pub output_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// The durable result of a completed recording
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    /// Final location inside the asset store
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_secs: f64,
    pub dropped_video: u64,
    pub dropped_audio: u64,
    /// True when either depth negotiation or the mux pipeline settled on a
    /// narrower sample depth than preferred
    pub used_fallback_depth: bool,
}

/// Why a recording could not start
#[derive(Debug, Clone, thiserror::Error)]
pub enum StartError {
    #[error("No capture configuration meets the required capability")]
    ConfigurationUnavailable,

    #[error("Capture permission denied for {0}")]
    PermissionDenied(MediaType),

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("Recording session could not be started: {0}")]
    Session(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Why stop-and-save failed. Cloneable so every concurrent stop caller
/// observes the one shared outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SaveError {
    #[error("No recording in progress")]
    NotRecording,

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error("Asset store handoff failed: {0}")]
    Handoff(String),

    #[error("Save did not complete within the suspension budget")]
    SuspensionTimeout,
}
