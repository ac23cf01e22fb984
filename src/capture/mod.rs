// Capture session control and hardware abstraction

pub mod controller;
pub mod live;

pub use controller::{SessionController, SessionState};
pub use live::LiveCaptureSource;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::formats::{CaptureFormat, SampleDepth, SelectedConfiguration};

/// Error type for capture operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("Invalid session state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("No capture format meets the minimum resolution tier")]
    NoUsableFormat,

    #[error("Device advertises no supported sample depth")]
    NoSupportedDepth,

    #[error("Device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Kind of media a sample carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Video => write!(f, "video"),
            MediaType::Audio => write!(f, "audio"),
        }
    }
}

/// True pixel dimensions of a delivered video buffer.
///
/// May disagree with the advertised `CaptureFormat` when orientation
/// correction happens upstream of delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

/// One sample delivered by the hardware abstraction.
///
/// Transient: borrowed by the writer for the duration of a single append
/// call, never retained.
#[derive(Debug, Clone)]
pub struct MediaSample {
    pub media_type: MediaType,
    /// Presentation timestamp on the capture clock
    pub pts: Duration,
    pub data: Arc<[u8]>,
    /// Delivered geometry; present for video samples only
    pub geometry: Option<Geometry>,
}

impl MediaSample {
    pub fn video(pts: Duration, data: Arc<[u8]>, width: u32, height: u32) -> Self {
        Self {
            media_type: MediaType::Video,
            pts,
            data,
            geometry: Some(Geometry { width, height }),
        }
    }

    pub fn audio(pts: Duration, data: Arc<[u8]>) -> Self {
        Self {
            media_type: MediaType::Audio,
            pts,
            data,
            geometry: None,
        }
    }
}

/// The two independent delivery paths of a running capture session
pub struct SampleStreams {
    pub video: Receiver<MediaSample>,
    pub audio: Receiver<MediaSample>,
}

/// Hardware capture device abstraction.
///
/// The sole source of `CaptureFormat` and `MediaSample` data. Implementations
/// deliver samples through bounded channels and may drop frames when a
/// channel is full - delivery never blocks the device.
pub trait CaptureSource: Send {
    /// Advertised capture formats, enumerated at configuration time
    fn formats(&self) -> Vec<CaptureFormat>;

    /// Sample depths the device can deliver, widest first
    fn supported_depths(&self) -> Vec<SampleDepth>;

    /// Begin producing samples on both delivery paths
    fn start(&mut self, config: &SelectedConfiguration) -> Result<SampleStreams>;

    /// Halt the underlying session. Senders are dropped so the delivery
    /// channels disconnect once in-flight samples drain.
    fn halt(&mut self) -> Result<()>;
}

/// Result of a permission query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// Capture permission broker.
///
/// The pipeline refuses to configure without a granted result for both video
/// and audio; prompting UI is the embedder's concern.
pub trait PermissionBroker: Send + Sync {
    fn status(&self, media: MediaType) -> PermissionStatus;

    /// Request a grant, blocking until the user (or platform) answers.
    /// Defaults to returning the current status unchanged.
    fn request(&self, media: MediaType) -> PermissionStatus {
        self.status(media)
    }
}

/// Broker for platforms without a capture permission model
pub struct AlwaysGranted;

impl PermissionBroker for AlwaysGranted {
    fn status(&self, _media: MediaType) -> PermissionStatus {
        PermissionStatus::Granted
    }
}
