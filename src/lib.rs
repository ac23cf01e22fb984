// camcord - capture-to-file recording pipeline
// Main library entry point

pub mod capture;
pub mod config;
pub mod formats;
pub mod session;
pub mod writer;

pub use capture::{CaptureSource, MediaSample, MediaType, PermissionBroker, PermissionStatus};
pub use config::RecorderConfig;
pub use formats::{CaptureFormat, FormatPolicy, SampleDepth, SelectedConfiguration};
pub use session::{
    AssetStore, LifecycleCoordinator, LifecycleEvent, RecordingArtifact, SaveError, StartError,
};
pub use writer::{ContainerSink, SampleWriter, WriterState};
