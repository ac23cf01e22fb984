// Deferred-init sample writer
//
// The writer is created before any media exists and builds its container
// sink lazily from the first video sample's true geometry. Its public
// surface never errors on the hot path: a sample that can't be written is
// dropped and counted, and failures latch until `finish` reports them.

pub mod container;

pub use container::{
    ContainerFactory, ContainerSink, FinalizedContainer, GstContainerFactory, GstContainerSink,
    SinkParams, Track,
};

use std::time::Duration;

use parking_lot::Mutex;

use crate::capture::{Geometry, MediaSample, MediaType};
use crate::formats::{SampleDepth, SelectedConfiguration};

/// Error type for writer operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum WriterError {
    #[error("Mux pipeline error: {0}")]
    Pipeline(String),

    #[error("Requested sample depth rejected by the output pipeline")]
    DepthUnavailable,

    #[error("No video samples arrived before stop")]
    NoSamples,
}

pub type Result<T> = std::result::Result<T, WriterError>;

/// Writer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Created; waiting for the first video sample to size the container
    Unknown,
    Writing,
    Finished,
    Failed,
}

/// Metadata-only orientation correction applied to the video track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Identity,
    /// 90 degrees clockwise
    Quarter,
    /// 90 degrees counter-clockwise
    ThreeQuarter,
}

/// Shape of the video track, derived from the first delivered sample
#[derive(Debug, Clone)]
pub struct VideoTrackDescriptor {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub depth: SampleDepth,
    pub rotation: Rotation,
}

/// What a completed recording produced
#[derive(Debug, Clone)]
pub struct WriterSummary {
    pub container: FinalizedContainer,
    /// Content length measured from rebased video timestamps
    pub duration: Duration,
    pub dropped_video: u64,
    pub dropped_audio: u64,
    /// Audio samples that arrived before the anchoring video sample;
    /// included in `dropped_audio` as well.
    pub dropped_pre_anchor: u64,
    pub used_fallback_depth: bool,
}

struct WriterCore {
    state: WriterState,
    /// Capture-clock timestamp of the first video sample; every written PTS
    /// is rebased against it so the container starts at zero.
    anchor: Option<Duration>,
    content_end: Duration,
    dropped_video: u64,
    dropped_audio: u64,
    dropped_pre_anchor: u64,
    used_fallback_depth: bool,
    failure: Option<WriterError>,
}

/// Routes capture samples into a container sink.
///
/// Shared between the two delivery consumer threads. Bookkeeping sits
/// behind one mutex, but the sink push happens outside it, so a slow push
/// on one track never stalls the other.
pub struct SampleWriter {
    sink: Box<dyn ContainerSink>,
    selected: SelectedConfiguration,
    core: Mutex<WriterCore>,
}

impl SampleWriter {
    pub fn new(sink: Box<dyn ContainerSink>, selected: SelectedConfiguration) -> Self {
        Self {
            sink,
            selected,
            core: Mutex::new(WriterCore {
                state: WriterState::Unknown,
                anchor: None,
                content_end: Duration::ZERO,
                dropped_video: 0,
                dropped_audio: 0,
                dropped_pre_anchor: 0,
                used_fallback_depth: false,
                failure: None,
            }),
        }
    }

    pub fn state(&self) -> WriterState {
        self.core.lock().state
    }

    /// Append one sample. Never errors: problems are counted or latched
    /// into the writer state and surfaced by `finish`.
    pub fn append(&self, sample: &MediaSample) {
        let track = match sample.media_type {
            MediaType::Video => Track::Video,
            MediaType::Audio => Track::Audio,
        };

        let pts = {
            let mut core = self.core.lock();

            match core.state {
                WriterState::Unknown => match sample.media_type {
                    MediaType::Audio => {
                        // Nothing anchors the timeline yet; audio can't be
                        // placed and is dropped rather than buffered.
                        core.dropped_pre_anchor += 1;
                        core.dropped_audio += 1;
                        return;
                    }
                    MediaType::Video => {
                        if let Err(e) = self.begin_from_first_sample(&mut core, sample) {
                            log::error!("Failed to start container sink: {}", e);
                            core.state = WriterState::Failed;
                            core.failure = Some(e);
                            return;
                        }
                        core.state = WriterState::Writing;
                    }
                },
                WriterState::Writing => {}
                WriterState::Finished | WriterState::Failed => {
                    match sample.media_type {
                        MediaType::Video => core.dropped_video += 1,
                        MediaType::Audio => core.dropped_audio += 1,
                    }
                    return;
                }
            }

            if core.anchor.is_none() && sample.media_type == MediaType::Audio {
                core.dropped_pre_anchor += 1;
                core.dropped_audio += 1;
                return;
            }

            // Backpressure: a full track sheds the sample instead of blocking
            // the delivery thread.
            if !self.sink.track_ready(track) {
                match track {
                    Track::Video => core.dropped_video += 1,
                    Track::Audio => core.dropped_audio += 1,
                }
                return;
            }

            // Only a video sample reaches here with no anchor; the first one
            // that passes the readiness check becomes the container's
            // time-zero. A shed first frame does not anchor anything.
            let anchor = *core.anchor.get_or_insert(sample.pts);
            let pts = sample.pts.saturating_sub(anchor);

            if sample.media_type == MediaType::Video {
                let frame = Duration::from_nanos(
                    1_000_000_000 / self.selected.target_frame_rate.max(1) as u64,
                );
                let end = pts + frame;
                if end > core.content_end {
                    core.content_end = end;
                }
            }
            pts
        };

        // The lock is released for the push itself so the two delivery
        // threads only serialize on bookkeeping, not on each other's track.
        if let Err(e) = self.sink.append(track, pts, &sample.data) {
            log::error!("Append failed on {} track: {}", sample.media_type, e);
            let mut core = self.core.lock();
            if core.state == WriterState::Writing {
                core.state = WriterState::Failed;
                core.failure = Some(e);
            }
        }
    }

    fn begin_from_first_sample(&self, core: &mut WriterCore, sample: &MediaSample) -> Result<()> {
        let delivered = sample.geometry.unwrap_or(Geometry {
            width: self.selected.format.width,
            height: self.selected.format.height,
        });
        let rotation = orientation_correction(&self.selected, delivered);
        if rotation != Rotation::Identity {
            log::info!(
                "Delivered geometry {}x{} disagrees with selected orientation, tagging {:?}",
                delivered.width,
                delivered.height,
                rotation
            );
        }

        let mut descriptor = VideoTrackDescriptor {
            width: delivered.width,
            height: delivered.height,
            frame_rate: self.selected.target_frame_rate,
            depth: self.selected.sample_depth,
            rotation,
        };

        match self.sink.begin(&descriptor) {
            Ok(()) => Ok(()),
            Err(WriterError::DepthUnavailable) if descriptor.depth == SampleDepth::Ten => {
                log::warn!("10-bit output unavailable, retrying with 8-bit");
                descriptor.depth = SampleDepth::Eight;
                self.sink.begin(&descriptor)?;
                core.used_fallback_depth = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Close out both tracks and finalize the container.
    ///
    /// On a latched failure the stored error is returned, but the sink is
    /// still finalized so whatever was flushed before the failure survives
    /// on disk for a salvage ingest.
    pub fn finish(&self) -> Result<WriterSummary> {
        let mut core = self.core.lock();

        match core.state {
            WriterState::Unknown => {
                core.state = WriterState::Failed;
                core.failure = Some(WriterError::NoSamples);
                Err(WriterError::NoSamples)
            }
            WriterState::Failed => {
                self.sink.finish_tracks();
                let _ = self.sink.finalize();
                Err(core
                    .failure
                    .clone()
                    .unwrap_or_else(|| WriterError::Pipeline("unknown failure".to_string())))
            }
            WriterState::Finished => {
                Err(WriterError::Pipeline("writer already finalized".to_string()))
            }
            WriterState::Writing => {
                self.sink.finish_tracks();
                match self.sink.finalize() {
                    Ok(container) => {
                        core.state = WriterState::Finished;
                        Ok(WriterSummary {
                            container,
                            duration: core.content_end,
                            dropped_video: core.dropped_video,
                            dropped_audio: core.dropped_audio,
                            dropped_pre_anchor: core.dropped_pre_anchor,
                            used_fallback_depth: core.used_fallback_depth,
                        })
                    }
                    Err(e) => {
                        core.state = WriterState::Failed;
                        core.failure = Some(e.clone());
                        Err(e)
                    }
                }
            }
        }
    }
}

/// Decide the metadata rotation from the selected format's orientation
/// versus what the device actually delivered.
fn orientation_correction(selected: &SelectedConfiguration, delivered: Geometry) -> Rotation {
    let target_portrait = selected.format.height > selected.format.width;
    match (target_portrait, delivered.is_portrait()) {
        (true, false) => Rotation::Quarter,
        (false, true) => Rotation::ThreeQuarter,
        _ => Rotation::Identity,
    }
}
