// GStreamer-backed container sink
//
// Pipeline: two appsrc elements (video, audio) -> matroskamux -> filesink.
// Construction is cheap; the pipeline itself is only built when `begin` is
// called with the true geometry of the first delivered frame.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_audio as gst_audio;
use parking_lot::RwLock;

use crate::formats::SampleDepth;

use super::{Result, Rotation, VideoTrackDescriptor, WriterError};

/// The two tracks of the output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    Video,
    Audio,
}

/// A closed, fully flushed container file
#[derive(Debug, Clone)]
pub struct FinalizedContainer {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Audio track parameters, fixed at sink creation. The video track shape is
/// only known once the first frame arrives and comes in via `begin`.
#[derive(Debug, Clone)]
pub struct SinkParams {
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
}

/// Destination for muxed media samples.
///
/// Implementations own the output file. Append calls are only valid between
/// a successful `begin` and `finish_tracks`; `track_ready` must be consulted
/// before every append and may flip independently per track.
pub trait ContainerSink: Send + Sync {
    /// Build the muxing pipeline for the given video track shape. Returns
    /// `WriterError::DepthUnavailable` when the requested sample depth is
    /// rejected, so the caller can retry with a narrower one.
    fn begin(&self, video: &VideoTrackDescriptor) -> Result<()>;

    /// Whether the track can accept another sample right now
    fn track_ready(&self, track: Track) -> bool;

    /// Append one timestamped sample to a track
    fn append(&self, track: Track, pts: Duration, data: &[u8]) -> Result<()>;

    /// Mark both tracks complete. No appends may follow.
    fn finish_tracks(&self);

    /// Flush the mux queue and close the file
    fn finalize(&self) -> Result<FinalizedContainer>;
}

/// Creates container sinks for new recordings
pub trait ContainerFactory: Send + Sync {
    fn create(&self, path: &Path, params: &SinkParams) -> Box<dyn ContainerSink>;
}

// Queue limits for the appsrc elements. A track whose queue is at capacity
// reports not-ready and the writer drops the sample instead of blocking.
const VIDEO_QUEUE_FRAMES: u64 = 4;
const AUDIO_QUEUE_BYTES: u64 = 1024 * 1024;

struct SinkInner {
    pipeline: gst::Pipeline,
    video_src: gst_app::AppSrc,
    audio_src: gst_app::AppSrc,
}

/// What the bounded bus wait during finalize observed
#[derive(Debug)]
enum BusWait {
    Eos,
    Error(String),
    TimedOut,
}

fn flush_outcome(wait: BusWait) -> Result<()> {
    match wait {
        BusWait::Eos => Ok(()),
        BusWait::Error(err) => Err(WriterError::Pipeline(err)),
        BusWait::TimedOut => Err(WriterError::Pipeline(
            "Timed out waiting for end of stream before close".to_string(),
        )),
    }
}

/// `ContainerSink` writing Matroska through GStreamer
pub struct GstContainerSink {
    path: PathBuf,
    params: SinkParams,
    inner: RwLock<Option<SinkInner>>,
}

impl GstContainerSink {
    pub fn new(path: &Path, params: &SinkParams) -> Self {
        Self {
            path: path.to_path_buf(),
            params: params.clone(),
            inner: RwLock::new(None),
        }
    }

    fn build_pipeline(&self, video: &VideoTrackDescriptor) -> Result<SinkInner> {
        gst::init().map_err(|e| WriterError::Pipeline(format!("GStreamer init: {}", e)))?;

        let pipeline = gst::Pipeline::new();

        let video_caps = gst::Caps::builder("video/x-raw")
            .field("format", video.depth.gst_format())
            .field("width", video.width as i32)
            .field("height", video.height as i32)
            .field("framerate", gst::Fraction::new(video.frame_rate as i32, 1))
            .build();

        let bytes_per_frame = frame_bytes(video.width, video.height, video.depth);
        let video_src = gst_app::AppSrc::builder()
            .name("video_src")
            .caps(&video_caps)
            .format(gst::Format::Time)
            .max_bytes(bytes_per_frame * VIDEO_QUEUE_FRAMES)
            .build();

        let audio_info = gst_audio::AudioInfo::builder(
            gst_audio::AudioFormat::F32le,
            self.params.audio_sample_rate,
            self.params.audio_channels as u32,
        )
        .build()
        .map_err(|e| WriterError::Pipeline(format!("Failed to create audio info: {}", e)))?;
        let audio_caps = audio_info
            .to_caps()
            .map_err(|e| WriterError::Pipeline(format!("Failed to create audio caps: {}", e)))?;

        let audio_src = gst_app::AppSrc::builder()
            .name("audio_src")
            .caps(&audio_caps)
            .format(gst::Format::Time)
            .max_bytes(AUDIO_QUEUE_BYTES)
            .build();

        let muxer = gst::ElementFactory::make("matroskamux")
            .property("writing-app", "camcord")
            .build()
            .map_err(|e| WriterError::Pipeline(format!("Failed to create matroskamux: {}", e)))?;

        let filesink = gst::ElementFactory::make("filesink")
            .property("location", self.path.to_string_lossy().to_string())
            .property("async", false)
            .build()
            .map_err(|e| WriterError::Pipeline(format!("Failed to create filesink: {}", e)))?;

        pipeline
            .add_many([
                video_src.upcast_ref(),
                audio_src.upcast_ref(),
                &muxer,
                &filesink,
            ])
            .map_err(|e| WriterError::Pipeline(format!("Failed to add elements: {}", e)))?;

        video_src
            .link(&muxer)
            .map_err(|e| WriterError::Pipeline(format!("Failed to link video track: {}", e)))?;
        audio_src
            .link(&muxer)
            .map_err(|e| WriterError::Pipeline(format!("Failed to link audio track: {}", e)))?;
        muxer
            .link(&filesink)
            .map_err(|e| WriterError::Pipeline(format!("Failed to link filesink: {}", e)))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            // 10-bit caps are the usual negotiation failure; report it as such
            // so the writer retries with the narrower depth.
            if video.depth == SampleDepth::Ten {
                return Err(WriterError::DepthUnavailable);
            }
            return Err(WriterError::Pipeline(format!(
                "Failed to start mux pipeline: {:?}",
                e
            )));
        }

        // Orientation is container metadata only; frame bytes pass through
        // untouched.
        if let Some(tag) = video.rotation.orientation_tag() {
            let mut tags = gst::TagList::new();
            {
                let tags = tags
                    .get_mut()
                    .expect("BUG: freshly created tag list has refcount > 1");
                tags.add::<gst::tags::ImageOrientation>(&tag, gst::TagMergeMode::Replace);
            }
            video_src.send_event(gst::event::Tag::new(tags));
        }

        log::info!(
            "Mux pipeline started: {}x{} @ {}fps {}-bit, {}Hz {}ch -> {:?}",
            video.width,
            video.height,
            video.frame_rate,
            video.depth.bits(),
            self.params.audio_sample_rate,
            self.params.audio_channels,
            self.path
        );

        Ok(SinkInner {
            pipeline,
            video_src,
            audio_src,
        })
    }
}

/// Bytes per uncompressed 4:2:0 frame at the given depth
fn frame_bytes(width: u32, height: u32, depth: SampleDepth) -> u64 {
    let luma = width as u64 * height as u64;
    let per_component = match depth {
        SampleDepth::Eight => 1,
        SampleDepth::Ten => 2,
    };
    luma * 3 / 2 * per_component
}

impl ContainerSink for GstContainerSink {
    fn begin(&self, video: &VideoTrackDescriptor) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.is_some() {
            return Err(WriterError::Pipeline("sink already begun".to_string()));
        }
        *inner = Some(self.build_pipeline(video)?);
        Ok(())
    }

    fn track_ready(&self, track: Track) -> bool {
        let inner = self.inner.read();
        let Some(inner) = inner.as_ref() else {
            return false;
        };
        let src = match track {
            Track::Video => &inner.video_src,
            Track::Audio => &inner.audio_src,
        };
        src.current_level_bytes() < src.max_bytes()
    }

    fn append(&self, track: Track, pts: Duration, data: &[u8]) -> Result<()> {
        let inner = self.inner.read();
        let Some(inner) = inner.as_ref() else {
            return Err(WriterError::Pipeline("sink not begun".to_string()));
        };
        let src = match track {
            Track::Video => &inner.video_src,
            Track::Audio => &inner.audio_src,
        };

        let mut buffer = gst::Buffer::from_slice(data.to_vec());
        {
            let buffer_ref = buffer
                .get_mut()
                .expect("BUG: freshly created buffer has refcount > 1");
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts.as_nanos() as u64));
        }

        src.push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| WriterError::Pipeline(format!("Failed to push buffer: {:?}", e)))
    }

    fn finish_tracks(&self) {
        let inner = self.inner.read();
        if let Some(inner) = inner.as_ref() {
            if let Err(e) = inner.video_src.end_of_stream() {
                log::warn!("Failed to send video EOS: {:?}", e);
            }
            if let Err(e) = inner.audio_src.end_of_stream() {
                log::warn!("Failed to send audio EOS: {:?}", e);
            }
        }
    }

    fn finalize(&self) -> Result<FinalizedContainer> {
        let inner = self.inner.write().take();
        let Some(inner) = inner else {
            return Err(WriterError::Pipeline("sink not begun".to_string()));
        };

        // Wait for EOS to reach the filesink so the mux queue is flushed
        // before the file is handed off. The wait expiring means the muxer
        // never confirmed the flush; the file may lack its index and must
        // not be reported as a durable container.
        let mut wait = BusWait::TimedOut;
        if let Some(bus) = inner.pipeline.bus() {
            for msg in bus.iter_timed(gst::ClockTime::from_seconds(5)) {
                match msg.view() {
                    gst::MessageView::Eos(..) => {
                        wait = BusWait::Eos;
                        break;
                    }
                    gst::MessageView::Error(err) => {
                        wait = BusWait::Error(format!("{} ({:?})", err.error(), err.debug()));
                        break;
                    }
                    _ => {}
                }
            }
        }

        let _ = inner.pipeline.set_state(gst::State::Null);
        flush_outcome(wait)?;

        let size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(FinalizedContainer {
            path: self.path.clone(),
            size_bytes,
        })
    }
}

impl Drop for GstContainerSink {
    fn drop(&mut self) {
        // Covers error paths where finalize() was never reached
        if let Some(inner) = self.inner.write().take() {
            let _ = inner.pipeline.set_state(gst::State::Null);
        }
    }
}

/// Factory producing `GstContainerSink` instances
pub struct GstContainerFactory;

impl ContainerFactory for GstContainerFactory {
    fn create(&self, path: &Path, params: &SinkParams) -> Box<dyn ContainerSink> {
        Box::new(GstContainerSink::new(path, params))
    }
}

impl Rotation {
    /// Matroska image-orientation tag value, None for the identity
    pub(crate) fn orientation_tag(&self) -> Option<&'static str> {
        match self {
            Rotation::Identity => None,
            Rotation::Quarter => Some("rotate-90"),
            Rotation::ThreeQuarter => Some("rotate-270"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_confirmed_by_eos_succeeds() {
        assert!(flush_outcome(BusWait::Eos).is_ok());
    }

    #[test]
    fn flush_timeout_is_a_failure_not_a_finished_container() {
        let result = flush_outcome(BusWait::TimedOut);
        match result {
            Err(WriterError::Pipeline(message)) => {
                assert!(message.contains("Timed out"));
            }
            other => panic!("expected pipeline error, got {:?}", other),
        }
    }

    #[test]
    fn flush_surfaces_the_bus_error() {
        let result = flush_outcome(BusWait::Error("muxer exploded".to_string()));
        match result {
            Err(WriterError::Pipeline(message)) => assert_eq!(message, "muxer exploded"),
            other => panic!("expected pipeline error, got {:?}", other),
        }
    }
}
