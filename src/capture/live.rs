// Hardware capture source
//
// Video rides a GStreamer pipeline (device source -> capsfilter ->
// videoconvert -> capsfilter -> leaky queue -> appsink); audio comes from a
// cpal input stream. cpal streams are not Send, so the stream lives on a
// dedicated thread that start() spawns and halt() joins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use crate::formats::{CaptureFormat, SampleDepth, SelectedConfiguration};

use super::{CaptureError, CaptureSource, MediaSample, Result, SampleStreams};

const VIDEO_CHANNEL_DEPTH: usize = 64;
const AUDIO_CHANNEL_DEPTH: usize = 256;

struct AudioCapture {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// `CaptureSource` backed by the first available camera and the default
/// audio input device
pub struct LiveCaptureSource {
    device: gst::Device,
    formats: Vec<CaptureFormat>,
    audio_sample_rate: u32,
    audio_channels: u16,
    pipeline: Option<gst::Pipeline>,
    audio: Option<AudioCapture>,
}

impl LiveCaptureSource {
    /// Probe the first video source the platform advertises
    pub fn open(audio_sample_rate: u32, audio_channels: u16) -> Result<Self> {
        gst::init().map_err(|e| CaptureError::Device(format!("GStreamer init: {}", e)))?;

        let monitor = gst::DeviceMonitor::new();
        monitor.add_filter(Some("Video/Source"), None);
        monitor
            .start()
            .map_err(|e| CaptureError::Device(format!("Device monitor: {}", e)))?;
        let devices = monitor.devices();
        monitor.stop();

        let device = devices
            .into_iter()
            .next()
            .ok_or_else(|| CaptureError::Device("No video capture device found".to_string()))?;

        let formats = device
            .caps()
            .map(|caps| formats_from_caps(&caps))
            .unwrap_or_default();

        log::info!(
            "Opened capture device '{}' with {} advertised formats",
            device.display_name(),
            formats.len()
        );

        Ok(Self {
            device,
            formats,
            audio_sample_rate,
            audio_channels,
            pipeline: None,
            audio: None,
        })
    }

    fn build_video_pipeline(
        &self,
        config: &SelectedConfiguration,
        sender: Sender<MediaSample>,
    ) -> Result<gst::Pipeline> {
        let pipeline = gst::Pipeline::new();

        let source = self
            .device
            .create_element(Some("source"))
            .map_err(|e| CaptureError::Device(format!("Failed to create source: {}", e)))?;

        let source_caps = gst::Caps::builder("video/x-raw")
            .field("width", config.format.width as i32)
            .field("height", config.format.height as i32)
            .field(
                "framerate",
                gst::Fraction::new(config.target_frame_rate as i32, 1),
            )
            .build();
        let source_filter = gst::ElementFactory::make("capsfilter")
            .property("caps", &source_caps)
            .build()
            .map_err(|e| CaptureError::Device(format!("Failed to create capsfilter: {}", e)))?;

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| CaptureError::Device(format!("Failed to create videoconvert: {}", e)))?;

        // Normalize to the negotiated sample depth before delivery
        let output_caps = gst::Caps::builder("video/x-raw")
            .field("format", config.sample_depth.gst_format())
            .build();
        let output_filter = gst::ElementFactory::make("capsfilter")
            .property("caps", &output_caps)
            .build()
            .map_err(|e| CaptureError::Device(format!("Failed to create capsfilter: {}", e)))?;

        let queue = gst::ElementFactory::make("queue")
            .property("max-size-buffers", 60u32)
            .property_from_str("leaky", "downstream")
            .build()
            .map_err(|e| CaptureError::Device(format!("Failed to create queue: {}", e)))?;

        let appsink = gst_app::AppSink::builder()
            .name("sink")
            .max_buffers(2)
            .drop(true)
            .sync(false)
            .build();

        pipeline
            .add_many([
                &source,
                &source_filter,
                &videoconvert,
                &output_filter,
                &queue,
                appsink.upcast_ref(),
            ])
            .map_err(|e| CaptureError::Device(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many([
            &source,
            &source_filter,
            &videoconvert,
            &output_filter,
            &queue,
            appsink.upcast_ref(),
        ])
        .map_err(|e| CaptureError::Device(format!("Failed to link pipeline: {}", e)))?;

        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    match sink.pull_sample() {
                        Ok(sample) => {
                            let info = sample
                                .caps()
                                .and_then(|caps| gst_video::VideoInfo::from_caps(caps).ok());
                            if let (Some(buffer), Some(info)) = (sample.buffer(), info) {
                                let pts = buffer
                                    .pts()
                                    .map(|t| Duration::from_nanos(t.nseconds()))
                                    .unwrap_or(Duration::ZERO);
                                if let Ok(map) = buffer.map_readable() {
                                    let media = MediaSample::video(
                                        pts,
                                        Arc::from(map.as_slice().to_vec().into_boxed_slice()),
                                        info.width(),
                                        info.height(),
                                    );
                                    // Full channel means the consumer is behind;
                                    // shed the frame rather than stall capture.
                                    let _ = sender.try_send(media);
                                }
                            }
                            Ok(gst::FlowSuccess::Ok)
                        }
                        Err(_) => Err(gst::FlowError::Error),
                    }
                })
                .build(),
        );

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CaptureError::Device(format!("Failed to start capture: {:?}", e)))?;

        Ok(pipeline)
    }

    fn spawn_audio_capture(
        &self,
        sender: Sender<MediaSample>,
        epoch: Instant,
    ) -> Result<AudioCapture> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = stop.clone();
        let sample_rate = self.audio_sample_rate;
        let channels = self.audio_channels;

        let thread = std::thread::Builder::new()
            .name("camcord-mic".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_input_device() else {
                    log::error!("No audio input device available");
                    return;
                };

                let stream_config = cpal::StreamConfig {
                    channels,
                    sample_rate: cpal::SampleRate(sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                };

                let stream = device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let pts = epoch.elapsed();
                        let bytes: Vec<u8> =
                            data.iter().copied().flat_map(f32::to_le_bytes).collect();
                        let media =
                            MediaSample::audio(pts, Arc::from(bytes.into_boxed_slice()));
                        let _ = sender.try_send(media);
                    },
                    |e| {
                        log::error!("Audio input stream error: {}", e);
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        log::error!("Failed to build audio input stream: {}", e);
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    log::error!("Failed to start audio input stream: {}", e);
                    return;
                }

                // The stream must be dropped on this thread; park until halt
                while !stop_for_thread.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                drop(stream);
            })
            .map_err(|e| CaptureError::Device(format!("Failed to spawn audio thread: {}", e)))?;

        Ok(AudioCapture { stop, thread })
    }
}

impl CaptureSource for LiveCaptureSource {
    fn formats(&self) -> Vec<CaptureFormat> {
        self.formats.clone()
    }

    fn supported_depths(&self) -> Vec<SampleDepth> {
        // videoconvert can widen 8-bit sources, but 10-bit delivery needs a
        // format that actually carries it.
        let has_ten = self
            .formats
            .iter()
            .any(|f| f.supports_hdr || f.pixel_format.starts_with("P010"));
        if has_ten {
            vec![SampleDepth::Ten, SampleDepth::Eight]
        } else {
            vec![SampleDepth::Eight]
        }
    }

    fn start(&mut self, config: &SelectedConfiguration) -> Result<SampleStreams> {
        let (vtx, vrx) = bounded(VIDEO_CHANNEL_DEPTH);
        let (atx, arx) = bounded(AUDIO_CHANNEL_DEPTH);

        let epoch = Instant::now();
        let pipeline = self.build_video_pipeline(config, vtx)?;
        let audio = self.spawn_audio_capture(atx, epoch)?;

        self.pipeline = Some(pipeline);
        self.audio = Some(audio);

        log::info!(
            "Live capture running: {} @ {}fps, {}-bit",
            config.format,
            config.target_frame_rate,
            config.sample_depth.bits()
        );

        Ok(SampleStreams {
            video: vrx,
            audio: arx,
        })
    }

    fn halt(&mut self) -> Result<()> {
        if let Some(pipeline) = self.pipeline.take() {
            // Dropping the pipeline releases the appsink callback and with
            // it the video sender, disconnecting that delivery path.
            let _ = pipeline.set_state(gst::State::Null);
        }
        if let Some(audio) = self.audio.take() {
            audio.stop.store(true, Ordering::SeqCst);
            if audio.thread.join().is_err() {
                log::error!("Audio capture thread panicked");
            }
        }
        Ok(())
    }
}

impl Drop for LiveCaptureSource {
    fn drop(&mut self) {
        let _ = self.halt();
    }
}

/// Walk advertised device caps into the selector's format list
fn formats_from_caps(caps: &gst::Caps) -> Vec<CaptureFormat> {
    let mut formats = Vec::new();
    for i in 0..caps.size() {
        let Some(structure) = caps.structure(i) else {
            continue;
        };
        if structure.name().as_str() != "video/x-raw" {
            continue;
        }
        let (Ok(width), Ok(height)) = (
            structure.get::<i32>("width"),
            structure.get::<i32>("height"),
        ) else {
            continue;
        };
        let Some(max_frame_rate) = max_framerate(structure) else {
            continue;
        };

        let pixel_format = structure
            .get::<String>("format")
            .unwrap_or_else(|_| "NV12".to_string());

        // BT.2020/BT.2100 colorimetry is how cameras advertise HDR delivery
        let supports_hdr = structure
            .get::<String>("colorimetry")
            .map(|c| c.contains("2100") || c.contains("2020"))
            .unwrap_or(false);

        formats.push(CaptureFormat {
            width: width as u32,
            height: height as u32,
            max_frame_rate,
            supports_hdr,
            pixel_format,
        });
    }
    formats
}

/// Highest frame rate a caps structure offers, whether it advertises a
/// single fraction, a list, or a range
fn max_framerate(structure: &gst::StructureRef) -> Option<u32> {
    if let Ok(fraction) = structure.get::<gst::Fraction>("framerate") {
        return fraction_fps(fraction);
    }
    if let Ok(list) = structure.get::<gst::List>("framerate") {
        return list
            .iter()
            .filter_map(|v| v.get::<gst::Fraction>().ok())
            .filter_map(fraction_fps)
            .max();
    }
    if let Ok(range) = structure.get::<gst::FractionRange>("framerate") {
        return fraction_fps(range.max());
    }
    None
}

fn fraction_fps(fraction: gst::Fraction) -> Option<u32> {
    if fraction.denom() <= 0 || fraction.numer() <= 0 {
        return None;
    }
    Some((fraction.numer() as f64 / fraction.denom() as f64).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gstreamer as gst;

    fn init() {
        gst::init().unwrap();
    }

    #[test]
    fn caps_walk_extracts_fixed_structures() {
        init();
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "NV12")
            .field("width", 1920i32)
            .field("height", 1080i32)
            .field("framerate", gst::Fraction::new(30, 1))
            .build();

        let formats = formats_from_caps(&caps);
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].width, 1920);
        assert_eq!(formats[0].max_frame_rate, 30);
        assert!(!formats[0].supports_hdr);
        assert_eq!(formats[0].pixel_format, "NV12");
    }

    #[test]
    fn caps_walk_skips_non_raw_structures() {
        init();
        let mut caps = gst::Caps::builder("image/jpeg")
            .field("width", 1920i32)
            .field("height", 1080i32)
            .field("framerate", gst::Fraction::new(30, 1))
            .build();
        caps.get_mut().unwrap().append(
            gst::Caps::builder("video/x-raw")
                .field("format", "YUY2")
                .field("width", 1280i32)
                .field("height", 720i32)
                .field("framerate", gst::Fraction::new(60, 1))
                .build(),
        );

        let formats = formats_from_caps(&caps);
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].pixel_format, "YUY2");
    }

    #[test]
    fn bt2020_colorimetry_marks_hdr() {
        init();
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "P010_10LE")
            .field("width", 3840i32)
            .field("height", 2160i32)
            .field("framerate", gst::Fraction::new(120, 1))
            .field("colorimetry", "bt2100-pq")
            .build();

        let formats = formats_from_caps(&caps);
        assert!(formats[0].supports_hdr);
    }

    #[test]
    fn fractional_framerates_round_to_whole_fps() {
        init();
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "NV12")
            .field("width", 1920i32)
            .field("height", 1080i32)
            .field("framerate", gst::Fraction::new(30000, 1001))
            .build();

        let formats = formats_from_caps(&caps);
        assert_eq!(formats[0].max_frame_rate, 30);
    }
}
