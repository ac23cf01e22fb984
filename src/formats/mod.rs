// Capture format catalog and selection

pub mod selector;

pub use selector::{select_best_format, supports_required_capability};

use serde::{Deserialize, Serialize};

/// A candidate hardware capture configuration, as advertised by the device.
///
/// Enumerated once at session configuration time and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    /// Highest frame rate the device can deliver at this resolution
    pub max_frame_rate: u32,
    /// Whether the format can deliver high-dynamic-range frames
    pub supports_hdr: bool,
    /// FourCC-style pixel format name (e.g. "NV12", "P010", "MJPG").
    /// Ignored by the selector; used by the capture source to build caps.
    pub pixel_format: String,
}

impl std::fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ {}fps{}",
            self.width,
            self.height,
            self.max_frame_rate,
            if self.supports_hdr { " HDR" } else { "" }
        )
    }
}

/// Pixel sample depth for the encoded output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleDepth {
    /// 8 bits per component
    Eight,
    /// 10 bits per component (required for HDR output)
    Ten,
}

impl SampleDepth {
    /// Negotiation order, widest first. Selecting anything past the first
    /// entry counts as a fallback.
    pub const PREFERENCE: &'static [SampleDepth] = &[SampleDepth::Ten, SampleDepth::Eight];

    /// GStreamer video/x-raw format string for this depth
    pub fn gst_format(&self) -> &'static str {
        match self {
            SampleDepth::Eight => "NV12",
            SampleDepth::Ten => "P010_10LE",
        }
    }

    pub fn bits(&self) -> u32 {
        match self {
            SampleDepth::Eight => 8,
            SampleDepth::Ten => 10,
        }
    }
}

/// The selector's output: one format plus the derived target rate and the
/// negotiated sample depth. Chosen once per session start.
///
/// Invariant: `target_frame_rate <= format.max_frame_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedConfiguration {
    pub format: CaptureFormat,
    pub target_frame_rate: u32,
    pub sample_depth: SampleDepth,
}

/// Resolution tier a candidate format falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    High,
    Fallback,
}

/// Thresholds driving format selection and the capability floor.
///
/// The floor and tier values are deliberately configuration, not constants:
/// they differ per product and the capability check must be tunable without
/// touching the scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatPolicy {
    /// Minimum (width, height) for the preferred resolution tier
    #[serde(default = "default_high_tier")]
    pub high_tier: (u32, u32),
    /// Minimum (width, height) for the lowest acceptable tier
    #[serde(default = "default_fallback_tier")]
    pub fallback_tier: (u32, u32),
    /// Target frame rate is capped here, never extrapolated above the
    /// device's advertised maximum
    #[serde(default = "default_rate_ceiling")]
    pub preferred_rate_ceiling: u32,
    /// Hard frame-rate floor used only by `supports_required_capability`
    #[serde(default = "default_rate_floor")]
    pub required_rate_floor: u32,
    /// Whether the capability floor requires an HDR-capable format
    #[serde(default = "default_true")]
    pub require_hdr: bool,
}

fn default_high_tier() -> (u32, u32) {
    (3840, 2160)
}

fn default_fallback_tier() -> (u32, u32) {
    (1920, 1080)
}

fn default_rate_ceiling() -> u32 {
    120
}

fn default_rate_floor() -> u32 {
    120
}

fn default_true() -> bool {
    true
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self {
            high_tier: default_high_tier(),
            fallback_tier: default_fallback_tier(),
            preferred_rate_ceiling: default_rate_ceiling(),
            required_rate_floor: default_rate_floor(),
            require_hdr: true,
        }
    }
}

impl FormatPolicy {
    /// Classify a format's resolution tier, or None when it falls below the
    /// fallback tier entirely.
    pub fn tier_of(&self, format: &CaptureFormat) -> Option<ResolutionTier> {
        if format.width >= self.high_tier.0 && format.height >= self.high_tier.1 {
            Some(ResolutionTier::High)
        } else if format.width >= self.fallback_tier.0 && format.height >= self.fallback_tier.1 {
            Some(ResolutionTier::Fallback)
        } else {
            None
        }
    }

    /// Derive the target frame rate for a candidate: the device maximum,
    /// capped at the preferred ceiling.
    pub fn target_rate(&self, format: &CaptureFormat) -> u32 {
        format.max_frame_rate.min(self.preferred_rate_ceiling)
    }
}
