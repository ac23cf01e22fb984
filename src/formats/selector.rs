// Format selection and capability-floor logic

use super::{CaptureFormat, FormatPolicy, ResolutionTier, SampleDepth, SelectedConfiguration};

/// Score a candidate that already passed the tier filter.
///
/// HDR dominates everything else; among equal-HDR candidates the bonus
/// rewards frame rate heavily enough that a fallback-tier format at 120fps
/// outranks a high-tier format at 60fps (1200 vs 1100).
fn score(format: &CaptureFormat, tier: ResolutionTier, target_rate: u32) -> u32 {
    let hdr = if format.supports_hdr { 10_000 } else { 0 };
    let tier_bonus = match tier {
        ResolutionTier::High => 500,
        ResolutionTier::Fallback => 0,
    };
    hdr + target_rate * 10 + tier_bonus
}

/// Pick the best capture format from the device's advertised list.
///
/// Filters to formats meeting at least the fallback resolution tier, derives
/// each candidate's target frame rate (device maximum capped at the preferred
/// ceiling), and keeps the single highest-scoring candidate. Ties keep the
/// first candidate encountered. Returns `None` when nothing meets the
/// fallback tier - that is "no configuration", not an error; the caller
/// decides whether to proceed with device defaults or refuse to start.
pub fn select_best_format(
    candidates: &[CaptureFormat],
    policy: &FormatPolicy,
) -> Option<SelectedConfiguration> {
    let mut best: Option<(u32, SelectedConfiguration)> = None;

    for format in candidates {
        let Some(tier) = policy.tier_of(format) else {
            continue;
        };
        let target_rate = policy.target_rate(format);
        let candidate_score = score(format, tier, target_rate);

        let better = match &best {
            Some((best_score, _)) => candidate_score > *best_score,
            None => true,
        };
        if better {
            // Depth preference follows HDR capability: HDR needs 10-bit.
            // The controller still negotiates this against the device and
            // may fall back to 8-bit.
            let sample_depth = if format.supports_hdr {
                SampleDepth::Ten
            } else {
                SampleDepth::Eight
            };
            best = Some((
                candidate_score,
                SelectedConfiguration {
                    format: format.clone(),
                    target_frame_rate: target_rate,
                    sample_depth,
                },
            ));
        }
    }

    best.map(|(_, selected)| selected)
}

/// Pure capability-floor predicate: does at least one candidate
/// simultaneously meet the minimum resolution tier, the frame-rate floor,
/// and (when required) HDR support?
///
/// This is independent of which format `select_best_format` would actually
/// pick - it exists so the caller can refuse to start recording at all when
/// the floor isn't met.
pub fn supports_required_capability(candidates: &[CaptureFormat], policy: &FormatPolicy) -> bool {
    candidates.iter().any(|f| {
        policy.tier_of(f).is_some()
            && f.max_frame_rate >= policy.required_rate_floor
            && (!policy.require_hdr || f.supports_hdr)
    })
}
